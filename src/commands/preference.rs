//! Override and preference commands.

use serde::Serialize;

use super::{format_confidence, format_timestamp};
use crate::cli::{OverrideCommands, PreferenceCommands};
use crate::context::Context;
use crate::error::Result;
use crate::locale::Locale;
use crate::storage::WriteReport;

/// Dispatch `override` subcommands.
pub fn override_dispatch(ctx: &Context, sub: &OverrideCommands) -> Result<()> {
    match sub {
        OverrideCommands::Get => override_get(ctx),
        OverrideCommands::Set { locale } => override_set(ctx, locale),
        OverrideCommands::Clear => override_clear(ctx),
    }
}

/// Dispatch `preference` subcommands.
pub fn preference_dispatch(ctx: &Context, sub: &PreferenceCommands) -> Result<()> {
    match sub {
        PreferenceCommands::Show => preference_show(ctx),
        PreferenceCommands::Clear => preference_clear(ctx),
    }
}

#[derive(Serialize)]
struct OverrideView {
    #[serde(rename = "override")]
    user_override: Option<Locale>,
}

fn override_get(ctx: &Context) -> Result<()> {
    let current = ctx.manager.get_override();
    let shown = current.map_or_else(|| "(none)".to_string(), |l| l.to_string());
    ctx.output.summary(&[("Override", shown)], &OverrideView { user_override: current })
}

fn override_set(ctx: &Context, raw: &str) -> Result<()> {
    let locale: Locale = raw.parse()?;
    let report = ctx.manager.set_override(locale);
    report_write(ctx, report, &format!("Override set to {locale}"))?;
    ctx.output.summary(&[("Override", locale.to_string())], &OverrideView { user_override: Some(locale) })
}

fn override_clear(ctx: &Context) -> Result<()> {
    let report = ctx.manager.clear_override();
    report_write(ctx, report, "Override cleared")
}

fn preference_show(ctx: &Context) -> Result<()> {
    let preference = ctx.manager.preference();
    let stored = ctx.manager.preferences().has_stored();
    let mut pairs = vec![
        ("Locale", preference.locale.to_string()),
        ("Source", preference.source.to_string()),
        ("Confidence", format_confidence(preference.confidence)),
        ("Updated", format_timestamp(preference.timestamp)),
        ("Stored", if stored { "yes" } else { "no (default)" }.to_string()),
    ];
    if !preference.metadata.is_empty() {
        pairs.push(("Metadata", serde_json::to_string(&preference.metadata)?));
    }
    ctx.output.summary(&pairs, &preference)
}

fn preference_clear(ctx: &Context) -> Result<()> {
    if !ctx.confirm("Remove the stored preference, override and cookies?")? {
        ctx.output.info("Cancelled.");
        return Ok(());
    }
    let report = ctx.manager.preferences().clear_all();
    report_write(ctx, report, "Preference cleared")
}

/// Report a dual-backend write: success when any backend took it, with a
/// warning per failing backend.
fn report_write(ctx: &Context, report: WriteReport, message: &str) -> Result<()> {
    for (backend, err) in report.failures() {
        ctx.output.warn(&format!("{backend}: {err}"));
    }
    if report.any_succeeded() {
        ctx.output.success(message);
        Ok(())
    } else if report.attempted() == 0 {
        ctx.output.warn("No storage backend is available; nothing was persisted");
        Ok(())
    } else {
        report.into_result("preference")
    }
}
