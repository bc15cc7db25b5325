//! Status, maintenance and reset commands.

use super::format_timestamp;
use crate::cli::CookieCommands;
use crate::context::Context;
use crate::error::Result;
use crate::output::{OutputFormat, TableFormatter};

/// Show backend availability, cache state and history size.
pub fn status(ctx: &Context) -> Result<()> {
    let status = ctx.manager.status();
    if ctx.output.format() != OutputFormat::Table {
        return ctx.output.value(&status);
    }

    let mut summary = TableFormatter::new();
    summary.row([
        "State directory:".to_string(),
        status
            .state_dir
            .as_ref()
            .map_or_else(|| "(memory)".to_string(), |d| d.display().to_string()),
    ]);
    summary.row([
        "History:".to_string(),
        format!(
            "{} / {} record(s), {} ever recorded",
            status.history_records, status.history_cap, status.total_count
        ),
    ]);
    let cache = &status.cache;
    summary.row([
        "Cache:".to_string(),
        match (cache.cached, cache.fresh, cache.age_ms) {
            (true, true, Some(age)) => format!("fresh, {}s old (ttl {}s)", age / 1000, cache.ttl_ms / 1000),
            (true, false, _) => "expired".to_string(),
            _ => "empty".to_string(),
        },
    ]);
    summary.row([
        "Preference:".to_string(),
        format!(
            "{} ({}, {})",
            status.preference.locale,
            status.preference.source,
            format_timestamp(status.preference.timestamp)
        ),
    ]);
    summary.row([
        "Override:".to_string(),
        status.user_override.map_or_else(|| "(none)".to_string(), |l| l.to_string()),
    ]);
    summary.print();

    println!();
    let mut table = TableFormatter::new();
    table.headers(["BACKEND", "PRIORITY", "AVAILABLE"]);
    for backend in &status.backends {
        table.row([
            backend.name.to_string(),
            backend.priority.to_string(),
            if backend.available { "yes" } else { "no" }.to_string(),
        ]);
    }
    table.print();
    Ok(())
}

/// Run every maintenance step with the configured limits.
pub fn maintain(ctx: &Context) -> Result<()> {
    let report = ctx.manager.run_maintenance()?;
    ctx.output.success(&format!(
        "Expired {}, deduplicated {}, capped {}, pruned {} backup(s); {} record(s) remain",
        report.expired.removed,
        report.deduplicated.removed,
        report.limited.removed,
        report.backups_removed.len(),
        report.limited.remaining
    ));
    if ctx.output.format() != OutputFormat::Table {
        ctx.output.value(&report)?;
    }
    Ok(())
}

/// Remove preference, override and history.
pub fn reset(ctx: &Context) -> Result<()> {
    if !ctx.confirm("Remove the preference, the override and the whole history?")? {
        ctx.output.info("Cancelled.");
        return Ok(());
    }
    let report = ctx.manager.clear_all()?;
    ctx.output.success(&format!(
        "Cleared {} backend(s) and {} history record(s)",
        report.preference_backends, report.history_removed
    ));
    Ok(())
}

/// Dispatch `cookie` subcommands.
pub fn cookie_dispatch(ctx: &Context, sub: &CookieCommands) -> Result<()> {
    match sub {
        CookieCommands::Headers => {
            let headers = ctx.manager.set_cookie_headers()?;
            if ctx.output.format() == OutputFormat::Table {
                for header in &headers {
                    ctx.output.line(&format!("Set-Cookie: {header}"));
                }
                Ok(())
            } else {
                ctx.output.value(&headers)
            }
        },
        CookieCommands::Load { header } => {
            let stored = ctx.manager.load_cookie_header(header)?;
            ctx.output.success(&format!("Stored {stored} cookie(s)"));
            Ok(())
        },
    }
}
