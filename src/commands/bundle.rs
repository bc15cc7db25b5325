//! Full-state export and import.

use std::path::Path;

use super::history::write_bundle_json;
use crate::context::Context;
use crate::error::Result;
use crate::output::OutputFormat;

/// Export preference, override and history as one bundle.
pub fn export(ctx: &Context, file: Option<&Path>) -> Result<()> {
    let bundle = ctx.manager.export_bundle()?;
    let json = serde_json::to_string_pretty(&bundle)?;
    write_bundle_json(ctx, &json, file)
}

/// Validate a bundle and restore every part it carries.
pub fn import(ctx: &Context, file: &Path) -> Result<()> {
    let raw = ctx.read_input(file)?;
    let report = ctx.manager.import_bundle_json(&raw)?;

    let mut restored = Vec::new();
    if report.preference {
        restored.push("preference".to_string());
    }
    if report.user_override {
        restored.push("override".to_string());
    }
    if let Some(history) = &report.history {
        restored.push(format!("{} history record(s)", history.record_count));
        if history.truncated > 0 {
            ctx.output.warn(&format!("Dropped {} record(s) over the cap", history.truncated));
        }
    }
    if restored.is_empty() {
        ctx.output.info("Nothing was restored");
    } else {
        ctx.output.success(&format!("Restored {}", restored.join(", ")));
    }
    if ctx.output.format() != OutputFormat::Table {
        ctx.output.value(&report)?;
    }
    Ok(())
}
