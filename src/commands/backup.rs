//! Backup snapshot commands.

use super::format_timestamp;
use crate::cli::BackupCommands;
use crate::context::Context;
use crate::error::Result;
use crate::history::BackupInfo;
use crate::output::{Displayable, OutputFormat};

impl Displayable for BackupInfo {
    fn table_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            format_timestamp(self.created_at),
            self.record_count.to_string(),
        ]
    }

    fn table_headers() -> Vec<&'static str> {
        vec!["ID", "NAME", "CREATED", "RECORDS"]
    }
}

/// Dispatch `backup` subcommands.
pub fn dispatch(ctx: &Context, sub: &BackupCommands) -> Result<()> {
    match sub {
        BackupCommands::Create { name } => create(ctx, name),
        BackupCommands::List => list(ctx),
        BackupCommands::Restore { id } => restore(ctx, id),
        BackupCommands::Delete { id } => delete(ctx, id),
        BackupCommands::Prune { keep } => prune(ctx, *keep),
    }
}

fn create(ctx: &Context, name: &str) -> Result<()> {
    let info = ctx.manager.history().create_backup(name)?;
    ctx.output.success(&format!("Created backup {} ({} record(s))", info.id, info.record_count));
    if ctx.output.format() == OutputFormat::Table {
        ctx.output.line(&info.id);
        Ok(())
    } else {
        ctx.output.item(&info)
    }
}

fn list(ctx: &Context) -> Result<()> {
    let backups = ctx.manager.history().list_backups();
    if backups.is_empty() && ctx.output.format() == OutputFormat::Table {
        ctx.output.info("No backups");
        return Ok(());
    }
    ctx.output.table(&backups)
}

fn restore(ctx: &Context, id: &str) -> Result<()> {
    if !ctx.confirm(&format!("Replace the current history with backup '{id}'?"))? {
        ctx.output.info("Cancelled.");
        return Ok(());
    }
    let report = ctx.manager.history().restore_backup(id)?;
    ctx.output.success(&format!(
        "Restored {} record(s) from {id}, replacing {}",
        report.record_count, report.replaced
    ));
    Ok(())
}

fn delete(ctx: &Context, id: &str) -> Result<()> {
    if !ctx.confirm(&format!("Delete backup '{id}'?"))? {
        ctx.output.info("Cancelled.");
        return Ok(());
    }
    ctx.manager.history().delete_backup(id)?;
    ctx.output.success(&format!("Deleted backup {id}"));
    Ok(())
}

fn prune(ctx: &Context, keep: Option<usize>) -> Result<()> {
    let keep = keep.unwrap_or(ctx.config.history.keep_backups);
    let deleted = ctx.manager.history().cleanup_old_backups(keep)?;
    ctx.output.success(&format!("Deleted {} backup(s), kept the newest {keep}", deleted.len()));
    if ctx.output.format() != OutputFormat::Table {
        ctx.output.value(&deleted)?;
    }
    Ok(())
}
