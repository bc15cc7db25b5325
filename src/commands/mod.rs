//! Command implementations for the langpref CLI.
//!
//! Each submodule implements a group of related commands.

mod backup;
mod bundle;
mod history;
mod preference;
mod resolve;
mod status;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::cli::{Commands, Shell};
use crate::context::Context;
use crate::error::{Error, Result};

/// Execute a CLI command.
pub fn execute(ctx: &Context, command: &Commands) -> Result<()> {
    match command {
        Commands::Resolve => resolve::resolve(ctx),
        Commands::Detect { metadata } => resolve::detect(ctx, metadata),
        Commands::Override(sub) => preference::override_dispatch(ctx, sub),
        Commands::Preference(sub) => preference::preference_dispatch(ctx, sub),
        Commands::History(sub) => history::dispatch(ctx, sub),
        Commands::Backup(sub) => backup::dispatch(ctx, sub),
        Commands::Export { file } => bundle::export(ctx, file.as_deref()),
        Commands::Import { file } => bundle::import(ctx, file),
        Commands::Status => status::status(ctx),
        Commands::Cookie(sub) => status::cookie_dispatch(ctx, sub),
        Commands::Maintain => status::maintain(ctx),
        Commands::Reset => status::reset(ctx),
        Commands::Completion { shell } => completion(*shell),
    }
}

/// Print shell completions to stdout.
pub fn completion(shell: Shell) -> Result<()> {
    use clap::CommandFactory;
    use clap_complete::{Generator, generate};

    fn print_completions<G: Generator>(generator: G, cmd: &mut clap::Command) {
        let name = cmd.get_name().to_string();
        generate(generator, cmd, name, &mut std::io::stdout());
    }

    let mut cmd = crate::cli::Cli::command();
    match shell {
        Shell::Bash => print_completions(clap_complete::shells::Bash, &mut cmd),
        Shell::Zsh => print_completions(clap_complete::shells::Zsh, &mut cmd),
        Shell::Fish => print_completions(clap_complete::shells::Fish, &mut cmd),
        Shell::PowerShell => print_completions(clap_complete::shells::PowerShell, &mut cmd),
    }

    Ok(())
}

/// Parse repeated `key=value` arguments into a metadata map.
///
/// Values that parse as JSON scalars keep their type; anything else is a
/// string.
pub(crate) fn parse_metadata(pairs: &[String]) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(Error::invalid_arg(format!("metadata '{pair}' is not key=value")));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::invalid_arg("metadata key cannot be empty"));
        }
        let value = match serde_json::from_str::<Value>(value) {
            Ok(v @ (Value::Bool(_) | Value::Number(_) | Value::Null)) => v,
            _ => Value::String(value.to_string()),
        };
        map.insert(key.to_string(), value);
    }
    Ok(map)
}

/// Render an epoch-ms timestamp as RFC 3339.
pub(crate) fn format_timestamp(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map_or_else(|| ms.to_string(), |dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

/// Render a confidence with two decimals.
pub(crate) fn format_confidence(confidence: f64) -> String {
    format!("{confidence:.2}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metadata_types() {
        let map = parse_metadata(&[
            "page=home".to_string(),
            "count=3".to_string(),
            "beta=true".to_string(),
            "note=a=b".to_string(),
        ])
        .unwrap();
        assert_eq!(map["page"], Value::String("home".into()));
        assert_eq!(map["count"], serde_json::json!(3));
        assert_eq!(map["beta"], Value::Bool(true));
        assert_eq!(map["note"], Value::String("a=b".into()));
    }

    #[test]
    fn test_parse_metadata_rejects_malformed() {
        assert!(parse_metadata(&["nokey".to_string()]).is_err());
        assert!(parse_metadata(&["=value".to_string()]).is_err());
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_timestamp(1_700_000_000_000), "2023-11-14T22:13:20Z");
    }
}
