//! Command-line argument parsing and command definitions.
//!
//! Uses clap with derive macros for type-safe argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::history::{MAX_PREDICT_DAYS, MAX_TREND_WINDOW_DAYS};

/// langpref - locale preference detection and audit history
#[derive(Parser, Debug)]
#[command(name = "langpref")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Output format (defaults to the configured format)
    #[arg(short, long, global = true, value_parser = ["table", "json", "yaml", "jsonl"])]
    pub output: Option<String>,

    /// Color output mode
    #[arg(long, global = true, default_value = "auto", value_parser = ["auto", "always", "never"])]
    pub color: String,

    /// Browser-reported language, highest priority first (repeatable)
    #[arg(short, long = "lang", global = true, value_name = "TAG")]
    pub langs: Vec<String>,

    /// Accept-Language header to read languages from
    #[arg(long, global = true, value_name = "HEADER", conflicts_with = "langs")]
    pub accept_language: Option<String>,

    /// State directory holding the local store and cookie jar
    #[arg(long, global = true, env = "LANGPREF_STATE_DIR", value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Skip confirmations (answer yes to all prompts)
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve the locale from the override and language list
    Resolve,

    /// Resolve the locale and record the decision in history
    Detect {
        /// Extra metadata to attach (key=value, repeatable)
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        metadata: Vec<String>,
    },

    /// Manage the explicit user override
    #[command(subcommand)]
    Override(OverrideCommands),

    /// Show or clear the stored preference
    #[command(subcommand)]
    Preference(PreferenceCommands),

    /// Query and maintain the detection history
    #[command(subcommand)]
    History(HistoryCommands),

    /// Manage named history snapshots
    #[command(subcommand)]
    Backup(BackupCommands),

    /// Export preference, override and history as a bundle
    Export {
        /// Write to a file instead of stdout
        #[arg(long, short)]
        file: Option<PathBuf>,
    },

    /// Import a bundle produced by `export`
    Import {
        /// Bundle file ("-" reads stdin)
        file: PathBuf,
    },

    /// Show backend availability, cache and history state
    Status,

    /// Exchange the cookie jar with HTTP headers
    #[command(subcommand)]
    Cookie(CookieCommands),

    /// Run expiry, deduplication, size capping and backup pruning
    Maintain,

    /// Remove every stored preference, override and history record
    Reset,

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Shell types for completion generation.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Shell {
    /// Bash shell.
    Bash,
    /// Zsh shell.
    Zsh,
    /// Fish shell.
    Fish,
    /// PowerShell.
    PowerShell,
}

/// Override commands.
#[derive(Subcommand, Debug)]
pub enum OverrideCommands {
    /// Show the current override
    Get,

    /// Set the override
    Set {
        /// Locale code (e.g., zh)
        locale: String,
    },

    /// Remove the override
    Clear,
}

/// Preference commands.
#[derive(Subcommand, Debug)]
pub enum PreferenceCommands {
    /// Show the stored preference (or the synthesized default)
    Show,

    /// Remove the preference, the override and the cookies
    Clear,
}

/// History commands.
#[derive(Subcommand, Debug)]
pub enum HistoryCommands {
    /// List records, newest first
    List {
        /// Only this locale
        #[arg(long)]
        locale: Option<String>,

        /// Only this source
        #[arg(long, value_parser = ["user", "browser", "default"])]
        source: Option<String>,

        /// Minimum confidence (inclusive)
        #[arg(long)]
        min_confidence: Option<f64>,

        /// Maximum confidence (inclusive)
        #[arg(long)]
        max_confidence: Option<f64>,

        /// Earliest time (RFC 3339, YYYY-MM-DD or epoch ms)
        #[arg(long)]
        since: Option<String>,

        /// Latest time (RFC 3339, YYYY-MM-DD or epoch ms)
        #[arg(long)]
        until: Option<String>,

        /// Maximum number of records
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },

    /// Append a record
    Add {
        /// Locale code
        locale: String,

        /// Detection source
        #[arg(long, default_value = "user", value_parser = ["user", "browser", "default"])]
        source: String,

        /// Confidence (clamped to [0, 1]; defaults to the source weight)
        #[arg(long, allow_hyphen_values = true)]
        confidence: Option<f64>,

        /// Metadata (key=value, repeatable)
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        metadata: Vec<String>,
    },

    /// Free-text search over locale, source and metadata
    Search {
        /// Text to look for
        text: String,
    },

    /// Show aggregate statistics
    Stats,

    /// Show day-bucketed trends and predictions
    Trends {
        /// Window in days (defaults to the configured window)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_TREND_WINDOW_DAYS)))]
        window: Option<u32>,

        /// Days per growth-rate period
        #[arg(long, default_value = "3")]
        period: usize,

        /// Days to predict ahead
        #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(..=i64::from(MAX_PREDICT_DAYS)))]
        predict: u32,
    },

    /// Export the history as a bundle
    Export {
        /// Write to a file instead of stdout
        #[arg(long, short)]
        file: Option<PathBuf>,
    },

    /// Replace the history from a bundle
    Import {
        /// Bundle file ("-" reads stdin)
        file: PathBuf,
    },

    /// Drop records older than a cutoff
    Cleanup {
        /// Maximum age in days (defaults to the configured retention)
        #[arg(long)]
        max_age_days: Option<u32>,
    },

    /// Drop repeated detections inside a time window
    Dedupe {
        /// Window in seconds
        #[arg(long, default_value = "60")]
        window_secs: u32,
    },

    /// Remove every record
    Clear,

    /// Read the stored history strictly and report its health
    Verify,
}

/// Cookie jar commands.
#[derive(Subcommand, Debug)]
pub enum CookieCommands {
    /// Print a Set-Cookie header for every mirrored key
    Headers,

    /// Store the cookies of a Cookie request header
    Load {
        /// Header value (e.g., "langpref.user_override=zh")
        header: String,
    },
}

/// Backup commands.
#[derive(Subcommand, Debug)]
pub enum BackupCommands {
    /// Snapshot the current history
    Create {
        /// Backup name (letters, digits, '-' and '_')
        name: String,
    },

    /// List backups, newest first
    List,

    /// Replace the history with a backup
    Restore {
        /// Backup id
        id: String,
    },

    /// Delete a backup
    Delete {
        /// Backup id
        id: String,
    },

    /// Delete all but the newest backups
    Prune {
        /// Number of backups to keep (defaults to the configured count)
        #[arg(long)]
        keep: Option<usize>,
    },
}
