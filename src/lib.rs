//! langpref library
//!
//! Decides which locale a front-end should render, remembers the user's
//! choice across two independent storage backends, and keeps a bounded,
//! queryable audit trail of every decision.
//!
//! ## Usage
//!
//! ```no_run
//! use std::rc::Rc;
//! use langpref::{Config, LocaleManager, SystemClock, StaticLanguages};
//!
//! let manager = LocaleManager::ephemeral(&Config::default(), Rc::new(SystemClock))?;
//! let result = manager.resolve(&StaticLanguages::new(["zh-TW", "en"]));
//! assert_eq!(result.locale.code(), "zh");
//! # Ok::<(), langpref::Error>(())
//! ```
//!
//! The same operations are available from the `langpref` binary:
//!
//! ```bash
//! langpref resolve --lang zh-TW        # Resolve without recording
//! langpref override set zh             # Pin a locale
//! langpref history stats               # Summarize past decisions
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bindings;
pub mod bundle;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod context;
pub mod detection;
pub mod error;
pub mod events;
pub mod history;
pub mod locale;
pub mod manager;
pub mod output;
pub mod preference;
pub mod storage;

pub use bundle::ExportBundle;
pub use cli::Cli;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use detection::{DetectionResult, DetectionSource, Resolver};
pub use error::{Error, Result};
pub use events::{EventBus, EventKind, LocaleEvent};
pub use history::{DetectionHistory, DetectionRecord, HistoryEngine, HistoryQuery};
pub use locale::{AcceptLanguage, EnvLanguages, LanguageSource, Locale, StaticLanguages};
pub use manager::LocaleManager;
pub use preference::{PreferenceStore, UserLocalePreference};

/// CLI version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the CLI with the given arguments.
///
/// This is the main entry point for the CLI, parsing arguments and
/// dispatching to the appropriate command handler.
pub fn run(args: Vec<String>) -> Result<()> {
    use clap::Parser;

    let cli_args = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(e) => {
            // Print clap error (includes help/version)
            e.print().ok();
            use clap::error::ErrorKind;
            match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => return Ok(()),
                _ => return Err(Error::other("")),
            }
        },
    };

    if cli_args.debug {
        init_logging();
    }

    // Completions need no state directory.
    if let cli::Commands::Completion { shell } = &cli_args.command {
        return commands::completion(*shell);
    }

    let options = context::ContextOptions::builder()
        .maybe_output(cli_args.output)
        .color(cli_args.color)
        .langs(cli_args.langs)
        .maybe_accept_language(cli_args.accept_language)
        .maybe_state_dir(cli_args.state_dir)
        .quiet(cli_args.quiet)
        .yes(cli_args.yes)
        .debug(cli_args.debug)
        .build();
    let ctx = context::Context::new(options)?;

    commands::execute(&ctx, &cli_args.command)
}

/// Initialize tracing/logging for debug mode.
fn init_logging() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("langpref=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}
