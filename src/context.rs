//! Context for CLI command execution.

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::Result;
use crate::locale::{AcceptLanguage, EnvLanguages, LanguageSource, StaticLanguages};
use crate::manager::LocaleManager;
use crate::output::Output;

/// Everything a command needs: configuration, the opened manager, output
/// settings and the language list to resolve against.
pub struct Context {
    /// Configuration after file, environment and flag layering.
    pub config: Config,

    /// Manager over the file-backed stores.
    pub manager: LocaleManager,

    /// Output configuration.
    pub output: Output,

    /// Skip confirmations.
    pub yes: bool,

    /// Debug mode.
    pub debug: bool,

    languages: Box<dyn LanguageSource>,
}

/// Global options that shape the context.
#[derive(Debug, bon::Builder)]
pub struct ContextOptions {
    /// Output format override.
    #[builder(into)]
    pub output: Option<String>,
    /// Color mode (auto, always, never).
    #[builder(into, default = "auto".to_string())]
    pub color: String,
    /// Explicit language list.
    #[builder(default)]
    pub langs: Vec<String>,
    /// `Accept-Language` header.
    #[builder(into)]
    pub accept_language: Option<String>,
    /// State directory override.
    #[builder(into)]
    pub state_dir: Option<PathBuf>,
    /// Suppress non-essential output.
    #[builder(default)]
    pub quiet: bool,
    /// Skip confirmations.
    #[builder(default)]
    pub yes: bool,
    /// Debug mode.
    #[builder(default)]
    pub debug: bool,
}

impl Context {
    /// Load configuration and open the manager.
    pub fn new(options: ContextOptions) -> Result<Self> {
        let mut config = Config::load()?;
        if let Some(dir) = options.state_dir {
            config.storage.dir = Some(dir);
        }

        let format = options.output.as_deref().unwrap_or(&config.output.format);
        let output = Output::from_cli(format, &options.color, options.quiet)?;
        let manager = LocaleManager::open(&config)?;
        let languages = select_languages(options.langs, options.accept_language);

        Ok(Self { config, manager, output, yes: options.yes, debug: options.debug, languages })
    }

    /// The language list commands resolve against.
    pub fn languages(&self) -> &dyn LanguageSource {
        self.languages.as_ref()
    }

    /// Prompt for confirmation (respects --yes flag).
    pub fn confirm(&self, message: &str) -> Result<bool> {
        if self.yes {
            return Ok(true);
        }

        eprint!("{message} [y/N]: ");
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        Ok(input.trim().eq_ignore_ascii_case("y") || input.trim().eq_ignore_ascii_case("yes"))
    }

    /// Read a file, or stdin when the path is `-`.
    pub fn read_input(&self, path: &Path) -> Result<String> {
        if path.as_os_str() == "-" {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        } else {
            Ok(std::fs::read_to_string(path)?)
        }
    }
}

/// `--lang` wins over `--accept-language`, which wins over the process
/// environment.
pub fn select_languages(
    langs: Vec<String>,
    accept_language: Option<String>,
) -> Box<dyn LanguageSource> {
    if !langs.is_empty() {
        Box::new(StaticLanguages(langs))
    } else if let Some(header) = accept_language {
        Box::new(AcceptLanguage(header))
    } else {
        Box::new(EnvLanguages)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_langs_win() {
        let source = select_languages(vec!["zh-TW".into()], Some("en".into()));
        assert_eq!(source.languages(), vec!["zh-TW".to_string()]);
    }

    #[test]
    fn test_accept_language_used_without_langs() {
        let source = select_languages(Vec::new(), Some("zh-HK,en;q=0.5".into()));
        assert_eq!(source.languages(), vec!["zh-HK".to_string(), "en".to_string()]);
    }

    #[test]
    fn test_options_builder_defaults() {
        let options = ContextOptions::builder().quiet(true).build();
        assert_eq!(options.color, "auto");
        assert!(options.quiet);
        assert!(options.langs.is_empty());
        assert!(options.output.is_none());
    }
}
