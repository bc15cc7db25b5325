//! Configuration for langpref.
//!
//! The configuration follows the XDG Base Directory Specification and supports:
//! - User config: `~/.config/langpref/config.yaml`
//! - Project config: `.langpref.yaml` in the current directory
//! - Environment variables: `LANGPREF_*`
//! - Command-line flags (highest precedence)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_CACHE_TTL;
use crate::clock::DAY_MS;
use crate::detection::{BROWSER_CONFIDENCE, DEFAULT_CONFIDENCE};
use crate::error::{Error, Result};
use crate::history::{DEFAULT_MAX_RECORDS, DEFAULT_TREND_WINDOW_DAYS, MAX_TREND_WINDOW_DAYS};
use crate::locale::Locale;
use crate::storage::DEFAULT_LOCAL_QUOTA_BYTES;

/// Application directory name under the XDG base directories.
const APP_DIR: &str = "langpref";

/// Project-local config file name.
pub const PROJECT_CONFIG_FILE: &str = ".langpref.yaml";

/// Upper bound on the history cap.
pub const MAX_HISTORY_CAP: usize = 10_000;

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Storage backends.
    #[serde(default)]
    pub storage: StorageConfig,

    /// History engine.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Detection resolver.
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Output configuration.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Storage backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// State directory override.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Use the file-backed local store.
    #[serde(default = "default_true")]
    pub local_enabled: bool,

    /// Use the cookie jar.
    #[serde(default = "default_true")]
    pub cookies_enabled: bool,

    /// Byte quota of the local store.
    #[serde(default = "default_local_quota")]
    pub local_quota_bytes: usize,

    /// Cookie lifetime.
    #[serde(default = "default_cookie_max_age_days")]
    pub cookie_max_age_days: u32,

    /// Write cookies with the `Secure` attribute.
    #[serde(default)]
    pub secure_context: bool,
}

fn default_true() -> bool {
    true
}

fn default_local_quota() -> usize {
    DEFAULT_LOCAL_QUOTA_BYTES
}

fn default_cookie_max_age_days() -> u32 {
    30
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: None,
            local_enabled: true,
            cookies_enabled: true,
            local_quota_bytes: default_local_quota(),
            cookie_max_age_days: default_cookie_max_age_days(),
            secure_context: false,
        }
    }
}

/// History engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// History cap.
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// Cache time-to-live in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Default trend window in days.
    #[serde(default = "default_trend_window_days")]
    pub trend_window_days: u32,

    /// Age after which `maintain` expires records, in days.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Backups kept by `maintain`.
    #[serde(default = "default_keep_backups")]
    pub keep_backups: usize,
}

fn default_max_records() -> usize {
    DEFAULT_MAX_RECORDS
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL.as_secs()
}

fn default_trend_window_days() -> u32 {
    DEFAULT_TREND_WINDOW_DAYS
}

fn default_retention_days() -> u32 {
    90
}

fn default_keep_backups() -> usize {
    5
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
            cache_ttl_secs: default_cache_ttl_secs(),
            trend_window_days: default_trend_window_days(),
            retention_days: default_retention_days(),
            keep_backups: default_keep_backups(),
        }
    }
}

impl HistoryConfig {
    /// Cache time-to-live.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Retention as milliseconds.
    pub fn retention_ms(&self) -> i64 {
        i64::from(self.retention_days) * DAY_MS
    }
}

/// Detection resolver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Locale used when nothing else matches.
    #[serde(default)]
    pub default_locale: Locale,

    /// Confidence of a browser-language match.
    #[serde(default = "default_browser_confidence")]
    pub browser_confidence: f64,

    /// Confidence of the default fallback.
    #[serde(default = "default_default_confidence")]
    pub default_confidence: f64,
}

fn default_browser_confidence() -> f64 {
    BROWSER_CONFIDENCE
}

fn default_default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            default_locale: Locale::default(),
            browser_confidence: default_browser_confidence(),
            default_confidence: default_default_confidence(),
        }
    }
}

/// Output formatting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format (table, json, yaml, jsonl).
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "table".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { format: default_format() }
    }
}

impl Config {
    /// Load configuration from all sources with proper precedence.
    ///
    /// Resolution order (highest to lowest):
    /// 1. CLI flags (handled separately)
    /// 2. Environment variables
    /// 3. Project config (`.langpref.yaml`)
    /// 4. User config (`~/.config/langpref/config.yaml`)
    /// 5. Defaults
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = Self::user_config_path()
            && path.exists()
        {
            config.merge(Self::load_from_file(&path)?);
        }

        let project_path = PathBuf::from(PROJECT_CONFIG_FILE);
        if project_path.exists() {
            config.merge(Self::load_from_file(&project_path)?);
        }

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            Error::config(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Merge another config into this one (other takes precedence).
    ///
    /// A field in `other` wins only when it differs from the default, so a
    /// partial file does not reset values set by a lower layer.
    fn merge(&mut self, other: Self) {
        let storage_defaults = StorageConfig::default();
        if other.storage.dir.is_some() {
            self.storage.dir = other.storage.dir;
        }
        if other.storage.local_enabled != storage_defaults.local_enabled {
            self.storage.local_enabled = other.storage.local_enabled;
        }
        if other.storage.cookies_enabled != storage_defaults.cookies_enabled {
            self.storage.cookies_enabled = other.storage.cookies_enabled;
        }
        if other.storage.local_quota_bytes != storage_defaults.local_quota_bytes {
            self.storage.local_quota_bytes = other.storage.local_quota_bytes;
        }
        if other.storage.cookie_max_age_days != storage_defaults.cookie_max_age_days {
            self.storage.cookie_max_age_days = other.storage.cookie_max_age_days;
        }
        if other.storage.secure_context != storage_defaults.secure_context {
            self.storage.secure_context = other.storage.secure_context;
        }

        let history_defaults = HistoryConfig::default();
        if other.history.max_records != history_defaults.max_records {
            self.history.max_records = other.history.max_records;
        }
        if other.history.cache_ttl_secs != history_defaults.cache_ttl_secs {
            self.history.cache_ttl_secs = other.history.cache_ttl_secs;
        }
        if other.history.trend_window_days != history_defaults.trend_window_days {
            self.history.trend_window_days = other.history.trend_window_days;
        }
        if other.history.retention_days != history_defaults.retention_days {
            self.history.retention_days = other.history.retention_days;
        }
        if other.history.keep_backups != history_defaults.keep_backups {
            self.history.keep_backups = other.history.keep_backups;
        }

        let detection_defaults = DetectionConfig::default();
        if other.detection.default_locale != detection_defaults.default_locale {
            self.detection.default_locale = other.detection.default_locale;
        }
        if other.detection.browser_confidence.to_bits()
            != detection_defaults.browser_confidence.to_bits()
        {
            self.detection.browser_confidence = other.detection.browser_confidence;
        }
        if other.detection.default_confidence.to_bits()
            != detection_defaults.default_confidence.to_bits()
        {
            self.detection.default_confidence = other.detection.default_confidence;
        }

        if other.output.format != default_format() {
            self.output.format = other.output.format;
        }
    }

    /// Apply environment variable overrides through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup("LANGPREF_STATE_DIR").filter(|v| !v.is_empty()) {
            self.storage.dir = Some(PathBuf::from(dir));
        }

        if let Some(code) = lookup("LANGPREF_DEFAULT_LOCALE").filter(|v| !v.is_empty()) {
            self.detection.default_locale = Locale::from_code(&code).ok_or_else(|| {
                Error::config(format!("LANGPREF_DEFAULT_LOCALE: unsupported locale '{code}'"))
            })?;
        }

        if let Some(max) = lookup("LANGPREF_MAX_RECORDS").filter(|v| !v.is_empty()) {
            self.history.max_records = max.trim().parse().map_err(|_| {
                Error::config(format!("LANGPREF_MAX_RECORDS: '{max}' is not a positive integer"))
            })?;
        }

        Ok(())
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<()> {
        if self.history.max_records == 0 || self.history.max_records > MAX_HISTORY_CAP {
            return Err(Error::config(format!(
                "history.max_records must be between 1 and {MAX_HISTORY_CAP}"
            )));
        }
        if !(1..=MAX_TREND_WINDOW_DAYS).contains(&self.history.trend_window_days) {
            return Err(Error::config(format!(
                "history.trend_window_days must be between 1 and {MAX_TREND_WINDOW_DAYS}"
            )));
        }
        for (name, value) in [
            ("detection.browser_confidence", self.detection.browser_confidence),
            ("detection.default_confidence", self.detection.default_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::config(format!("{name} must be within [0, 1]")));
            }
        }
        if self.storage.cookie_max_age_days == 0 {
            return Err(Error::config("storage.cookie_max_age_days must be at least 1"));
        }
        if self.storage.local_quota_bytes == 0 {
            return Err(Error::config("storage.local_quota_bytes must be positive"));
        }
        Ok(())
    }

    /// The state directory in effect: the configured override, else the
    /// XDG default.
    pub fn effective_state_dir(&self) -> Result<PathBuf> {
        match &self.storage.dir {
            Some(dir) => Ok(dir.clone()),
            None => Self::state_dir().ok_or_else(|| Error::config("Cannot determine state directory")),
        }
    }

    /// Get the path to the user config file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.yaml"))
    }

    /// Get the path to the user config directory.
    ///
    /// Cross-platform behavior:
    /// - If `XDG_CONFIG_HOME` is set, uses `$XDG_CONFIG_HOME/langpref`
    /// - Linux/macOS: Falls back to `~/.config/langpref` (XDG default)
    /// - Windows: Falls back to `%APPDATA%\langpref`
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME")
            && !xdg_config.is_empty()
        {
            return Some(PathBuf::from(xdg_config).join(APP_DIR));
        }

        #[cfg(windows)]
        {
            dirs::config_dir().map(|p| p.join(APP_DIR))
        }

        #[cfg(not(windows))]
        {
            dirs::home_dir().map(|p| p.join(".config").join(APP_DIR))
        }
    }

    /// Get the path to the state directory.
    ///
    /// Cross-platform behavior:
    /// - If `XDG_STATE_HOME` is set, uses `$XDG_STATE_HOME/langpref`
    /// - Linux/macOS: Falls back to `~/.local/state/langpref` (XDG default)
    /// - Windows: Falls back to `%LOCALAPPDATA%\langpref`
    #[must_use]
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME")
            && !xdg_state.is_empty()
        {
            return Some(PathBuf::from(xdg_state).join(APP_DIR));
        }

        #[cfg(windows)]
        {
            dirs::data_local_dir().map(|p| p.join(APP_DIR))
        }

        #[cfg(not(windows))]
        {
            dirs::home_dir().map(|p| p.join(".local").join("state").join(APP_DIR))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.history.max_records, 50);
        assert_eq!(config.history.cache_ttl_secs, 600);
        assert_eq!(config.history.trend_window_days, 7);
        assert_eq!(config.storage.cookie_max_age_days, 30);
        assert!(!config.storage.secure_context);
        assert_eq!(config.detection.default_locale, Locale::En);
        assert_eq!(config.output.format, "table");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("history:\n  max_records: 20\n").unwrap();
        assert_eq!(config.history.max_records, 20);
        assert_eq!(config.history.cache_ttl_secs, 600);
        assert!(config.storage.local_enabled);
    }

    #[test]
    fn test_merge_keeps_lower_layer_values() {
        let mut base: Config =
            serde_yaml::from_str("detection:\n  default_locale: zh\nstorage:\n  secure_context: true\n")
                .unwrap();
        let project: Config = serde_yaml::from_str("history:\n  max_records: 5\n").unwrap();
        base.merge(project);
        assert_eq!(base.detection.default_locale, Locale::Zh);
        assert!(base.storage.secure_context);
        assert_eq!(base.history.max_records, 5);
    }

    #[test]
    fn test_unsupported_locale_in_yaml_is_rejected() {
        assert!(serde_yaml::from_str::<Config>("detection:\n  default_locale: fr\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_overrides(env(&[
                ("LANGPREF_STATE_DIR", "/tmp/lp"),
                ("LANGPREF_DEFAULT_LOCALE", "ZH"),
                ("LANGPREF_MAX_RECORDS", "12"),
            ]))
            .unwrap();
        assert_eq!(config.storage.dir, Some(PathBuf::from("/tmp/lp")));
        assert_eq!(config.detection.default_locale, Locale::Zh);
        assert_eq!(config.history.max_records, 12);
        assert_eq!(config.effective_state_dir().unwrap(), PathBuf::from("/tmp/lp"));
    }

    #[test]
    fn test_bad_env_values() {
        let mut config = Config::default();
        assert!(config.apply_env_overrides(env(&[("LANGPREF_DEFAULT_LOCALE", "fr")])).is_err());
        assert!(config.apply_env_overrides(env(&[("LANGPREF_MAX_RECORDS", "lots")])).is_err());
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = Config::default();
        config.history.max_records = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.detection.browser_confidence = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.history.trend_window_days = 0;
        assert!(config.validate().is_err());
    }
}
