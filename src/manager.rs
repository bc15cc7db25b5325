//! The consumer-facing facade.
//!
//! A [`LocaleManager`] wires one backend chain, one event bus and one clock
//! into the preference store, the history engine and the resolver, and
//! exposes the operations a front-end needs: resolve, override, history,
//! export/import, status and maintenance.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::bindings::{HistoryBinding, PreferenceBinding};
use crate::bundle::ExportBundle;
use crate::cache::{CacheStatus, StorageCache};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::detection::{DetectionResult, Resolver};
use crate::error::{Error, Result};
use crate::events::{EventBus, LocaleEvent};
use crate::history::{AddedRecord, CleanupReport, HistoryEngine, ImportReport};
use crate::locale::{LanguageSource, Locale};
use crate::preference::{PreferenceStore, UserLocalePreference};
use crate::storage::{
    Backend, BackendChain, BackendStatus, CookieStore, LocalStore, MemoryStore, WriteReport, keys,
};

/// Window within which `maintain` collapses repeated detections.
pub const DEFAULT_DEDUPE_WINDOW_MS: i64 = 60 * 1000;

/// What a full-bundle import restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleImportReport {
    /// A preference was carried and stored by at least one backend.
    pub preference: bool,
    /// An override was carried and stored by at least one backend.
    pub user_override: bool,
    /// History import outcome, if the bundle carried one.
    pub history: Option<ImportReport>,
}

/// Outcome of a maintenance pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// Expired records.
    pub expired: CleanupReport,
    /// Collapsed duplicates.
    pub deduplicated: CleanupReport,
    /// Records over the cap.
    pub limited: CleanupReport,
    /// Backup ids deleted.
    pub backups_removed: Vec<String>,
}

/// Snapshot of storage and history state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageStatus {
    /// State directory, absent for an ephemeral manager.
    pub state_dir: Option<PathBuf>,
    /// Backends in priority order.
    pub backends: Vec<BackendStatus>,
    /// History cache.
    pub cache: CacheStatus,
    /// Records held.
    pub history_records: usize,
    /// History cap.
    pub history_cap: usize,
    /// Records ever appended.
    pub total_count: u64,
    /// Current preference.
    pub preference: UserLocalePreference,
    /// Current override.
    pub user_override: Option<Locale>,
}

/// Outcome of [`LocaleManager::clear_all`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    /// Backends that accepted the preference removal.
    pub preference_backends: usize,
    /// History records removed.
    pub history_removed: usize,
}

/// Wires the stores, engine and resolver together.
pub struct LocaleManager {
    config: Config,
    clock: Rc<dyn Clock>,
    bus: Rc<EventBus>,
    chain: Rc<BackendChain>,
    preferences: Rc<PreferenceStore>,
    history: Rc<HistoryEngine>,
    resolver: Resolver,
    cookies: Option<CookieStore>,
    state_dir: Option<PathBuf>,
}

impl LocaleManager {
    /// Open the file-backed stores in the configured state directory.
    pub fn open(config: &Config) -> Result<Self> {
        let dir = config.effective_state_dir()?;
        Self::open_in(config, dir, Rc::new(SystemClock))
    }

    /// Open the file-backed stores in `dir`.
    pub fn open_in(config: &Config, dir: impl AsRef<Path>, clock: Rc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let dir = dir.as_ref().to_path_buf();
        let local = LocalStore::new(&dir)
            .with_quota(config.storage.local_quota_bytes)
            .with_enabled(config.storage.local_enabled);
        let cookies = CookieStore::new(&dir, Rc::clone(&clock))
            .with_max_age_days(config.storage.cookie_max_age_days)
            .with_secure_context(config.storage.secure_context)
            .with_enabled(config.storage.cookies_enabled);
        debug!(dir = %dir.display(), "opening state directory");
        let backends: Vec<Box<dyn Backend>> = vec![Box::new(local), Box::new(cookies.clone())];
        Ok(Self::assemble(config.clone(), backends, clock, Some(cookies), Some(dir)))
    }

    /// In-memory stores only; nothing survives the process.
    pub fn ephemeral(config: &Config, clock: Rc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let backends: Vec<Box<dyn Backend>> =
            vec![Box::new(MemoryStore::new("local")), Box::new(MemoryStore::new("cookie"))];
        Ok(Self::assemble(config.clone(), backends, clock, None, None))
    }

    /// Build over caller-supplied backends, primary first.
    pub fn with_backends(
        config: &Config,
        backends: Vec<Box<dyn Backend>>,
        clock: Rc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config.clone(), backends, clock, None, None))
    }

    fn assemble(
        config: Config,
        backends: Vec<Box<dyn Backend>>,
        clock: Rc<dyn Clock>,
        cookies: Option<CookieStore>,
        state_dir: Option<PathBuf>,
    ) -> Self {
        let chain = Rc::new(BackendChain::new(backends));
        let bus = Rc::new(EventBus::new());
        let preferences = Rc::new(PreferenceStore::new(
            Rc::clone(&chain),
            Rc::clone(&bus),
            Rc::clone(&clock),
            config.detection.default_locale,
        ));
        let cache = StorageCache::new(config.history.cache_ttl(), Rc::clone(&clock));
        let history = Rc::new(HistoryEngine::new(
            Rc::clone(&chain),
            cache,
            Rc::clone(&bus),
            Rc::clone(&clock),
            config.history.max_records,
        ));
        let resolver = Resolver::new(config.detection.default_locale)
            .with_weights(config.detection.browser_confidence, config.detection.default_confidence);
        Self { config, clock, bus, chain, preferences, history, resolver, cookies, state_dir }
    }

    /// Configuration in effect.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The event bus.
    pub fn events(&self) -> &Rc<EventBus> {
        &self.bus
    }

    /// The history engine.
    pub fn history(&self) -> &Rc<HistoryEngine> {
        &self.history
    }

    /// The preference store.
    pub fn preferences(&self) -> &Rc<PreferenceStore> {
        &self.preferences
    }

    /// The cookie jar, for file-backed managers.
    pub fn cookies(&self) -> Option<&CookieStore> {
        self.cookies.as_ref()
    }

    /// State directory, for file-backed managers.
    pub fn state_dir(&self) -> Option<&Path> {
        self.state_dir.as_deref()
    }

    /// Resolve the locale to render. Never fails.
    pub fn resolve(&self, languages: &dyn LanguageSource) -> DetectionResult {
        self.resolver.resolve(self.preferences.as_ref(), languages)
    }

    /// Resolve and append the outcome to history.
    pub fn detect_and_record(
        &self,
        languages: &dyn LanguageSource,
        metadata: Option<Map<String, Value>>,
    ) -> Result<(DetectionResult, AddedRecord)> {
        let result = self.resolve(languages);
        let mut metadata = metadata.unwrap_or_default();
        if let Some(matched) = &result.details.matched_language {
            metadata.insert("matched".into(), json!(matched));
        }
        metadata.insert("examined".into(), json!(result.details.candidates_examined));
        let added =
            self.history.add_record(result.locale, result.source, result.confidence, Some(metadata))?;
        Ok((result, added))
    }

    /// Current preference, synthesized when nothing is stored.
    pub fn preference(&self) -> UserLocalePreference {
        self.preferences.get()
    }

    /// Persist a preference.
    pub fn save_preference(&self, preference: &UserLocalePreference) -> WriteReport {
        self.preferences.save(preference)
    }

    /// Current override.
    pub fn get_override(&self) -> Option<Locale> {
        self.preferences.get_override()
    }

    /// Store an override.
    pub fn set_override(&self, locale: Locale) -> WriteReport {
        self.preferences.set_override(locale)
    }

    /// Remove the override.
    pub fn clear_override(&self) -> WriteReport {
        self.preferences.clear_override()
    }

    /// Bundle the preference, override and history.
    pub fn export_bundle(&self) -> Result<ExportBundle> {
        let preference = self.preferences.has_stored().then(|| self.preferences.get());
        let history = self.history.snapshot()?;
        let bundle = ExportBundle::new(
            preference,
            self.preferences.get_override(),
            Some(history),
            self.clock.now_ms(),
        )?;
        self.bus.emit_event(&LocaleEvent::Export {
            record_count: bundle.record_count(),
            checksum: bundle.metadata.data_integrity.clone(),
            timestamp: bundle.timestamp,
        });
        info!(records = bundle.record_count(), "bundle exported");
        Ok(bundle)
    }

    /// Restore every part a bundle carries, after validating all of it.
    pub fn import_bundle(&self, bundle: &ExportBundle) -> Result<BundleImportReport> {
        if let Err(e) = bundle.validate() {
            let err = Error::from(e);
            self.bus.emit_event(&LocaleEvent::error("bundle.import", err.to_string(), self.clock.now_ms()));
            return Err(err);
        }
        // A failed history write must leave the preference and override
        // untouched, so history goes first. The override also writes a
        // preference; an explicit one in the bundle is saved after it.
        let history = match &bundle.history {
            Some(_) => Some(self.history.import_history(bundle)?),
            None => None,
        };
        let user_override = bundle
            .user_override
            .is_some_and(|locale| self.preferences.set_override(locale).any_succeeded());
        let preference = bundle
            .preference
            .as_ref()
            .is_some_and(|preference| self.preferences.save(preference).any_succeeded());
        Ok(BundleImportReport { preference, user_override, history })
    }

    /// Parse, validate and import a serialized bundle.
    pub fn import_bundle_json(&self, raw: &str) -> Result<BundleImportReport> {
        let bundle = ExportBundle::from_json(raw).map_err(|e| {
            let err = Error::from(e);
            self.bus.emit_event(&LocaleEvent::error("bundle.import", err.to_string(), self.clock.now_ms()));
            err
        })?;
        self.import_bundle(&bundle)
    }

    /// Backend availability, cache state and history size.
    pub fn status(&self) -> StorageStatus {
        let history = self.history.get_history();
        StorageStatus {
            state_dir: self.state_dir.clone(),
            backends: self.chain.status(),
            cache: self.history.cache_status(),
            history_records: history.len(),
            history_cap: self.history.max_records(),
            total_count: history.total_count,
            preference: self.preferences.get(),
            user_override: self.preferences.get_override(),
        }
    }

    /// Expire old records, collapse repeats, enforce the cap and prune
    /// backups, using the configured limits.
    pub fn run_maintenance(&self) -> Result<MaintenanceReport> {
        let expired = self.history.cleanup_expired(self.config.history.retention_ms())?;
        let deduplicated = self.history.deduplicate(DEFAULT_DEDUPE_WINDOW_MS)?;
        let limited = self.history.enforce_limit(self.config.history.max_records)?;
        let backups_removed = self.history.cleanup_old_backups(self.config.history.keep_backups)?;
        info!(
            expired = expired.removed,
            deduplicated = deduplicated.removed,
            limited = limited.removed,
            backups = backups_removed.len(),
            "maintenance finished"
        );
        Ok(MaintenanceReport { expired, deduplicated, limited, backups_removed })
    }

    /// Remove the preference and override and empty the history. Safe to repeat.
    pub fn clear_all(&self) -> Result<ClearReport> {
        let report = self.preferences.clear_all();
        let cleared = self.history.clear_all()?;
        Ok(ClearReport {
            preference_backends: report.outcomes.iter().filter(|o| o.result.is_ok()).count(),
            history_removed: cleared.removed,
        })
    }

    /// `Set-Cookie` headers for every mirrored key.
    pub fn set_cookie_headers(&self) -> Result<Vec<String>> {
        let Some(cookies) = &self.cookies else {
            return Err(Error::BackendUnavailable { backend: "cookie" });
        };
        keys::COOKIE_MIRRORED.iter().map(|key| cookies.set_cookie_header(key)).collect()
    }

    /// Ingest a `Cookie:` request header. Returns how many cookies were stored.
    pub fn load_cookie_header(&self, header: &str) -> Result<usize> {
        let Some(cookies) = &self.cookies else {
            return Err(Error::BackendUnavailable { backend: "cookie" });
        };
        cookies.load_cookie_header(header)
    }

    /// Live view of the history.
    pub fn bind_history(&self) -> HistoryBinding {
        HistoryBinding::attach(&self.history, &self.bus)
    }

    /// Live view of the preference and override.
    pub fn bind_preference(&self) -> PreferenceBinding {
        PreferenceBinding::attach(&self.preferences, &self.bus)
    }
}

impl std::fmt::Debug for LocaleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocaleManager")
            .field("state_dir", &self.state_dir)
            .field("chain", &self.chain)
            .field("history", &self.history)
            .finish()
    }
}
