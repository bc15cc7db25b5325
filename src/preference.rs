//! The current-preference record and the explicit user override.
//!
//! Writes go to every backend independently and never fail the caller:
//! backend errors are logged, raised as `error` events and returned in the
//! [`WriteReport`]. Reads try the primary backend, then the secondary, and
//! finally synthesize a default preference, so "no preference" and "default
//! preference" look the same to callers.

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::clock::Clock;
use crate::detection::{DEFAULT_CONFIDENCE, DetectionSource, OverrideSource, clamp_confidence};
use crate::error::{Error, Result};
use crate::events::{EventBus, LocaleEvent, PreferenceChange};
use crate::locale::Locale;
use crate::storage::{BackendChain, BackendStatus, ChainRead, WriteReport, keys};

/// The singleton preference record for this profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLocalePreference {
    /// Preferred locale.
    pub locale: Locale,
    /// How it was chosen.
    pub source: DetectionSource,
    /// When it was chosen, epoch ms.
    pub timestamp: i64,
    /// Certainty in `[0, 1]`.
    pub confidence: f64,
    /// Free-form annotations.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl UserLocalePreference {
    /// Create a preference; `confidence` is clamped.
    pub fn new(locale: Locale, source: DetectionSource, confidence: f64, timestamp: i64) -> Self {
        Self {
            locale,
            source,
            timestamp,
            confidence: clamp_confidence(confidence),
            metadata: Map::new(),
        }
    }

    /// The synthesized preference used when nothing is stored.
    pub fn fallback(locale: Locale, timestamp: i64) -> Self {
        Self::new(locale, DetectionSource::Default, DEFAULT_CONFIDENCE, timestamp)
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Check the invariants a stored record must satisfy.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::corrupt(keys::PREFERENCE, "confidence outside [0, 1]"));
        }
        if self.timestamp < 0 {
            return Err(Error::corrupt(keys::PREFERENCE, "negative timestamp"));
        }
        Ok(())
    }

    /// Parse and validate a stored payload.
    pub fn parse(raw: &str) -> Result<Self> {
        let pref: Self = serde_json::from_str(raw)
            .map_err(|e| Error::corrupt(keys::PREFERENCE, e.to_string()))?;
        pref.validate()?;
        Ok(pref)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredOverride {
    locale: Locale,
    timestamp: i64,
}

/// Parse an override payload: the JSON record, or a bare supported code.
fn parse_override(raw: &str) -> Result<Locale> {
    if let Ok(stored) = serde_json::from_str::<StoredOverride>(raw) {
        return Ok(stored.locale);
    }
    Locale::from_code(raw).ok_or_else(|| Error::corrupt(keys::OVERRIDE, "not a supported locale"))
}

/// Reads and writes the preference and override records.
pub struct PreferenceStore {
    chain: Rc<BackendChain>,
    bus: Rc<EventBus>,
    clock: Rc<dyn Clock>,
    default_locale: Locale,
}

impl PreferenceStore {
    /// Create a store over a shared backend chain.
    pub fn new(
        chain: Rc<BackendChain>,
        bus: Rc<EventBus>,
        clock: Rc<dyn Clock>,
        default_locale: Locale,
    ) -> Self {
        Self { chain, bus, clock, default_locale }
    }

    /// The stored preference, or a synthesized default.
    pub fn get(&self) -> UserLocalePreference {
        match self.chain.read(keys::PREFERENCE, UserLocalePreference::parse) {
            ChainRead::Found { value, backend } => {
                debug!(backend, locale = %value.locale, "preference loaded");
                value
            },
            ChainRead::Corrupt(e) => {
                self.report_error("preference.get", &e);
                UserLocalePreference::fallback(self.default_locale, self.clock.now_ms())
            },
            ChainRead::Missing => {
                UserLocalePreference::fallback(self.default_locale, self.clock.now_ms())
            },
        }
    }

    /// Whether a real (non-synthesized) preference is stored anywhere.
    pub fn has_stored(&self) -> bool {
        matches!(
            self.chain.read(keys::PREFERENCE, UserLocalePreference::parse),
            ChainRead::Found { .. }
        )
    }

    /// Persist a preference to every backend.
    pub fn save(&self, preference: &UserLocalePreference) -> WriteReport {
        let mut preference = preference.clone();
        preference.confidence = clamp_confidence(preference.confidence);
        let report = match serde_json::to_string(&preference) {
            Ok(json) => self.chain.write(keys::PREFERENCE, &json),
            Err(e) => {
                self.report_error("preference.save", &Error::from(e));
                return WriteReport::default();
            },
        };
        self.finish("preference.save", &report);
        if report.any_succeeded() {
            self.changed(PreferenceChange::Saved, Some(preference.locale), Some(preference.source));
        }
        report
    }

    /// Store an explicit user override and record it as the preference.
    pub fn set_override(&self, locale: Locale) -> WriteReport {
        let now = self.clock.now_ms();
        let stored = StoredOverride { locale, timestamp: now };
        let report = match serde_json::to_string(&stored) {
            Ok(json) => self.chain.write(keys::OVERRIDE, &json),
            Err(e) => {
                self.report_error("preference.set_override", &Error::from(e));
                return WriteReport::default();
            },
        };
        self.finish("preference.set_override", &report);

        let preference = UserLocalePreference::new(locale, DetectionSource::User, 1.0, now);
        if let Ok(json) = serde_json::to_string(&preference) {
            let pref_report = self.chain.write(keys::PREFERENCE, &json);
            self.finish("preference.set_override", &pref_report);
        }

        if report.any_succeeded() {
            self.changed(PreferenceChange::OverrideSet, Some(locale), Some(DetectionSource::User));
        }
        report
    }

    /// The stored override, if present and supported.
    pub fn get_override(&self) -> Option<Locale> {
        match self.chain.read(keys::OVERRIDE, parse_override) {
            ChainRead::Found { value, .. } => Some(value),
            ChainRead::Corrupt(e) => {
                self.report_error("preference.get_override", &e);
                None
            },
            ChainRead::Missing => None,
        }
    }

    /// Remove the override from every backend.
    pub fn clear_override(&self) -> WriteReport {
        let report = self.chain.remove(keys::OVERRIDE);
        self.finish("preference.clear_override", &report);
        if report.any_succeeded() {
            self.changed(PreferenceChange::OverrideCleared, None, None);
        }
        report
    }

    /// Remove the preference and override from every backend.
    ///
    /// Cookies are expired rather than left to age out. Safe to repeat.
    pub fn clear_all(&self) -> WriteReport {
        let mut report = self.chain.remove(keys::PREFERENCE);
        report.outcomes.extend(self.chain.remove(keys::OVERRIDE).outcomes);
        self.finish("preference.clear_all", &report);
        if report.any_succeeded() {
            self.changed(PreferenceChange::Cleared, None, None);
        }
        report
    }

    /// Availability of each backend.
    pub fn availability(&self) -> Vec<BackendStatus> {
        self.chain.status()
    }

    fn finish(&self, operation: &str, report: &WriteReport) {
        for (backend, error) in report.failures() {
            if !matches!(error, Error::BackendUnavailable { .. }) {
                let message = format!("{backend}: {error}");
                self.bus.emit_event(&LocaleEvent::error(operation, message, self.clock.now_ms()));
            }
        }
    }

    fn report_error(&self, operation: &str, error: &Error) {
        self.bus.emit_event(&LocaleEvent::error(operation, error.to_string(), self.clock.now_ms()));
    }

    fn changed(
        &self,
        change: PreferenceChange,
        locale: Option<Locale>,
        source: Option<DetectionSource>,
    ) {
        self.bus.emit_event(&LocaleEvent::PreferenceChanged {
            change,
            locale,
            source,
            timestamp: self.clock.now_ms(),
        });
    }
}

impl OverrideSource for PreferenceStore {
    fn user_override(&self) -> Option<Locale> {
        self.get_override()
    }
}

impl std::fmt::Debug for PreferenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceStore")
            .field("chain", &self.chain)
            .field("default_locale", &self.default_locale)
            .finish()
    }
}
