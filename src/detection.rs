//! Locale detection.
//!
//! Resolution order (highest to lowest priority):
//! 1. Explicit user override, if stored and supported (confidence 1.0)
//! 2. First browser-reported language that maps to a supported locale
//! 3. The configured default locale
//!
//! Resolution never fails: malformed or unsupported candidates fall through
//! to the next tier. Results are recomputed on every call.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::locale::{LanguageSource, Locale, map_browser_language, sanitize_for_display};

/// Confidence of an explicit user choice.
pub const USER_CONFIDENCE: f64 = 1.0;
/// Default confidence of a browser-language match.
pub const BROWSER_CONFIDENCE: f64 = 0.7;
/// Default confidence of the fallback locale.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Where a locale decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    /// Explicit user action.
    User,
    /// Browser or host language list.
    Browser,
    /// Built-in fallback.
    Default,
}

impl DetectionSource {
    /// All sources, in precedence order.
    pub const ALL: [DetectionSource; 3] =
        [DetectionSource::User, DetectionSource::Browser, DetectionSource::Default];

    /// Lower-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            DetectionSource::User => "user",
            DetectionSource::Browser => "browser",
            DetectionSource::Default => "default",
        }
    }

    /// Parse a source name, exact lower-case match only.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "user" => Some(DetectionSource::User),
            "browser" => Some(DetectionSource::Browser),
            "default" => Some(DetectionSource::Default),
            _ => None,
        }
    }
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clamp a confidence into `[0, 1]`. `NaN` becomes 0.
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) }
}

/// Read access to a stored user override.
pub trait OverrideSource {
    /// The stored override, if present and valid.
    fn user_override(&self) -> Option<Locale>;
}

/// How a detection decision was reached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionDetails {
    /// A stored override existed.
    pub override_present: bool,
    /// Raw browser language that matched, if the browser tier won.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_language: Option<String>,
    /// Browser languages looked at before a decision.
    pub candidates_examined: usize,
    /// Browser languages that did not map, sanitized for display.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub rejected: Vec<String>,
}

/// Outcome of one resolution. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Chosen locale.
    pub locale: Locale,
    /// Tier that produced it.
    pub source: DetectionSource,
    /// Certainty in `[0, 1]`.
    pub confidence: f64,
    /// Audit details.
    pub details: DetectionDetails,
}

/// Ranks candidate locales by fixed precedence.
#[derive(Debug, Clone)]
pub struct Resolver {
    default_locale: Locale,
    browser_confidence: f64,
    default_confidence: f64,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(Locale::En)
    }
}

impl Resolver {
    /// Create a resolver with the standard confidence weights.
    pub fn new(default_locale: Locale) -> Self {
        Self {
            default_locale,
            browser_confidence: BROWSER_CONFIDENCE,
            default_confidence: DEFAULT_CONFIDENCE,
        }
    }

    /// Override the browser and default tier weights (clamped).
    pub fn with_weights(mut self, browser: f64, default: f64) -> Self {
        self.browser_confidence = clamp_confidence(browser);
        self.default_confidence = clamp_confidence(default);
        self
    }

    /// Locale returned when nothing better is known.
    pub fn default_locale(&self) -> Locale {
        self.default_locale
    }

    /// Resolve using a stored override and a language source.
    pub fn resolve(
        &self,
        overrides: &dyn OverrideSource,
        languages: &dyn LanguageSource,
    ) -> DetectionResult {
        self.resolve_with(overrides.user_override(), &languages.languages())
    }

    /// Resolve from already-fetched inputs.
    pub fn resolve_with(
        &self,
        user_override: Option<Locale>,
        languages: &[String],
    ) -> DetectionResult {
        let mut details =
            DetectionDetails { override_present: user_override.is_some(), ..Default::default() };

        if let Some(locale) = user_override {
            debug!(%locale, "resolved from user override");
            return DetectionResult {
                locale,
                source: DetectionSource::User,
                confidence: USER_CONFIDENCE,
                details,
            };
        }

        for raw in languages {
            details.candidates_examined += 1;
            match map_browser_language(raw) {
                Some(locale) => {
                    debug!(%locale, candidates = details.candidates_examined, "resolved from browser language");
                    details.matched_language = Some(sanitize_for_display(raw));
                    return DetectionResult {
                        locale,
                        source: DetectionSource::Browser,
                        confidence: self.browser_confidence,
                        details,
                    };
                },
                None => details.rejected.push(sanitize_for_display(raw)),
            }
        }

        debug!(locale = %self.default_locale, "resolved to default locale");
        DetectionResult {
            locale: self.default_locale,
            source: DetectionSource::Default,
            confidence: self.default_confidence,
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::StaticLanguages;

    struct Stored(Option<Locale>);

    impl OverrideSource for Stored {
        fn user_override(&self) -> Option<Locale> {
            self.0
        }
    }

    fn langs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_override_beats_browser() {
        let result = Resolver::default()
            .resolve(&Stored(Some(Locale::Zh)), &StaticLanguages::new(["en-US"]));
        assert_eq!(result.locale, Locale::Zh);
        assert_eq!(result.source, DetectionSource::User);
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
        assert!(result.details.override_present);
    }

    #[test]
    fn test_browser_first_match_wins() {
        let result = Resolver::default().resolve_with(None, &langs(&["fr-FR", "zh-TW", "en"]));
        assert_eq!(result.locale, Locale::Zh);
        assert_eq!(result.source, DetectionSource::Browser);
        assert!((result.confidence - BROWSER_CONFIDENCE).abs() < f64::EPSILON);
        assert_eq!(result.details.candidates_examined, 2);
        assert_eq!(result.details.rejected, vec!["fr-FR".to_string()]);
        assert_eq!(result.details.matched_language.as_deref(), Some("zh-TW"));
    }

    #[test]
    fn test_unsupported_falls_to_default() {
        let result = Resolver::default().resolve_with(None, &langs(&["fr-FR"]));
        assert_eq!(result.locale, Locale::En);
        assert_eq!(result.source, DetectionSource::Default);
        assert!((result.confidence - DEFAULT_CONFIDENCE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_and_malformed_lists() {
        let resolver = Resolver::new(Locale::Zh);
        assert_eq!(resolver.resolve_with(None, &[]).source, DetectionSource::Default);
        let result = resolver.resolve_with(None, &langs(&["", "  ", "en;q", "\u{0}"]));
        assert_eq!(result.locale, Locale::Zh);
        assert_eq!(result.details.rejected.len(), 4);
    }

    #[test]
    fn test_prototype_names_resolve_to_default() {
        for bad in ["__proto__", "constructor", "prototype", "hasOwnProperty"] {
            let result = Resolver::default().resolve_with(None, &langs(&[bad]));
            assert_eq!(result.locale, Locale::En);
            assert_eq!(result.source, DetectionSource::Default);
        }
    }

    #[test]
    fn test_custom_weights_are_clamped() {
        let resolver = Resolver::default().with_weights(3.0, -1.0);
        assert!((resolver.resolve_with(None, &langs(&["en"])).confidence - 1.0).abs() < f64::EPSILON);
        assert!(resolver.resolve_with(None, &[]).confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn test_clamp_confidence() {
        assert!((clamp_confidence(5.0) - 1.0).abs() < f64::EPSILON);
        assert!(clamp_confidence(-3.0).abs() < f64::EPSILON);
        assert!(clamp_confidence(f64::NAN).abs() < f64::EPSILON);
        assert!((clamp_confidence(0.42) - 0.42).abs() < f64::EPSILON);
    }

    #[test]
    fn test_source_names() {
        for source in DetectionSource::ALL {
            assert_eq!(DetectionSource::from_name(source.as_str()), Some(source));
        }
        assert_eq!(DetectionSource::from_name("__proto__"), None);
    }
}
