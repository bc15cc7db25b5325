//! Versioned export bundles.
//!
//! A bundle snapshots any of the preference, the override and the history,
//! stamped with a format version and an integrity checksum. The checksum is
//! a 32-bit shift-and-add hash that flags accidental corruption or casual
//! edits; it is not a cryptographic guarantee.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ImportError, Result};
use crate::history::DetectionHistory;
use crate::locale::Locale;
use crate::preference::UserLocalePreference;

/// Format version this build writes and accepts.
pub const BUNDLE_VERSION: &str = "1.0.0";

/// Producer name recorded in bundle metadata.
pub const EXPORTED_BY: &str = "langpref";

/// Provenance and integrity data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMetadata {
    /// Producing agent and platform.
    pub user_agent: String,
    /// Producing tool.
    pub exported_by: String,
    /// Checksum over the serialized contents.
    pub data_integrity: String,
}

/// A versioned snapshot of locale state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    /// Format version.
    pub version: String,
    /// Creation time, epoch ms.
    pub timestamp: i64,
    /// Stored preference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preference: Option<UserLocalePreference>,
    /// Explicit user override.
    #[serde(rename = "override", default, skip_serializing_if = "Option::is_none")]
    pub user_override: Option<Locale>,
    /// Detection history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<DetectionHistory>,
    /// Provenance and checksum.
    pub metadata: BundleMetadata,
}

/// The part of a bundle the checksum covers.
#[derive(Serialize)]
struct Contents<'a> {
    preference: Option<&'a UserLocalePreference>,
    #[serde(rename = "override")]
    user_override: Option<Locale>,
    history: Option<&'a DetectionHistory>,
}

impl ExportBundle {
    /// Build a bundle and stamp its checksum.
    pub fn new(
        preference: Option<UserLocalePreference>,
        user_override: Option<Locale>,
        history: Option<DetectionHistory>,
        timestamp: i64,
    ) -> Result<Self> {
        let mut bundle = Self {
            version: BUNDLE_VERSION.to_string(),
            timestamp,
            preference,
            user_override,
            history,
            metadata: BundleMetadata {
                user_agent: user_agent(),
                exported_by: EXPORTED_BY.to_string(),
                data_integrity: String::new(),
            },
        };
        bundle.metadata.data_integrity = bundle.compute_checksum()?;
        Ok(bundle)
    }

    /// A bundle carrying only a history.
    pub fn for_history(history: DetectionHistory, timestamp: i64) -> Result<Self> {
        Self::new(None, None, Some(history), timestamp)
    }

    /// Checksum of the current contents.
    pub fn compute_checksum(&self) -> serde_json::Result<String> {
        let contents = Contents {
            preference: self.preference.as_ref(),
            user_override: self.user_override,
            history: self.history.as_ref(),
        };
        Ok(checksum(&serde_json::to_string(&contents)?))
    }

    /// Number of history records carried.
    pub fn record_count(&self) -> usize {
        self.history.as_ref().map_or(0, DetectionHistory::len)
    }

    /// Check version, checksum and the shape of every part present.
    pub fn validate(&self) -> std::result::Result<(), ImportError> {
        if self.version != BUNDLE_VERSION {
            return Err(ImportError::VersionMismatch {
                found: self.version.clone(),
                expected: BUNDLE_VERSION,
            });
        }
        let actual =
            self.compute_checksum().map_err(|e| ImportError::Unreadable(e.to_string()))?;
        if actual != self.metadata.data_integrity {
            return Err(ImportError::ChecksumMismatch {
                expected: self.metadata.data_integrity.clone(),
                actual,
            });
        }
        if let Some(preference) = &self.preference {
            preference.validate().map_err(|e| ImportError::InvalidShape(e.to_string()))?;
        }
        if let Some(history) = &self.history {
            history.validate().map_err(|e| ImportError::InvalidShape(e.to_string()))?;
        }
        Ok(())
    }

    /// Parse and validate a serialized bundle.
    ///
    /// The version is checked before the rest of the shape, so a bundle from
    /// an incompatible format reports a version mismatch rather than a parse
    /// failure.
    pub fn from_json(raw: &str) -> std::result::Result<Self, ImportError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| ImportError::Unreadable(e.to_string()))?;
        let Some(object) = value.as_object() else {
            return Err(ImportError::InvalidShape("bundle is not an object".into()));
        };
        match object.get("version").and_then(Value::as_str) {
            Some(BUNDLE_VERSION) => {},
            Some(other) => {
                return Err(ImportError::VersionMismatch {
                    found: other.to_string(),
                    expected: BUNDLE_VERSION,
                });
            },
            None => return Err(ImportError::InvalidShape("missing version".into())),
        }
        let bundle: Self =
            serde_json::from_value(value).map_err(|e| ImportError::InvalidShape(e.to_string()))?;
        bundle.validate()?;
        Ok(bundle)
    }
}

fn user_agent() -> String {
    format!(
        "langpref/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// 32-bit shift-and-add hash over the UTF-16 code units of `data`, as
/// eight lowercase hex digits.
pub fn checksum(data: &str) -> String {
    let mut hash: i32 = 0;
    for unit in data.encode_utf16() {
        hash = (hash << 5).wrapping_sub(hash).wrapping_add(i32::from(unit));
    }
    format!("{:08x}", hash as u32)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::detection::DetectionSource;
    use crate::history::DetectionRecord;

    fn history() -> DetectionHistory {
        let mut history = DetectionHistory::empty(10);
        history.records.push(DetectionRecord::new(
            Locale::Zh,
            DetectionSource::Browser,
            0.7,
            10,
            Map::new(),
        ));
        history.total_count = 1;
        history
    }

    #[test]
    fn test_checksum_known_values() {
        assert_eq!(checksum(""), "00000000");
        // 'a' = 97
        assert_eq!(checksum("a"), "00000061");
        // 31 * 97 + 98
        assert_eq!(checksum("ab"), format!("{:08x}", 31 * 97 + 98));
        assert_ne!(checksum("ab"), checksum("ba"));
    }

    #[test]
    fn test_checksum_wraps_without_panicking() {
        let long = "z".repeat(10_000);
        assert_eq!(checksum(&long).len(), 8);
    }

    #[test]
    fn test_round_trip_through_json() {
        let pref = UserLocalePreference::new(Locale::Zh, DetectionSource::User, 1.0, 3);
        let bundle = ExportBundle::new(Some(pref), Some(Locale::Zh), Some(history()), 99).unwrap();
        let json = serde_json::to_string(&bundle).unwrap();
        assert!(json.contains("\"override\":\"zh\""));
        assert!(json.contains("\"dataIntegrity\""));
        assert_eq!(ExportBundle::from_json(&json).unwrap(), bundle);
    }

    #[test]
    fn test_awkward_confidence_survives_reparse() {
        let mut history = history();
        history.records[0].confidence = 0.985_690_694_632_869_5;
        let bundle = ExportBundle::for_history(history, 1).unwrap();
        let json = serde_json::to_string(&bundle).unwrap();
        assert_eq!(ExportBundle::from_json(&json).unwrap(), bundle);
    }

    #[test]
    fn test_tampering_is_detected() {
        let bundle = ExportBundle::for_history(history(), 1).unwrap();
        let mut value = serde_json::to_value(&bundle).unwrap();
        value["history"]["records"][0]["locale"] = "en".into();
        let err = ExportBundle::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, ImportError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_version_mismatch_wins_over_shape() {
        let err = ExportBundle::from_json(r#"{"version":"2.0.0","whatever":true}"#).unwrap_err();
        assert_eq!(err, ImportError::VersionMismatch { found: "2.0.0".into(), expected: BUNDLE_VERSION });
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(matches!(ExportBundle::from_json("nope"), Err(ImportError::Unreadable(_))));
        assert!(matches!(ExportBundle::from_json("[]"), Err(ImportError::InvalidShape(_))));
        assert!(matches!(
            ExportBundle::from_json(r#"{"version":"1.0.0","timestamp":1}"#),
            Err(ImportError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_invalid_history_rejected_even_with_matching_checksum() {
        let mut broken = history();
        broken.total_count = 0;
        let bundle = ExportBundle::for_history(broken, 1).unwrap();
        assert!(matches!(bundle.validate(), Err(ImportError::InvalidShape(_))));
    }
}
