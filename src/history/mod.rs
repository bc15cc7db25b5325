//! Bounded audit log of locale detections.
//!
//! The log is ordered newest first and never holds more than the engine's
//! cap; appending past the cap evicts the oldest records. The engine owns
//! the log; the cache only mirrors it.

mod engine;
mod maintenance;
mod query;
mod stats;
mod trends;

pub use engine::{AddedRecord, DEFAULT_MAX_RECORDS, HistoryEngine};
pub use maintenance::{BackupInfo, CleanupReport, HistoryHealth, ImportReport};
pub use query::{HistoryQuery, search_records};
pub use stats::{ConfidenceDistribution, HistoryStats, LocaleCount, SourceCount, compute_stats};
pub use trends::{
    DEFAULT_TREND_WINDOW_DAYS, DayBucket, LocaleTrend, MAX_PREDICT_DAYS, MAX_TREND_WINDOW_DAYS,
    Prediction, TrendAnalysis, TrendDirection, bucket_by_day, classify_trend, growth_rate, linear_slope, predict_counts,
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::detection::{DetectionSource, clamp_confidence};
use crate::error::{Error, Result};
use crate::locale::Locale;
use crate::storage::keys;

/// One observation of a locale decision. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Locale chosen.
    pub locale: Locale,
    /// Tier that chose it.
    pub source: DetectionSource,
    /// When, epoch ms.
    pub timestamp: i64,
    /// Certainty in `[0, 1]`.
    pub confidence: f64,
    /// Free-form annotations.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl DetectionRecord {
    /// Create a record; `confidence` is clamped.
    pub fn new(
        locale: Locale,
        source: DetectionSource,
        confidence: f64,
        timestamp: i64,
        metadata: Map<String, Value>,
    ) -> Self {
        Self { locale, source, timestamp, confidence: clamp_confidence(confidence), metadata }
    }
}

/// The ordered log plus bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionHistory {
    /// Records, newest first.
    pub records: Vec<DetectionRecord>,
    /// Last modification, epoch ms.
    pub last_updated: i64,
    /// Records ever appended, including evicted ones.
    pub total_count: u64,
}

impl DetectionHistory {
    /// An empty history stamped `now_ms`.
    pub fn empty(now_ms: i64) -> Self {
        Self { records: Vec::new(), last_updated: now_ms, total_count: 0 }
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no records are held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Check the invariants every stored or imported history must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.last_updated < 0 {
            return Err(Error::corrupt(keys::HISTORY, "negative lastUpdated"));
        }
        if (self.records.len() as u64) > self.total_count {
            return Err(Error::corrupt(keys::HISTORY, "totalCount smaller than record count"));
        }
        for (i, record) in self.records.iter().enumerate() {
            if !(0.0..=1.0).contains(&record.confidence) {
                return Err(Error::corrupt(
                    keys::HISTORY,
                    format!("record {i}: confidence outside [0, 1]"),
                ));
            }
            if record.timestamp < 0 {
                return Err(Error::corrupt(keys::HISTORY, format!("record {i}: negative timestamp")));
            }
        }
        Ok(())
    }

    /// Parse and validate a stored payload.
    pub fn parse(raw: &str) -> Result<Self> {
        let history: Self =
            serde_json::from_str(raw).map_err(|e| Error::corrupt(keys::HISTORY, e.to_string()))?;
        history.validate()?;
        Ok(history)
    }

    /// Drop the oldest records beyond `max`. Returns how many were dropped.
    pub fn truncate_to(&mut self, max: usize) -> usize {
        let excess = self.records.len().saturating_sub(max);
        self.records.truncate(max);
        excess
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert!(DetectionHistory::parse("not json").is_err());
        assert!(DetectionHistory::parse(r#"{"records":[]}"#).is_err());
        assert!(
            DetectionHistory::parse(r#"{"records":[],"lastUpdated":1,"totalCount":0}"#).is_ok()
        );
        let too_confident = r#"{"records":[{"locale":"en","source":"user","timestamp":1,"confidence":2}],"lastUpdated":1,"totalCount":1}"#;
        assert!(matches!(
            DetectionHistory::parse(too_confident),
            Err(Error::CorruptData { .. })
        ));
        let unknown_locale = r#"{"records":[{"locale":"__proto__","source":"user","timestamp":1,"confidence":1}],"lastUpdated":1,"totalCount":1}"#;
        assert!(DetectionHistory::parse(unknown_locale).is_err());
        let undercounted = r#"{"records":[{"locale":"en","source":"user","timestamp":1,"confidence":1}],"lastUpdated":1,"totalCount":0}"#;
        assert!(DetectionHistory::parse(undercounted).is_err());
    }

    #[test]
    fn test_truncate_drops_oldest() {
        let mut history = DetectionHistory::empty(0);
        for ts in (0..5).rev() {
            history.records.push(DetectionRecord::new(
                Locale::En,
                DetectionSource::Browser,
                0.7,
                ts,
                Map::new(),
            ));
        }
        assert_eq!(history.truncate_to(3), 2);
        assert_eq!(history.records.iter().map(|r| r.timestamp).collect::<Vec<_>>(), vec![4, 3, 2]);
        assert_eq!(history.truncate_to(10), 0);
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_value(DetectionHistory::empty(9)).unwrap();
        assert_eq!(json["lastUpdated"], 9);
        assert_eq!(json["totalCount"], 0);
    }
}
