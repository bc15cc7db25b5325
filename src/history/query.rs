//! Filtering and free-text search over the in-memory log.
//!
//! The log is bounded, so every query is a linear scan.

use serde::Serialize;
use serde_json::Value;

use super::DetectionRecord;
use crate::detection::DetectionSource;
use crate::error::{Error, Result};
use crate::locale::Locale;

/// Conjunctive filter over detection records. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, bon::Builder)]
pub struct HistoryQuery {
    /// Exact locale.
    pub locale: Option<Locale>,
    /// Exact source.
    pub source: Option<DetectionSource>,
    /// Inclusive lower confidence bound.
    pub min_confidence: Option<f64>,
    /// Inclusive upper confidence bound.
    pub max_confidence: Option<f64>,
    /// Inclusive lower timestamp bound, epoch ms.
    pub since: Option<i64>,
    /// Inclusive upper timestamp bound, epoch ms.
    pub until: Option<i64>,
    /// Case-insensitive substring over locale, source and metadata.
    #[builder(into)]
    pub text: Option<String>,
    /// Return at most this many records.
    pub limit: Option<usize>,
}

impl HistoryQuery {
    /// Reject bounds that can never match.
    pub fn validate(&self) -> Result<()> {
        for bound in [self.min_confidence, self.max_confidence].into_iter().flatten() {
            if !(0.0..=1.0).contains(&bound) {
                return Err(Error::invalid_input(format!("confidence bound {bound} outside [0, 1]")));
            }
        }
        if let (Some(min), Some(max)) = (self.min_confidence, self.max_confidence)
            && min > max
        {
            return Err(Error::invalid_input("min confidence is greater than max confidence"));
        }
        if let (Some(since), Some(until)) = (self.since, self.until)
            && since > until
        {
            return Err(Error::invalid_input("time range start is after its end"));
        }
        Ok(())
    }

    /// Whether `record` passes every set filter.
    pub fn matches(&self, record: &DetectionRecord) -> bool {
        self.locale.is_none_or(|l| record.locale == l)
            && self.source.is_none_or(|s| record.source == s)
            && self.min_confidence.is_none_or(|min| record.confidence >= min)
            && self.max_confidence.is_none_or(|max| record.confidence <= max)
            && self.since.is_none_or(|since| record.timestamp >= since)
            && self.until.is_none_or(|until| record.timestamp <= until)
            && self.text.as_deref().is_none_or(|text| record_contains(record, &text.to_lowercase()))
    }

    /// Matching records in their original order, honouring `limit`.
    pub fn apply(&self, records: &[DetectionRecord]) -> Vec<DetectionRecord> {
        records
            .iter()
            .filter(|r| self.matches(r))
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

/// Records whose locale, source or metadata contain `text`, case-insensitively.
///
/// An empty or blank needle matches nothing.
pub fn search_records(records: &[DetectionRecord], text: &str) -> Vec<DetectionRecord> {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    records.iter().filter(|r| record_contains(r, &needle)).cloned().collect()
}

fn record_contains(record: &DetectionRecord, needle: &str) -> bool {
    record.locale.code().contains(needle)
        || record.locale.native_name().to_lowercase().contains(needle)
        || record.source.as_str().contains(needle)
        || record
            .metadata
            .iter()
            .any(|(key, value)| key.to_lowercase().contains(needle) || value_contains(value, needle))
}

fn value_contains(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Number(n) => n.to_string().contains(needle),
        Value::Bool(b) => b.to_string().contains(needle),
        Value::Array(items) => items.iter().any(|v| value_contains(v, needle)),
        Value::Object(map) => {
            map.iter().any(|(k, v)| k.to_lowercase().contains(needle) || value_contains(v, needle))
        },
        Value::Null => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::{Map, json};

    use super::*;

    fn record(locale: Locale, source: DetectionSource, confidence: f64, ts: i64) -> DetectionRecord {
        DetectionRecord::new(locale, source, confidence, ts, Map::new())
    }

    fn sample() -> Vec<DetectionRecord> {
        let mut tagged = record(Locale::En, DetectionSource::Browser, 0.7, 30);
        tagged.metadata.insert("page".into(), json!("/Pricing"));
        tagged.metadata.insert("attempt".into(), json!(3));
        vec![
            tagged,
            record(Locale::Zh, DetectionSource::User, 1.0, 20),
            record(Locale::En, DetectionSource::Default, 0.5, 10),
        ]
    }

    #[test]
    fn test_filters_combine() {
        let records = sample();
        let q = HistoryQuery::builder().locale(Locale::En).min_confidence(0.6).build();
        let hits = q.apply(&records);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].timestamp, 30);

        let q = HistoryQuery::builder().since(15).until(25).build();
        assert_eq!(q.apply(&records)[0].locale, Locale::Zh);

        let q = HistoryQuery::builder().source(DetectionSource::Default).build();
        assert_eq!(q.apply(&records).len(), 1);
    }

    #[test]
    fn test_limit_keeps_newest() {
        let q = HistoryQuery::builder().limit(2).build();
        let hits = q.apply(&sample());
        assert_eq!(hits.iter().map(|r| r.timestamp).collect::<Vec<_>>(), vec![30, 20]);
    }

    #[test]
    fn test_empty_query_matches_all() {
        assert_eq!(HistoryQuery::default().apply(&sample()).len(), 3);
    }

    #[test]
    fn test_validate_bounds() {
        assert!(HistoryQuery::builder().min_confidence(0.9).max_confidence(0.1).build().validate().is_err());
        assert!(HistoryQuery::builder().max_confidence(1.5).build().validate().is_err());
        assert!(HistoryQuery::builder().since(5).until(1).build().validate().is_err());
        assert!(HistoryQuery::builder().min_confidence(0.1).max_confidence(0.9).build().validate().is_ok());
    }

    #[test]
    fn test_search_metadata_and_names() {
        let records = sample();
        assert_eq!(search_records(&records, "pricing").len(), 1);
        assert_eq!(search_records(&records, "ATTEMPT").len(), 1);
        assert_eq!(search_records(&records, "zh").len(), 1);
        assert_eq!(search_records(&records, "中文").len(), 1);
        assert_eq!(search_records(&records, "user").len(), 1);
        assert!(search_records(&records, "  ").is_empty());
        assert!(search_records(&records, "fr").is_empty());
    }

    #[test]
    fn test_text_filter_in_query() {
        let q = HistoryQuery::builder().text("pricing").build();
        assert_eq!(q.apply(&sample()).len(), 1);
    }
}
