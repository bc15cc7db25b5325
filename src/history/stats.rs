//! Aggregate statistics over a slice of detection records.

use serde::Serialize;

use super::DetectionRecord;
use crate::clock::DAY_MS;
use crate::detection::DetectionSource;
use crate::locale::Locale;

/// Records per locale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocaleCount {
    /// Locale.
    pub locale: Locale,
    /// Occurrences.
    pub count: usize,
    /// Share of all records, 0-100.
    pub percentage: f64,
}

/// Records per detection tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCount {
    /// Tier.
    pub source: DetectionSource,
    /// Occurrences.
    pub count: usize,
    /// Share of all records, 0-100.
    pub percentage: f64,
}

/// Confidence buckets: high is above 0.8, low is below 0.5.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfidenceDistribution {
    /// `confidence > 0.8`
    pub high: usize,
    /// `0.5 <= confidence <= 0.8`
    pub medium: usize,
    /// `confidence < 0.5`
    pub low: usize,
}

/// Summary of a history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryStats {
    /// Records considered.
    pub total_records: usize,
    /// Per-locale counts, most frequent first.
    pub by_locale: Vec<LocaleCount>,
    /// Per-source counts, most frequent first.
    pub by_source: Vec<SourceCount>,
    /// Mean confidence, 0 for an empty history.
    pub average_confidence: f64,
    /// Confidence buckets.
    pub confidence_distribution: ConfidenceDistribution,
    /// Records per day over the observed span (at least one day).
    pub detection_frequency: f64,
    /// Locale with the highest count.
    pub most_frequent_locale: Option<Locale>,
    /// Source with the highest count.
    pub most_frequent_source: Option<DetectionSource>,
    /// Oldest timestamp, epoch ms.
    pub oldest: Option<i64>,
    /// Newest timestamp, epoch ms.
    pub newest: Option<i64>,
    /// Days between oldest and newest.
    pub span_days: f64,
}

/// Compute [`HistoryStats`] over `records` (newest first).
///
/// Ties for "most frequent" go to the value seen first while walking the
/// slice, which for a stored history is the most recently observed one.
pub fn compute_stats(records: &[DetectionRecord]) -> HistoryStats {
    let total = records.len();

    let locale_counts = tally(records.iter().map(|r| r.locale));
    let source_counts = tally(records.iter().map(|r| r.source));
    let most_frequent_locale = first_with_max(&locale_counts);
    let most_frequent_source = first_with_max(&source_counts);

    let mut distribution = ConfidenceDistribution::default();
    let mut confidence_sum = 0.0;
    for record in records {
        confidence_sum += record.confidence;
        if record.confidence > 0.8 {
            distribution.high += 1;
        } else if record.confidence >= 0.5 {
            distribution.medium += 1;
        } else {
            distribution.low += 1;
        }
    }
    let average_confidence = if total == 0 { 0.0 } else { confidence_sum / total as f64 };

    let oldest = records.iter().map(|r| r.timestamp).min();
    let newest = records.iter().map(|r| r.timestamp).max();
    let span_days = match (oldest, newest) {
        (Some(o), Some(n)) => (n - o) as f64 / DAY_MS as f64,
        _ => 0.0,
    };
    let detection_frequency = if total == 0 { 0.0 } else { total as f64 / span_days.max(1.0) };

    HistoryStats {
        total_records: total,
        by_locale: by_count(locale_counts)
            .into_iter()
            .map(|(locale, count)| LocaleCount { locale, count, percentage: percent(count, total) })
            .collect(),
        by_source: by_count(source_counts)
            .into_iter()
            .map(|(source, count)| SourceCount { source, count, percentage: percent(count, total) })
            .collect(),
        average_confidence,
        confidence_distribution: distribution,
        detection_frequency,
        most_frequent_locale,
        most_frequent_source,
        oldest,
        newest,
        span_days,
    }
}

/// Counts in first-seen order.
fn tally<T: PartialEq + Copy>(items: impl Iterator<Item = T>) -> Vec<(T, usize)> {
    let mut counts: Vec<(T, usize)> = Vec::new();
    for item in items {
        match counts.iter_mut().find(|(seen, _)| *seen == item) {
            Some((_, n)) => *n += 1,
            None => counts.push((item, 1)),
        }
    }
    counts
}

fn first_with_max<T: Copy>(counts: &[(T, usize)]) -> Option<T> {
    let mut best: Option<(T, usize)> = None;
    for &(item, n) in counts {
        if best.is_none_or(|(_, max)| n > max) {
            best = Some((item, n));
        }
    }
    best.map(|(item, _)| item)
}

/// Sorted by descending count; stable, so ties keep first-seen order.
fn by_count<T>(mut counts: Vec<(T, usize)>) -> Vec<(T, usize)> {
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 { 0.0 } else { count as f64 * 100.0 / total as f64 }
}
