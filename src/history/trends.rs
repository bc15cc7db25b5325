//! Day-bucketed trend math.
//!
//! Everything here is a pure function of a record slice and a reference
//! time; the engine only supplies its current history and clock.

use chrono::{DateTime, Days, NaiveDate};
use serde::Serialize;

use super::{DetectionRecord, HistoryEngine};
use crate::locale::Locale;

/// Default trend window.
pub const DEFAULT_TREND_WINDOW_DAYS: u32 = 7;

/// Longest trend window, in days.
pub const MAX_TREND_WINDOW_DAYS: u32 = 366;

/// Furthest prediction horizon, in days.
pub const MAX_PREDICT_DAYS: u32 = 90;

/// Slopes smaller than this in magnitude classify as stable.
const STABLE_SLOPE: f64 = 0.1;

/// Buckets the direction is classified from.
const DIRECTION_BUCKETS: usize = 3;

/// Buckets the prediction baseline is taken from.
const PREDICTION_BASELINE_DAYS: usize = 7;

/// One UTC calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayBucket {
    /// The day.
    pub date: NaiveDate,
    /// Records that day.
    pub count: usize,
    /// Mean confidence that day, 0 for an empty day.
    pub mean_confidence: f64,
}

/// Direction of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    /// Slope at or above the dead zone.
    Increasing,
    /// Slope at or below the negative dead zone.
    Decreasing,
    /// Within the dead zone.
    Stable,
}

impl TrendDirection {
    /// Lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
            Self::Stable => "stable",
        }
    }
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicted count for a future day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// The day.
    pub date: NaiveDate,
    /// Expected records, never negative.
    pub predicted_count: f64,
}

/// Direction of one locale's daily counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocaleTrend {
    /// Locale.
    pub locale: Locale,
    /// Records in the window.
    pub total: usize,
    /// Slope over the classification buckets.
    pub slope: f64,
    /// Classification.
    pub direction: TrendDirection,
}

/// Full trend report over a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendAnalysis {
    /// Window length in days.
    pub window_days: u32,
    /// Oldest first.
    pub buckets: Vec<DayBucket>,
    /// Slope over the classification buckets.
    pub slope: f64,
    /// Classification of all records.
    pub direction: TrendDirection,
    /// Percent change between the last two periods.
    pub growth_rate: f64,
    /// Period used for the growth rate.
    pub growth_period_days: usize,
    /// Per-locale classification.
    pub by_locale: Vec<LocaleTrend>,
    /// Extrapolated counts after the window.
    pub predictions: Vec<Prediction>,
}

fn day_of(timestamp_ms: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(timestamp_ms).map(|dt| dt.date_naive())
}

/// Bucket `records` into the `window_days` UTC days ending on the day of
/// `now_ms`, oldest first. Days without records are present with zero count.
pub fn bucket_by_day(records: &[DetectionRecord], now_ms: i64, window_days: u32) -> Vec<DayBucket> {
    let window = window_days.clamp(1, MAX_TREND_WINDOW_DAYS);
    let Some(today) = day_of(now_ms) else {
        return Vec::new();
    };
    let Some(first) = today.checked_sub_days(Days::new(u64::from(window - 1))) else {
        return Vec::new();
    };

    let mut buckets: Vec<(NaiveDate, usize, f64)> =
        first.iter_days().take(window as usize).map(|d| (d, 0, 0.0)).collect();
    for record in records {
        let Some(day) = day_of(record.timestamp) else { continue };
        if let Some(bucket) = buckets.iter_mut().find(|(d, _, _)| *d == day) {
            bucket.1 += 1;
            bucket.2 += record.confidence;
        }
    }
    buckets
        .into_iter()
        .map(|(date, count, sum)| DayBucket {
            date,
            count,
            mean_confidence: if count == 0 { 0.0 } else { sum / count as f64 },
        })
        .collect()
}

/// Least-squares slope of `ys` against `0..n`. Zero for fewer than two points.
pub fn linear_slope(ys: &[f64]) -> f64 {
    let n = ys.len() as f64;
    if ys.len() < 2 {
        return 0.0;
    }
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = ys.iter().sum::<f64>() / n;
    let (mut num, mut den) = (0.0, 0.0);
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    if den.abs() < f64::EPSILON { 0.0 } else { num / den }
}

/// Classify a daily series from the slope of its last three values.
pub fn classify_trend(counts: &[f64]) -> TrendDirection {
    direction_of(tail_slope(counts))
}

fn tail_slope(counts: &[f64]) -> f64 {
    linear_slope(&counts[counts.len().saturating_sub(DIRECTION_BUCKETS)..])
}

fn direction_of(slope: f64) -> TrendDirection {
    if slope >= STABLE_SLOPE {
        TrendDirection::Increasing
    } else if slope <= -STABLE_SLOPE {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    }
}

/// Percent change between the mean of the last `period` values and the mean
/// of the `period` values before them.
///
/// With a zero prior mean the result is 100 when the recent mean is positive
/// and 0 otherwise. Series shorter than two periods compare whatever is there.
pub fn growth_rate(counts: &[f64], period: usize) -> f64 {
    let period = period.max(1);
    let split = counts.len().saturating_sub(period);
    let recent = &counts[split..];
    let prior = &counts[split.saturating_sub(period)..split];
    let mean = |s: &[f64]| if s.is_empty() { 0.0 } else { s.iter().sum::<f64>() / s.len() as f64 };
    let (recent, prior) = (mean(recent), mean(prior));
    if prior.abs() < f64::EPSILON {
        return if recent > 0.0 { 100.0 } else { 0.0 };
    }
    (recent - prior) / prior * 100.0
}

/// Extrapolate `days` future values from the trailing-week mean plus the
/// trailing-week slope, floored at zero. At most [`MAX_PREDICT_DAYS`] values.
pub fn predict_counts(counts: &[f64], days: usize) -> Vec<f64> {
    let days = days.min(MAX_PREDICT_DAYS as usize);
    let baseline = &counts[counts.len().saturating_sub(PREDICTION_BASELINE_DAYS)..];
    if baseline.is_empty() {
        return vec![0.0; days];
    }
    let mean = baseline.iter().sum::<f64>() / baseline.len() as f64;
    let slope = linear_slope(baseline);
    (1..=days).map(|step| (mean + slope * step as f64).max(0.0)).collect()
}

/// Build a [`TrendAnalysis`] for `records` as of `now_ms`.
pub fn analyze(
    records: &[DetectionRecord],
    now_ms: i64,
    window_days: u32,
    growth_period: usize,
    predict_days: usize,
) -> TrendAnalysis {
    let buckets = bucket_by_day(records, now_ms, window_days);
    let counts: Vec<f64> = buckets.iter().map(|b| b.count as f64).collect();
    let slope = tail_slope(&counts);

    let by_locale = Locale::ALL
        .iter()
        .filter_map(|&locale| {
            let own: Vec<DetectionRecord> =
                records.iter().filter(|r| r.locale == locale).cloned().collect();
            let series: Vec<f64> =
                bucket_by_day(&own, now_ms, window_days).iter().map(|b| b.count as f64).collect();
            let total = series.iter().sum::<f64>() as usize;
            (total > 0).then(|| {
                let slope = tail_slope(&series);
                LocaleTrend { locale, total, slope, direction: direction_of(slope) }
            })
        })
        .collect();

    let predictions = match buckets.last() {
        Some(last) => predict_counts(&counts, predict_days)
            .into_iter()
            .zip(last.date.iter_days().skip(1))
            .map(|(predicted_count, date)| Prediction { date, predicted_count })
            .collect(),
        None => Vec::new(),
    };

    TrendAnalysis {
        window_days: window_days.clamp(1, MAX_TREND_WINDOW_DAYS),
        buckets,
        slope,
        direction: direction_of(slope),
        growth_rate: growth_rate(&counts, growth_period),
        growth_period_days: growth_period.max(1),
        by_locale,
        predictions,
    }
}

impl HistoryEngine {
    /// Trend report over the current history.
    pub fn trends(&self, window_days: u32, growth_period: usize, predict_days: usize) -> TrendAnalysis {
        analyze(&self.get_history().records, self.now_ms(), window_days, growth_period, predict_days)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::clock::DAY_MS;
    use crate::detection::DetectionSource;

    // 2023-11-14T22:13:20Z
    const NOW: i64 = 1_700_000_000_000;

    fn rec(locale: Locale, ts: i64, confidence: f64) -> DetectionRecord {
        DetectionRecord::new(locale, DetectionSource::Browser, confidence, ts, Map::new())
    }

    #[test]
    fn test_classify_examples() {
        assert_eq!(classify_trend(&[1.0, 3.0, 6.0]), TrendDirection::Increasing);
        assert_eq!(classify_trend(&[4.0, 4.0, 4.0]), TrendDirection::Stable);
        assert_eq!(classify_trend(&[6.0, 3.0, 1.0]), TrendDirection::Decreasing);
        assert_eq!(classify_trend(&[9.0, 0.0, 4.0, 4.0, 4.05]), TrendDirection::Stable);
        assert_eq!(classify_trend(&[]), TrendDirection::Stable);
    }

    #[test]
    fn test_linear_slope() {
        assert!((linear_slope(&[1.0, 3.0, 6.0]) - 2.5).abs() < 1e-9);
        assert!((linear_slope(&[0.0, 1.0, 2.0, 3.0]) - 1.0).abs() < 1e-9);
        assert!(linear_slope(&[5.0]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_growth_rate() {
        assert!((growth_rate(&[2.0, 2.0, 3.0, 3.0], 2) - 50.0).abs() < 1e-9);
        assert!((growth_rate(&[4.0, 2.0], 1) + 50.0).abs() < 1e-9);
        assert!((growth_rate(&[0.0, 0.0, 1.0, 1.0], 2) - 100.0).abs() < 1e-9);
        assert!(growth_rate(&[0.0, 0.0], 1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_predictions_floor_at_zero() {
        let rising = predict_counts(&[1.0, 2.0, 3.0], 2);
        assert!((rising[0] - 3.0).abs() < 1e-9);
        assert!((rising[1] - 4.0).abs() < 1e-9);
        let falling = predict_counts(&[9.0, 5.0, 1.0, 0.0, 0.0, 0.0, 0.0], 30);
        assert!(falling.iter().all(|p| *p >= 0.0));
        assert!(falling.last().unwrap().abs() < f64::EPSILON);
        assert_eq!(predict_counts(&[], 3), vec![0.0; 3]);
    }

    #[test]
    fn test_horizon_and_window_are_capped() {
        assert_eq!(predict_counts(&[1.0], usize::MAX).len(), MAX_PREDICT_DAYS as usize);
        assert_eq!(bucket_by_day(&[], NOW, u32::MAX).len(), MAX_TREND_WINDOW_DAYS as usize);
        let analysis = analyze(&[], NOW, u32::MAX, 3, usize::MAX);
        assert_eq!(analysis.window_days, MAX_TREND_WINDOW_DAYS);
        assert_eq!(analysis.predictions.len(), MAX_PREDICT_DAYS as usize);
    }

    #[test]
    fn test_buckets_zero_filled_oldest_first() {
        let records = vec![
            rec(Locale::En, NOW, 1.0),
            rec(Locale::En, NOW - 60_000, 0.5),
            rec(Locale::Zh, NOW - 2 * DAY_MS, 0.7),
            rec(Locale::Zh, NOW - 30 * DAY_MS, 0.7),
        ];
        let buckets = bucket_by_day(&records, NOW, 7);
        assert_eq!(buckets.len(), 7);
        assert_eq!(buckets.last().unwrap().date, NaiveDate::from_ymd_opt(2023, 11, 14).unwrap());
        assert_eq!(buckets.iter().map(|b| b.count).collect::<Vec<_>>(), vec![0, 0, 0, 0, 1, 0, 2]);
        assert!((buckets[6].mean_confidence - 0.75).abs() < 1e-9);
        assert!(buckets[0].mean_confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn test_analyze_reports_per_locale() {
        let mut records = Vec::new();
        for (day, n) in [(2, 1), (1, 3), (0, 6)] {
            for _ in 0..n {
                records.push(rec(Locale::Zh, NOW - day * DAY_MS, 0.7));
            }
        }
        records.push(rec(Locale::En, NOW - DAY_MS, 0.5));
        let analysis = analyze(&records, NOW, 7, 1, 3);
        assert_eq!(analysis.buckets.len(), 7);
        assert_eq!(analysis.predictions.len(), 3);
        assert_eq!(analysis.predictions[0].date, NaiveDate::from_ymd_opt(2023, 11, 15).unwrap());
        let zh = analysis.by_locale.iter().find(|t| t.locale == Locale::Zh).unwrap();
        assert_eq!(zh.total, 10);
        assert_eq!(zh.direction, TrendDirection::Increasing);
        let en = analysis.by_locale.iter().find(|t| t.locale == Locale::En).unwrap();
        assert_eq!(en.total, 1);
    }
}
