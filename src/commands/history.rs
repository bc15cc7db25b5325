//! History commands.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveTime};

use super::{format_confidence, format_timestamp, parse_metadata};
use crate::cli::HistoryCommands;
use crate::clock::DAY_MS;
use crate::context::Context;
use crate::detection::DetectionSource;
use crate::error::{Error, Result};
use crate::history::{DetectionRecord, HistoryQuery};
use crate::locale::Locale;
use crate::output::{Displayable, OutputFormat, TableFormatter};

/// Widest metadata cell in table output.
const METADATA_COLUMN_WIDTH: usize = 40;

impl Displayable for DetectionRecord {
    fn table_row(&self) -> Vec<String> {
        vec![
            format_timestamp(self.timestamp),
            self.locale.to_string(),
            self.source.to_string(),
            format_confidence(self.confidence),
            self.metadata
                .iter()
                .map(|(k, v)| match v {
                    serde_json::Value::String(s) => format!("{k}={s}"),
                    other => format!("{k}={other}"),
                })
                .collect::<Vec<_>>()
                .join(","),
        ]
    }

    fn table_headers() -> Vec<&'static str> {
        vec!["TIME", "LOCALE", "SOURCE", "CONFIDENCE", "METADATA"]
    }
}

/// Dispatch `history` subcommands.
pub fn dispatch(ctx: &Context, sub: &HistoryCommands) -> Result<()> {
    match sub {
        HistoryCommands::List {
            locale,
            source,
            min_confidence,
            max_confidence,
            since,
            until,
            limit,
        } => {
            let query = HistoryQuery::builder()
                .maybe_locale(locale.as_deref().map(str::parse::<Locale>).transpose()?)
                .maybe_source(source.as_deref().map(parse_source).transpose()?)
                .maybe_min_confidence(*min_confidence)
                .maybe_max_confidence(*max_confidence)
                .maybe_since(since.as_deref().map(|s| parse_time(s, false)).transpose()?)
                .maybe_until(until.as_deref().map(|s| parse_time(s, true)).transpose()?)
                .maybe_limit(*limit)
                .build();
            list(ctx, &query)
        },
        HistoryCommands::Add { locale, source, confidence, metadata } => {
            add(ctx, locale, source, *confidence, metadata)
        },
        HistoryCommands::Search { text } => search(ctx, text),
        HistoryCommands::Stats => stats(ctx),
        HistoryCommands::Trends { window, period, predict } => trends(ctx, *window, *period, *predict),
        HistoryCommands::Export { file } => export(ctx, file.as_deref()),
        HistoryCommands::Import { file } => import(ctx, file),
        HistoryCommands::Cleanup { max_age_days } => cleanup(ctx, *max_age_days),
        HistoryCommands::Dedupe { window_secs } => dedupe(ctx, *window_secs),
        HistoryCommands::Clear => clear(ctx),
        HistoryCommands::Verify => verify(ctx),
    }
}

fn parse_source(raw: &str) -> Result<DetectionSource> {
    DetectionSource::from_name(raw)
        .ok_or_else(|| Error::invalid_arg(format!("unknown source '{raw}' (user, browser, default)")))
}

/// Parse a time bound: epoch milliseconds, RFC 3339, or a `YYYY-MM-DD` UTC
/// day (its first millisecond, or its last when `end_of_day`).
pub(crate) fn parse_time(raw: &str, end_of_day: bool) -> Result<i64> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return Ok(ms);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp_millis());
    }
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let start = day.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
        return Ok(if end_of_day { start + DAY_MS - 1 } else { start });
    }
    Err(Error::invalid_arg(format!(
        "cannot parse time '{raw}' (use epoch ms, RFC 3339 or YYYY-MM-DD)"
    )))
}

fn print_records(ctx: &Context, records: &[DetectionRecord]) -> Result<()> {
    if ctx.output.format() == OutputFormat::Table {
        if records.is_empty() {
            ctx.output.info("No records");
            return Ok(());
        }
        let mut table = TableFormatter::new();
        table.headers(DetectionRecord::table_headers());
        for record in records {
            table.row(record.table_row());
        }
        table.max_width(4, METADATA_COLUMN_WIDTH);
        table.print();
        Ok(())
    } else {
        ctx.output.table(records)
    }
}

fn list(ctx: &Context, query: &HistoryQuery) -> Result<()> {
    let records = ctx.manager.history().query(query)?;
    print_records(ctx, &records)
}

fn add(
    ctx: &Context,
    locale: &str,
    source: &str,
    confidence: Option<f64>,
    metadata: &[String],
) -> Result<()> {
    let locale: Locale = locale.parse()?;
    let source = parse_source(source)?;
    let confidence = confidence.unwrap_or(match source {
        DetectionSource::User => crate::detection::USER_CONFIDENCE,
        DetectionSource::Browser => ctx.config.detection.browser_confidence,
        DetectionSource::Default => ctx.config.detection.default_confidence,
    });
    let metadata = parse_metadata(metadata)?;
    let added = ctx
        .manager
        .history()
        .add_record(locale, source, confidence, (!metadata.is_empty()).then_some(metadata))?;

    ctx.output.success(&format!(
        "Recorded {} ({}, confidence {}); history holds {} record(s)",
        added.record.locale,
        added.record.source,
        format_confidence(added.record.confidence),
        added.history_len
    ));
    if ctx.output.format() != OutputFormat::Table {
        ctx.output.value(&added.record)?;
    }
    Ok(())
}

fn search(ctx: &Context, text: &str) -> Result<()> {
    let records = ctx.manager.history().search(text);
    print_records(ctx, &records)
}

fn stats(ctx: &Context) -> Result<()> {
    let stats = ctx.manager.history().statistics();
    if ctx.output.format() != OutputFormat::Table {
        return ctx.output.value(&stats);
    }

    let dist = &stats.confidence_distribution;
    let mut summary = TableFormatter::new();
    summary
        .row(["Records:".to_string(), stats.total_records.to_string()])
        .row(["Average confidence:".to_string(), format_confidence(stats.average_confidence)])
        .row([
            "Confidence:".to_string(),
            format!("high {} / medium {} / low {}", dist.high, dist.medium, dist.low),
        ])
        .row(["Per day:".to_string(), format!("{:.2}", stats.detection_frequency)])
        .row([
            "Top locale:".to_string(),
            stats.most_frequent_locale.map_or_else(|| "-".to_string(), |l| l.to_string()),
        ])
        .row([
            "Top source:".to_string(),
            stats.most_frequent_source.map_or_else(|| "-".to_string(), |s| s.to_string()),
        ]);
    if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
        summary.row([
            "Span:".to_string(),
            format!("{} .. {}", format_timestamp(oldest), format_timestamp(newest)),
        ]);
    }
    summary.print();

    if !stats.by_locale.is_empty() {
        println!();
        let mut table = TableFormatter::new();
        table.headers(["LOCALE", "COUNT", "SHARE"]);
        for entry in &stats.by_locale {
            table.row([
                entry.locale.to_string(),
                entry.count.to_string(),
                format!("{:.1}%", entry.percentage),
            ]);
        }
        table.print();

        println!();
        let mut table = TableFormatter::new();
        table.headers(["SOURCE", "COUNT", "SHARE"]);
        for entry in &stats.by_source {
            table.row([
                entry.source.to_string(),
                entry.count.to_string(),
                format!("{:.1}%", entry.percentage),
            ]);
        }
        table.print();
    }
    Ok(())
}

fn trends(ctx: &Context, window: Option<u32>, period: usize, predict: u32) -> Result<()> {
    let window = window.unwrap_or(ctx.config.history.trend_window_days);
    if window == 0 {
        return Err(Error::invalid_arg("trend window must be at least one day"));
    }
    if period == 0 {
        return Err(Error::invalid_arg("growth period must be at least one day"));
    }
    let analysis = ctx.manager.history().trends(window, period, predict as usize);
    if ctx.output.format() != OutputFormat::Table {
        return ctx.output.value(&analysis);
    }

    let mut table = TableFormatter::new();
    table.headers(["DAY", "COUNT", "MEAN CONFIDENCE"]);
    for bucket in &analysis.buckets {
        table.row([
            bucket.date.to_string(),
            bucket.count.to_string(),
            format_confidence(bucket.mean_confidence),
        ]);
    }
    for prediction in &analysis.predictions {
        table.row([
            format!("{} (predicted)", prediction.date),
            format!("{:.1}", prediction.predicted_count),
            "-".to_string(),
        ]);
    }
    table.print();

    println!();
    ctx.output.line(&format!("Direction: {} (slope {:.2})", analysis.direction, analysis.slope));
    ctx.output.line(&format!(
        "Growth: {:+.1}% over {}-day periods",
        analysis.growth_rate, analysis.growth_period_days
    ));
    for trend in &analysis.by_locale {
        ctx.output.line(&format!(
            "  {}: {} record(s), {} (slope {:.2})",
            trend.locale, trend.total, trend.direction, trend.slope
        ));
    }
    Ok(())
}

pub(super) fn write_bundle_json(ctx: &Context, json: &str, file: Option<&Path>) -> Result<()> {
    match file {
        Some(path) => {
            std::fs::write(path, json)?;
            ctx.output.success(&format!("Wrote {}", path.display()));
        },
        None => ctx.output.line(json),
    }
    Ok(())
}

fn export(ctx: &Context, file: Option<&Path>) -> Result<()> {
    let bundle = ctx.manager.history().export_history()?;
    let json = serde_json::to_string_pretty(&bundle)?;
    write_bundle_json(ctx, &json, file)
}

fn import(ctx: &Context, file: &Path) -> Result<()> {
    let raw = ctx.read_input(file)?;
    let report = ctx.manager.history().import_history_json(&raw)?;
    ctx.output.success(&format!(
        "Imported {} record(s), replacing {}",
        report.record_count, report.replaced
    ));
    if report.truncated > 0 {
        ctx.output.warn(&format!("Dropped {} record(s) over the cap", report.truncated));
    }
    if ctx.output.format() != OutputFormat::Table {
        ctx.output.value(&report)?;
    }
    Ok(())
}

fn cleanup(ctx: &Context, max_age_days: Option<u32>) -> Result<()> {
    let max_age_ms = match max_age_days {
        Some(days) => i64::from(days) * DAY_MS,
        None => ctx.config.history.retention_ms(),
    };
    let report = ctx.manager.history().cleanup_expired(max_age_ms)?;
    ctx.output.success(&format!(
        "Removed {} expired record(s); {} remain",
        report.removed, report.remaining
    ));
    if ctx.output.format() != OutputFormat::Table {
        ctx.output.value(&report)?;
    }
    Ok(())
}

fn dedupe(ctx: &Context, window_secs: u32) -> Result<()> {
    let report = ctx.manager.history().deduplicate(i64::from(window_secs) * 1000)?;
    ctx.output.success(&format!(
        "Removed {} duplicate record(s); {} remain",
        report.removed, report.remaining
    ));
    if ctx.output.format() != OutputFormat::Table {
        ctx.output.value(&report)?;
    }
    Ok(())
}

fn clear(ctx: &Context) -> Result<()> {
    if !ctx.confirm("Remove every history record?")? {
        ctx.output.info("Cancelled.");
        return Ok(());
    }
    let report = ctx.manager.history().clear_all()?;
    ctx.output.success(&format!("Removed {} record(s)", report.removed));
    Ok(())
}

fn verify(ctx: &Context) -> Result<()> {
    let health = ctx.manager.history().verify()?;
    if !health.within_cap {
        ctx.output.warn(&format!(
            "Stored history holds {} records, above the cap of {}",
            health.record_count, health.max_records
        ));
    }
    let pairs = [
        ("Stored", if health.stored { "yes" } else { "no" }.to_string()),
        ("Records", format!("{} / {}", health.record_count, health.max_records)),
        ("Total appended", health.total_count.to_string()),
        ("Updated", health.last_updated.map_or_else(|| "-".to_string(), format_timestamp)),
        ("Checksum", health.checksum.clone().unwrap_or_else(|| "-".to_string())),
        ("Cache", if health.cache.fresh { "fresh" } else { "cold" }.to_string()),
    ];
    ctx.output.summary(&pairs, &health)
}
