//! Locale resolution commands.

use serde::Serialize;

use super::{format_confidence, parse_metadata};
use crate::context::Context;
use crate::detection::DetectionResult;
use crate::error::Result;

fn result_pairs(result: &DetectionResult) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        ("Locale", result.locale.to_string()),
        ("Name", result.locale.native_name().to_string()),
        ("Source", result.source.to_string()),
        ("Confidence", format_confidence(result.confidence)),
        ("Override", if result.details.override_present { "yes" } else { "no" }.to_string()),
        ("Examined", result.details.candidates_examined.to_string()),
    ];
    if let Some(matched) = &result.details.matched_language {
        pairs.push(("Matched", matched.clone()));
    }
    if !result.details.rejected.is_empty() {
        pairs.push(("Rejected", result.details.rejected.join(", ")));
    }
    pairs
}

/// Resolve the locale without recording it.
pub fn resolve(ctx: &Context) -> Result<()> {
    let result = ctx.manager.resolve(ctx.languages());
    ctx.output.summary(&result_pairs(&result), &result)
}

#[derive(Serialize)]
struct Detected<'a> {
    #[serde(flatten)]
    result: &'a DetectionResult,
    history_len: usize,
    evicted: usize,
}

/// Resolve the locale and append the decision to history.
pub fn detect(ctx: &Context, metadata: &[String]) -> Result<()> {
    let metadata = parse_metadata(metadata)?;
    let metadata = (!metadata.is_empty()).then_some(metadata);
    let (result, added) = ctx.manager.detect_and_record(ctx.languages(), metadata)?;

    let mut pairs = result_pairs(&result);
    pairs.push(("History", format!("{} record(s)", added.history_len)));
    if added.evicted > 0 {
        ctx.output.info(&format!("Evicted {} oldest record(s) to stay within the cap", added.evicted));
    }
    let detected = Detected { result: &result, history_len: added.history_len, evicted: added.evicted };
    ctx.output.summary(&pairs, &detected)
}
