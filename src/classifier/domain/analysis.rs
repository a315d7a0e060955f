//! Parsing of classifier output into a follow-up analysis.
//!
//! Models wrap JSON in Markdown fences, prepend prose, report interest as
//! booleans, integers or words, and invent timestamp formats. Everything
//! here degrades to a safe default rather than failing, except output
//! with no usable JSON object or no remark.

use crate::campaign::domain::InterestVerdict;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

/// Timestamp format requested from the classifier for `next_follow_up`.
pub const NEXT_FOLLOW_UP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parsed classifier verdict for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallAnalysis {
    /// Free-text summary for the follow-up note.
    pub remark: String,
    /// Normalized interest verdict.
    pub interest: InterestVerdict,
    /// Suggested next contact time.
    pub next_follow_up_at: DateTime<Utc>,
}

/// Errors returned when classifier output cannot be used at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    /// No JSON object could be extracted from the output.
    #[error("classifier output is not a JSON object: {0}")]
    NotJson(String),
    /// The JSON object carries no non-empty `remark`.
    #[error("classifier output has no remark")]
    MissingRemark,
}

/// Removes a surrounding Markdown code fence and its language tag.
///
/// # Examples
///
/// ```
/// use outcall::classifier::domain::strip_code_fence;
///
/// assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
/// assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
/// ```
#[must_use]
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.trim_start_matches(|ch: char| ch.is_ascii_alphanumeric());
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Parses classifier output into an analysis.
///
/// `now` is used when `next_follow_up` is missing or unparsable.
///
/// # Errors
///
/// Returns [`AnalysisError`] when no JSON object can be found or the
/// remark is missing.
pub fn parse_analysis(text: &str, now: DateTime<Utc>) -> Result<CallAnalysis, AnalysisError> {
    let object = extract_object(strip_code_fence(text))?;

    let remark = object
        .get("remark")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|remark| !remark.is_empty())
        .ok_or(AnalysisError::MissingRemark)?
        .to_owned();

    let interest = object
        .get("interest")
        .map_or(InterestVerdict::Unknown, normalize_interest);

    let next_follow_up_at = object
        .get("next_follow_up")
        .and_then(Value::as_str)
        .and_then(parse_follow_up_time)
        .unwrap_or_else(|| {
            warn!("classifier returned no usable next_follow_up; using current time");
            now
        });

    Ok(CallAnalysis {
        remark,
        interest,
        next_follow_up_at,
    })
}

fn extract_object(text: &str) -> Result<Map<String, Value>, AnalysisError> {
    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(text) {
        return Ok(object);
    }
    let embedded = text
        .find('{')
        .zip(text.rfind('}'))
        .and_then(|(start, end)| text.get(start..=end));
    match embedded.map(serde_json::from_str::<Value>) {
        Some(Ok(Value::Object(object))) => Ok(object),
        _ => Err(AnalysisError::NotJson(text.chars().take(80).collect())),
    }
}

fn parse_follow_up_time(raw: &str) -> Option<DateTime<Utc>> {
    let value = raw.trim();
    NaiveDateTime::parse_from_str(value, NEXT_FOLLOW_UP_FORMAT)
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|parsed| parsed.with_timezone(&Utc))
        })
}

/// Maps the classifier's interest field onto a verdict.
///
/// Booleans map to interested / not interested, integer codes `0..=2`
/// pass through, and common words are recognized case-insensitively.
/// Anything else is [`InterestVerdict::Unknown`].
#[must_use]
pub fn normalize_interest(value: &Value) -> InterestVerdict {
    match value {
        Value::Bool(true) => InterestVerdict::Interested,
        Value::Bool(false) => InterestVerdict::NotInterested,
        Value::Number(number) => number
            .as_i64()
            .and_then(InterestVerdict::from_code)
            .unwrap_or(InterestVerdict::Unknown),
        Value::String(text) => interest_from_word(text),
        Value::Null | Value::Array(_) | Value::Object(_) => InterestVerdict::Unknown,
    }
}

fn interest_from_word(text: &str) -> InterestVerdict {
    let word = text.trim().to_lowercase().replace(['_', '-'], " ");
    if let Ok(code) = word.parse::<i64>() {
        return InterestVerdict::from_code(code).unwrap_or(InterestVerdict::Unknown);
    }
    match word.as_str() {
        "yes" | "true" | "interested" | "high" | "medium" | "intent" | "positive" => {
            InterestVerdict::Interested
        }
        "no" | "false" | "not interested" | "uninterested" | "low" | "none" | "refused"
        | "declined" | "negative" => InterestVerdict::NotInterested,
        _ => InterestVerdict::Unknown,
    }
}
