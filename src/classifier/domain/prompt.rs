//! Classifier prompt rendering.

use crate::campaign::domain::Transcript;
use chrono::{DateTime, Utc};
use minijinja::Environment;
use serde::Serialize;
use thiserror::Error;

use super::analysis::NEXT_FOLLOW_UP_FORMAT;

/// Prompt used when no template is configured.
pub const DEFAULT_PROMPT_TEMPLATE: &str = r#"You review transcripts of outbound sales calls.
Today is {{ now }}. The callee is {{ display_name }}; the call ended with status "{{ call_status }}".

Transcript:
{{ transcript }}

Reply with a single JSON object and nothing else:
{"remark": "<one or two sentences for the sales team>",
 "interest": <0 unknown, 1 interested, 2 not interested>,
 "next_follow_up": "<YYYY-MM-DD HH:MM:SS>"}"#;

/// Error returned when a prompt template fails to render.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("prompt template rendering failed: {0}")]
pub struct PromptError(pub String);

/// Values available to the prompt template.
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext {
    /// Name the bot greeted the callee with.
    pub display_name: String,
    /// Final provider call state.
    pub call_status: String,
    /// Transcript rendered as pretty JSON.
    pub transcript: String,
    /// Current time in [`NEXT_FOLLOW_UP_FORMAT`].
    pub now: String,
}

impl PromptContext {
    /// Builds a context for one call.
    #[must_use]
    pub fn new(
        display_name: &str,
        call_status: &str,
        transcript: &Transcript,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            display_name: display_name.to_owned(),
            call_status: call_status.to_owned(),
            transcript: serde_json::to_string_pretty(transcript.as_value())
                .unwrap_or_else(|_| transcript.as_value().to_string()),
            now: now.format(NEXT_FOLLOW_UP_FORMAT).to_string(),
        }
    }
}

/// A `minijinja` template producing the classifier prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    source: String,
}

impl PromptTemplate {
    /// Wraps a template source.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Renders the prompt for one call.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError`] when the template is malformed or refers to
    /// an unknown filter.
    pub fn render(&self, context: &PromptContext) -> Result<String, PromptError> {
        Environment::new()
            .render_str(&self.source, context)
            .map_err(|error| PromptError(error.to_string()))
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT_TEMPLATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::json;

    fn context() -> PromptContext {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("valid timestamp");
        PromptContext::new(
            "Ada",
            "succeeded",
            &Transcript::new(json!([{"speaker": "bot", "text": "Hello Ada"}])),
            now,
        )
    }

    #[rstest]
    fn default_template_includes_call_details() {
        let prompt = PromptTemplate::default()
            .render(&context())
            .expect("default template renders");

        assert!(prompt.contains("Ada"));
        assert!(prompt.contains("Hello Ada"));
        assert!(prompt.contains("2026-03-01 09:00:00"));
    }

    #[rstest]
    fn malformed_template_is_an_error() {
        let result = PromptTemplate::new("{{ display_name ").render(&context());

        assert!(result.is_err());
    }
}
