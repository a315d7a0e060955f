//! Chat-completions classifier for OpenAI-compatible endpoints.

use crate::classifier::ports::{Classifier, ClassifierError, ClassifierResult};
use crate::config::ClassifierConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const CHAT_PATH: &str = "/chat/completions";
const ERROR_EXCERPT_CHARS: usize = 200;

/// Classifier backed by any endpoint speaking the OpenAI chat-completions
/// protocol.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClassifier {
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiCompatibleClassifier {
    /// Creates a classifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError::Transport`] when the HTTP client cannot
    /// be built.
    pub fn from_config(config: &ClassifierConfig) -> ClassifierResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClassifierError::transport)?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
            model: config.model.clone(),
            timeout,
            client,
        })
    }

    fn map_reqwest_error(&self, err: reqwest::Error) -> ClassifierError {
        if err.is_timeout() {
            ClassifierError::Timeout(self.timeout)
        } else if err.is_decode() {
            ClassifierError::MalformedResponse(err.to_string())
        } else {
            ClassifierError::transport(err)
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: u8,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    fn into_text(self) -> ClassifierResult<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ClassifierError::MalformedResponse("response has no content".to_owned()))
    }
}

#[async_trait]
impl Classifier for OpenAiCompatibleClassifier {
    async fn classify(&self, prompt: &str) -> ClassifierResult<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0,
        };
        let mut request = self
            .client
            .post(format!("{}{CHAT_PATH}", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| self.map_reqwest_error(err))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Rejected {
                status: status.as_u16(),
                message: text.chars().take(ERROR_EXCERPT_CHARS).collect(),
            });
        }

        let parsed = response
            .json::<ChatResponse>()
            .await
            .map_err(|err| self.map_reqwest_error(err))?;
        debug!(model = %self.model, "classifier answered");
        parsed.into_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn takes_first_choice_content() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"{\"remark\":\"ok\"}"}}]}"#,
        )
        .expect("response parses");

        assert_eq!(
            response.into_text().expect("content present"),
            "{\"remark\":\"ok\"}"
        );
    }

    #[rstest]
    #[case(r#"{"choices":[]}"#)]
    #[case(r#"{"choices":[{"message":{"content":null}}]}"#)]
    #[case(r#"{"choices":[{"message":{"content":"   "}}]}"#)]
    #[case(r#"{}"#)]
    fn missing_content_is_malformed(#[case] body: &str) {
        let response: ChatResponse = serde_json::from_str(body).expect("response parses");

        assert!(matches!(
            response.into_text(),
            Err(ClassifierError::MalformedResponse(_))
        ));
    }

    #[rstest]
    fn trims_trailing_slash_from_base_url() {
        let config = ClassifierConfig {
            base_url: "https://llm.example/v1/".to_owned(),
            ..ClassifierConfig::default()
        };

        let classifier = OpenAiCompatibleClassifier::from_config(&config).expect("client builds");

        assert_eq!(classifier.base_url, "https://llm.example/v1");
    }
}
