//! Response envelope shared by every operation.

use serde::Serialize;

use super::ApiError;

/// Code carried by successful responses.
pub const OK_CODE: &str = "OK";

/// Whether an operation succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// The operation succeeded, possibly with nothing to do yet.
    Success,
    /// The operation failed.
    Error,
}

/// `{status, code, message, data}` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope<T> {
    /// Success or error.
    pub status: ResponseStatus,
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable explanation.
    pub message: String,
    /// Payload, present on success.
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Wraps a successful payload.
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: ResponseStatus::Success,
            code: OK_CODE.to_owned(),
            message: message.into(),
            data: Some(data),
        }
    }

    /// Builds an error response.
    #[must_use]
    pub fn failure(err: &ApiError) -> Self {
        Self {
            status: ResponseStatus::Error,
            code: err.code.as_str().to_owned(),
            message: err.message.clone(),
            data: None,
        }
    }

    /// Returns `true` for successful responses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

impl<T> From<Result<Envelope<T>, ApiError>> for Envelope<T> {
    fn from(result: Result<Envelope<T>, ApiError>) -> Self {
        result.unwrap_or_else(|err| Self::failure(&err))
    }
}
