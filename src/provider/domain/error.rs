//! Error types for provider domain values.

use thiserror::Error;

/// Errors returned while constructing provider domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderDomainError {
    /// A provider identifier was blank.
    #[error("provider {0} must not be empty")]
    EmptyIdentifier(&'static str),
}

/// Error returned while parsing a provider job state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown provider job state: {0}")]
pub struct ParseProviderJobStateError(pub String);
