//! Identifiers issued by, or sent to, the external call provider.
//!
//! Provider identifiers are opaque strings owned by the provider's job
//! store. They are weak references: nothing locally owns the records they
//! point at.

use super::ProviderDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

fn non_empty(kind: &'static str, value: String) -> Result<String, ProviderDomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ProviderDomainError::EmptyIdentifier(kind));
    }
    Ok(trimmed.to_owned())
}

/// Provider job group backing a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderGroupId(String);

impl ProviderGroupId {
    /// Creates a validated group identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderDomainError::EmptyIdentifier`] for blank values.
    pub fn new(value: impl Into<String>) -> Result<Self, ProviderDomainError> {
        non_empty("job group id", value.into()).map(Self)
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provider job (one lead's call job inside a group).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderJobId(String);

impl ProviderJobId {
    /// Creates a validated job identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderDomainError::EmptyIdentifier`] for blank values.
    pub fn new(value: impl Into<String>) -> Result<Self, ProviderDomainError> {
        non_empty("job id", value.into()).map(Self)
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provider task (one dial attempt of a job).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderTaskId(String);

impl ProviderTaskId {
    /// Creates a validated task identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderDomainError::EmptyIdentifier`] for blank values.
    pub fn new(value: impl Into<String>) -> Result<Self, ProviderDomainError> {
        non_empty("task id", value.into()).map(Self)
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provider dialogue script (scenario) a campaign runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptId(String);

impl ScriptId {
    /// Creates a validated script identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderDomainError::EmptyIdentifier`] for blank values.
    pub fn new(value: impl Into<String>) -> Result<Self, ProviderDomainError> {
        non_empty("script id", value.into()).map(Self)
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
