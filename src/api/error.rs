//! Mapping of service errors onto stable response codes.

use crate::campaign::{
    domain::CampaignDomainError,
    ports::StoreError,
    services::{LifecycleError, StateMachineError},
};
use crate::provider::ports::ProviderError;
use crate::reconcile::ReconcileError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Stable error codes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No lead or unbound assignment could be assigned.
    NoAssignableLeads,
    /// The provider reported that none of the jobs can be assigned.
    NoAssignableJobs,
    /// The provider recognized none of the requested job ids.
    NoValidJobIds,
    /// The operation is not allowed in the campaign's current stage.
    InvalidStage,
    /// The campaign or assignment does not exist.
    NotFound,
    /// The request carried invalid values.
    InvalidInput,
    /// The provider refused the request with a business code.
    ProviderRejected,
    /// The provider could not be reached or answered garbage.
    Transport,
    /// The store failed.
    Store,
}

impl ErrorCode {
    /// Returns the wire form of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoAssignableLeads => "NO_ASSIGNABLE_LEADS",
            Self::NoAssignableJobs => "NO_ASSIGNABLE_JOBS",
            Self::NoValidJobIds => "NO_VALID_JOB_IDS",
            Self::InvalidStage => "INVALID_STAGE",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidInput => "INVALID_INPUT",
            Self::ProviderRejected => "PROVIDER_REJECTED",
            Self::Transport => "TRANSPORT",
            Self::Store => "STORE",
        }
    }

    /// Returns `true` for failures a caller may retry unchanged.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transport | Self::Store)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of an API operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ApiError {
    /// Stable code.
    pub code: ErrorCode,
    /// Human-readable explanation.
    pub message: String,
}

impl ApiError {
    /// Creates an error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let code = match err {
            StoreError::CampaignNotFound(_)
            | StoreError::AssignmentNotFound(_)
            | StoreError::FollowUpNotFound(_) => ErrorCode::NotFound,
            StoreError::DuplicateCampaign(_) | StoreError::DuplicateAssignment(_) => {
                ErrorCode::InvalidInput
            }
            StoreError::Persistence(_) => ErrorCode::Store,
        };
        Self::new(code, err.to_string())
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        let code = match err {
            ProviderError::NoAssignableJobs => ErrorCode::NoAssignableJobs,
            ProviderError::NoValidJobIds => ErrorCode::NoValidJobIds,
            ProviderError::Rejected { .. } => ErrorCode::ProviderRejected,
            ProviderError::Timeout(_)
            | ProviderError::MalformedResponse(_)
            | ProviderError::Transport(_) => ErrorCode::Transport,
        };
        Self::new(code, err.to_string())
    }
}

impl From<CampaignDomainError> for ApiError {
    fn from(err: CampaignDomainError) -> Self {
        let code = match err {
            CampaignDomainError::InvalidStageTransition { .. } => ErrorCode::InvalidStage,
            CampaignDomainError::EmptyCampaignName
            | CampaignDomainError::InvalidPhoneNumber(_)
            | CampaignDomainError::EmptyDisplayName => ErrorCode::InvalidInput,
        };
        Self::new(code, err.to_string())
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotFound(_) | LifecycleError::AssignmentNotFound(_) => {
                Self::new(ErrorCode::NotFound, err.to_string())
            }
            LifecycleError::NoAssignableLeads => {
                Self::new(ErrorCode::NoAssignableLeads, err.to_string())
            }
            LifecycleError::InvalidStage { .. } | LifecycleError::MissingProviderGroup(_) => {
                Self::new(ErrorCode::InvalidStage, err.to_string())
            }
            LifecycleError::Domain(inner) => inner.into(),
            LifecycleError::Provider(inner) => inner.into(),
            LifecycleError::Store(inner) => inner.into(),
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::CampaignNotFound(_) | ReconcileError::AssignmentNotFound(_) => {
                Self::new(ErrorCode::NotFound, err.to_string())
            }
            ReconcileError::Store(inner) => inner.into(),
        }
    }
}

impl From<StateMachineError> for ApiError {
    fn from(err: StateMachineError) -> Self {
        match err {
            StateMachineError::NotFound(_) => Self::new(ErrorCode::NotFound, err.to_string()),
            StateMachineError::Store(inner) => inner.into(),
        }
    }
}
