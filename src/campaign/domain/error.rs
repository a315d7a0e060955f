//! Error types for campaign domain validation and parsing.

use super::{CampaignId, CampaignStage};
use thiserror::Error;

/// Errors returned while constructing or mutating campaign domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CampaignDomainError {
    /// The campaign name is empty after trimming.
    #[error("campaign name must not be empty")]
    EmptyCampaignName,

    /// The phone number contains no dialable digits or unexpected symbols.
    #[error("invalid phone number '{0}'")]
    InvalidPhoneNumber(String),

    /// The lead display name is empty after trimming.
    #[error("lead display name must not be empty")]
    EmptyDisplayName,

    /// The requested stage change is not part of the campaign state machine.
    #[error("invalid stage transition for campaign {campaign_id}: {from} -> {to}")]
    InvalidStageTransition {
        /// Campaign identifier.
        campaign_id: CampaignId,
        /// Current stage.
        from: CampaignStage,
        /// Requested stage.
        to: CampaignStage,
    },
}

/// Error returned while parsing a campaign stage from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown campaign stage: {0}")]
pub struct ParseCampaignStageError(pub String);

/// Error returned while parsing an interest verdict from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown interest verdict: {0}")]
pub struct ParseInterestVerdictError(pub String);
