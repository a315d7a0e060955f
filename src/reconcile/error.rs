//! Errors that abort a reconciliation pass.
//!
//! Provider and classifier failures never appear here: they are counted in
//! pass reports and left for the next run. Only missing records and store
//! failures stop a pass.

use crate::campaign::{
    domain::{AssignmentId, CampaignId},
    ports::StoreError,
    services::StateMachineError,
};
use thiserror::Error;

/// Errors returned by reconciliation services.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The campaign does not exist.
    #[error("campaign not found: {0}")]
    CampaignNotFound(CampaignId),
    /// The assignment does not exist.
    #[error("assignment not found: {0}")]
    AssignmentNotFound(AssignmentId),
    /// Store access failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<StateMachineError> for ReconcileError {
    fn from(err: StateMachineError) -> Self {
        match err {
            StateMachineError::NotFound(campaign_id) => Self::CampaignNotFound(campaign_id),
            StateMachineError::Store(store) => Self::Store(store),
        }
    }
}

/// Result type for reconciliation services.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
