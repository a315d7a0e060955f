//! Envelope-returning operations for HTTP handlers and the CLI.
//!
//! Deferred and intermediate states (calls still running, follow-ups not
//! written yet, no recording) are successes whose message explains what
//! is pending. Failures carry a stable [`ErrorCode`].

mod envelope;
mod error;
mod operations;

pub use envelope::{Envelope, OK_CODE, ResponseStatus};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use operations::{
    CampaignOperations, CreatedCampaign, Diagnosis, ExecutionPage, OrganizationStatsCache,
};
