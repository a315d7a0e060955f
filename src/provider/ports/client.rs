//! Port contract for the external voice-bot call provider.

use crate::provider::domain::{
    JobGroupSpec, JobPage, JobRequest, ProviderGroupId, ProviderJob, ProviderJobId,
    ProviderTaskId,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for call provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Outbound call provider contract.
///
/// Implementations normalize every payload into the canonical domain types
/// before returning and enforce a bounded timeout per request.
#[async_trait]
pub trait CallProvider: Send + Sync {
    /// Creates a job group and returns its identifier.
    async fn create_job_group(&self, spec: &JobGroupSpec) -> ProviderResult<ProviderGroupId>;

    /// Places jobs into a group, returning one job id per accepted request
    /// in request order.
    async fn assign_jobs(
        &self,
        group_id: &ProviderGroupId,
        requests: &[JobRequest],
    ) -> ProviderResult<Vec<ProviderJobId>>;

    /// Lists one page of a group's jobs. Pages are 1-based.
    async fn list_jobs_by_group(
        &self,
        group_id: &ProviderGroupId,
        page: u32,
        page_size: u32,
    ) -> ProviderResult<JobPage>;

    /// Fetches job details for at most
    /// [`MAX_JOB_BATCH`](crate::provider::domain::MAX_JOB_BATCH) job ids.
    async fn list_jobs_by_ids(&self, job_ids: &[ProviderJobId])
    -> ProviderResult<Vec<ProviderJob>>;

    /// Pauses dialling for a group.
    async fn suspend(&self, group_id: &ProviderGroupId) -> ProviderResult<()>;

    /// Resumes dialling for a group.
    async fn resume(&self, group_id: &ProviderGroupId) -> ProviderResult<()>;

    /// Resolves the recording of a dial attempt, if one exists.
    async fn fetch_recording_url(&self, task_id: &ProviderTaskId)
    -> ProviderResult<Option<String>>;
}

/// Errors returned by call provider adapters.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The provider refused the batch because none of its jobs can be
    /// assigned.
    #[error("provider reports no assignable jobs")]
    NoAssignableJobs,

    /// The provider recognized none of the requested job ids.
    #[error("provider reports no valid job ids")]
    NoValidJobIds,

    /// The provider rejected the request with a business error code.
    #[error("provider rejected request ({code}): {message}")]
    Rejected {
        /// Provider error code.
        code: String,
        /// Provider error message.
        message: String,
    },

    /// The request did not complete within its timeout.
    #[error("provider request timed out after {0:?}")]
    Timeout(Duration),

    /// The provider response did not match the expected shape.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// Network-level failure (connection reset, refused, TLS).
    #[error("provider transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
}

impl ProviderError {
    /// Wraps a transport error.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }

    /// Returns `true` when retrying the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::MalformedResponse(_) | Self::Transport(_)
        )
    }

    /// Returns `true` for business failures that must never be retried.
    #[must_use]
    pub const fn is_business(&self) -> bool {
        !self.is_retryable()
    }
}
