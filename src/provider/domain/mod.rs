//! Domain model for the external call provider boundary.

mod error;
mod ids;
mod job;

pub use error::{ParseProviderJobStateError, ProviderDomainError};
pub use ids::{ProviderGroupId, ProviderJobId, ProviderTaskId, ScriptId};
pub use job::{
    CallAttempt, CallPhase, CallStrategy, JobGroupSpec, JobPage, JobRequest, MAX_JOB_BATCH,
    ProviderJob, ProviderJobState, WorkingWindow,
};
