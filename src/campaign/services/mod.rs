//! Application services for campaign lifecycle, completion and statistics.

mod lifecycle;
mod state_machine;
mod stats;

pub use lifecycle::{
    CampaignLifecycleService, CreateCampaignRequest, LeadCandidate, LifecycleError,
    LifecycleResult, StartCallingReport, SuspendAction,
};
pub use state_machine::{CampaignStateMachine, StageEvaluation, StateMachineError};
pub use stats::{CampaignStatsService, OrganizationStats};
