//! Domain model for campaigns, call assignments and follow-up notes.
//!
//! The campaign domain keeps the completion rules and the write guards that
//! make concurrent reconciliation safe, while leaving persistence and
//! provider access to ports.

mod assignment;
mod campaign;
mod error;
mod followup;
mod ids;
mod poll_run;
mod reference_tag;
mod stage;

pub use assignment::{
    CallAssignment, CallOutcome, InterestVerdict, LeadContact, OutcomeUpdate,
    PersistedAssignmentData, PhoneNumber, Transcript,
};
pub use campaign::{Campaign, CampaignDraft, CampaignStage, PersistedCampaignData};
pub use error::{CampaignDomainError, ParseCampaignStageError, ParseInterestVerdictError};
pub use followup::{
    ANALYSIS_FAILED_REMARK, FollowUpNote, NOT_CONNECTED_REMARK, PersistedFollowUpData,
};
pub use ids::{AssignmentId, CampaignId, FollowUpId, LeadId, OrganizationId};
pub use poll_run::PollRun;
pub use reference_tag::ReferenceTag;
pub use stage::{StageCounts, StageDecision, evaluate_stage};
