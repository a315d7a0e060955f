//! Port contracts for campaign persistence.

pub mod repository;

pub use repository::{
    AssignmentRepository, BindOutcome, CampaignRepository, CampaignStore, FollowUpRepository,
    PollRunRepository, StoreError, StoreResult,
};
