//! Repository ports for campaigns, call assignments, follow-up notes and
//! poll runs.
//!
//! Every mutation that reconciliation passes may race on is expressed as a
//! guarded write returning whether it took effect, so concurrent passes
//! never need an in-process lock.

use crate::campaign::domain::{
    AssignmentId, CallAssignment, Campaign, CampaignId, CampaignStage, FollowUpId, FollowUpNote,
    OrganizationId, OutcomeUpdate, PollRun, StageCounts,
};
use crate::provider::domain::{ProviderGroupId, ProviderJobId};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Campaign persistence contract.
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    /// Stores a new campaign.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateCampaign`] when the id already exists.
    async fn store_campaign(&self, campaign: &Campaign) -> StoreResult<()>;

    /// Finds a campaign by identifier.
    async fn find_campaign(&self, id: CampaignId) -> StoreResult<Option<Campaign>>;

    /// Persists operator-driven changes (group id, stage, timestamps).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CampaignNotFound`] when the campaign does not
    /// exist.
    async fn update_campaign(&self, campaign: &Campaign) -> StoreResult<()>;

    /// Moves the stage from `expected` to `next`.
    ///
    /// Returns `false`, writing nothing, when the stored stage is no longer
    /// `expected`.
    async fn compare_and_set_stage(
        &self,
        id: CampaignId,
        expected: CampaignStage,
        next: CampaignStage,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Records the provider job group of a campaign that has been claimed
    /// for calling.
    ///
    /// Takes effect only while the stage is `calling` and no other group is
    /// recorded; rewriting the same group is accepted. Returns whether the
    /// write took effect.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CampaignNotFound`] when the campaign does not
    /// exist.
    async fn attach_provider_group(
        &self,
        id: CampaignId,
        group_id: &ProviderGroupId,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Returns every campaign currently in `stage`.
    async fn list_by_stage(&self, stage: CampaignStage) -> StoreResult<Vec<Campaign>>;

    /// Returns every campaign of an organization, soft-deleted ones
    /// excluded.
    async fn list_by_organization(
        &self,
        organization_id: OrganizationId,
    ) -> StoreResult<Vec<Campaign>>;
}

/// Call assignment persistence contract.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Stores new assignments in one batch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateAssignment`] when any id already
    /// exists; nothing is stored in that case.
    async fn store_assignments(&self, assignments: &[CallAssignment]) -> StoreResult<()>;

    /// Finds an assignment by identifier.
    async fn find_assignment(&self, id: AssignmentId) -> StoreResult<Option<CallAssignment>>;

    /// Returns every assignment of a campaign ordered by id.
    async fn list_for_campaign(&self, campaign_id: CampaignId)
    -> StoreResult<Vec<CallAssignment>>;

    /// Binds a provider job to an assignment.
    ///
    /// Takes effect only while the assignment has no job and no other
    /// assignment carries `job_id`. Returns whether the write took effect.
    async fn bind_job_id(
        &self,
        id: AssignmentId,
        job_id: &ProviderJobId,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Returns up to `limit` bound assignments lacking a status or a
    /// transcript, with ids strictly greater than `after`, ordered by id.
    async fn pending_outcome_page(
        &self,
        campaign_id: CampaignId,
        after: Option<AssignmentId>,
        limit: usize,
    ) -> StoreResult<Vec<CallAssignment>>;

    /// Writes a page of terminal outcomes in one batch and returns the
    /// number of rows updated.
    async fn apply_outcomes(&self, updates: &[OutcomeUpdate]) -> StoreResult<usize>;

    /// Returns the campaign's aggregate counts from one query.
    async fn stage_counts(&self, campaign_id: CampaignId) -> StoreResult<StageCounts>;

    /// Returns one 1-based page of a campaign's assignments and the total.
    async fn list_page(
        &self,
        campaign_id: CampaignId,
        page: u32,
        page_size: u32,
    ) -> StoreResult<(Vec<CallAssignment>, u64)>;

    /// Returns terminal assignments of a campaign that have no verdict.
    async fn list_needing_follow_up(
        &self,
        campaign_id: CampaignId,
    ) -> StoreResult<Vec<AssignmentId>>;
}

/// Outcome of an exactly-once follow-up write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The note and verdict were written.
    Bound,
    /// Another writer set the verdict first; nothing was written.
    AlreadySet,
}

/// Follow-up note persistence contract.
#[async_trait]
pub trait FollowUpRepository: Send + Sync {
    /// Finds a note by identifier.
    async fn find_note(&self, id: FollowUpId) -> StoreResult<Option<FollowUpNote>>;

    /// Inserts `note` and binds its id and verdict onto its assignment in
    /// one transaction.
    ///
    /// The assignment write re-checks that no verdict and no note are set;
    /// when that check fails the note is not inserted either.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AssignmentNotFound`] when the assignment does
    /// not exist.
    async fn create_and_bind(&self, note: &FollowUpNote) -> StoreResult<BindOutcome>;

    /// Rewrites an existing note's remark and next follow-up time, then
    /// settles its verdict onto the assignment if none is set yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FollowUpNotFound`] when the note does not
    /// exist.
    async fn update_and_settle(&self, note: &FollowUpNote) -> StoreResult<BindOutcome>;
}

/// Poll-run flag persistence contract.
#[async_trait]
pub trait PollRunRepository: Send + Sync {
    /// Takes the campaign's processing flag when it is free or older than
    /// `stale_after`. Returns whether the flag was taken.
    async fn try_acquire(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> StoreResult<bool>;

    /// Clears the processing flag and records the check time.
    async fn release(&self, campaign_id: CampaignId, now: DateTime<Utc>) -> StoreResult<()>;

    /// Returns the campaign's poll-run record, if one exists.
    async fn find_poll_run(&self, campaign_id: CampaignId) -> StoreResult<Option<PollRun>>;
}

/// Errors returned by store implementations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A campaign with the same identifier already exists.
    #[error("duplicate campaign identifier: {0}")]
    DuplicateCampaign(CampaignId),

    /// An assignment with the same identifier already exists.
    #[error("duplicate assignment identifier: {0}")]
    DuplicateAssignment(AssignmentId),

    /// The campaign was not found.
    #[error("campaign not found: {0}")]
    CampaignNotFound(CampaignId),

    /// The assignment was not found.
    #[error("assignment not found: {0}")]
    AssignmentNotFound(AssignmentId),

    /// The follow-up note was not found.
    #[error("follow-up note not found: {0}")]
    FollowUpNotFound(FollowUpId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}

/// Convenience bound for a store implementing every campaign port.
pub trait CampaignStore:
    CampaignRepository + AssignmentRepository + FollowUpRepository + PollRunRepository
{
}

impl<T> CampaignStore for T where
    T: CampaignRepository + AssignmentRepository + FollowUpRepository + PollRunRepository
{
}
