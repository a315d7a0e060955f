//! In-memory campaign store for tests and local runs.
//!
//! All four tables sit behind one lock, so every cross-table operation
//! (note insert plus assignment bind) is atomic.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::campaign::{
    domain::{
        AssignmentId, CallAssignment, Campaign, CampaignId, CampaignStage, FollowUpId,
        FollowUpNote, OrganizationId, OutcomeUpdate, PollRun, StageCounts,
    },
    ports::{
        AssignmentRepository, BindOutcome, CampaignRepository, FollowUpRepository,
        PollRunRepository, StoreError, StoreResult,
    },
};
use crate::provider::domain::{ProviderGroupId, ProviderJobId};

/// Thread-safe in-memory campaign store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCampaignStore {
    state: Arc<RwLock<InMemoryState>>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    campaigns: HashMap<CampaignId, Campaign>,
    assignments: BTreeMap<AssignmentId, CallAssignment>,
    job_index: HashMap<ProviderJobId, AssignmentId>,
    notes: HashMap<FollowUpId, FollowUpNote>,
    poll_runs: HashMap<CampaignId, PollRun>,
    count_failures: usize,
}

impl InMemoryCampaignStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored note, for assertions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the lock is poisoned.
    pub fn notes(&self) -> StoreResult<Vec<FollowUpNote>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.notes.values().cloned().collect())
    }

    /// Makes the next `times` aggregate count queries fail, for exercising
    /// error paths.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the lock is poisoned.
    pub fn fail_next_stage_counts(&self, times: usize) -> StoreResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.count_failures = times;
        Ok(())
    }
}

fn lock_error(err: impl std::fmt::Display) -> StoreError {
    StoreError::persistence(std::io::Error::other(err.to_string()))
}

fn campaign_assignments(
    state: &InMemoryState,
    campaign_id: CampaignId,
) -> impl Iterator<Item = &CallAssignment> {
    state
        .assignments
        .values()
        .filter(move |assignment| assignment.campaign_id() == campaign_id)
}

fn count<'a>(rows: impl Iterator<Item = &'a &'a CallAssignment>) -> u64 {
    u64::try_from(rows.count()).unwrap_or(u64::MAX)
}

#[async_trait]
impl CampaignRepository for InMemoryCampaignStore {
    async fn store_campaign(&self, campaign: &Campaign) -> StoreResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        if state.campaigns.contains_key(&campaign.id()) {
            return Err(StoreError::DuplicateCampaign(campaign.id()));
        }
        state.campaigns.insert(campaign.id(), campaign.clone());
        Ok(())
    }

    async fn find_campaign(&self, id: CampaignId) -> StoreResult<Option<Campaign>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.campaigns.get(&id).cloned())
    }

    async fn update_campaign(&self, campaign: &Campaign) -> StoreResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        let stored = state
            .campaigns
            .get_mut(&campaign.id())
            .ok_or(StoreError::CampaignNotFound(campaign.id()))?;
        *stored = campaign.clone();
        Ok(())
    }

    async fn compare_and_set_stage(
        &self,
        id: CampaignId,
        expected: CampaignStage,
        next: CampaignStage,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.state.write().map_err(lock_error)?;
        let stored = state
            .campaigns
            .get_mut(&id)
            .ok_or(StoreError::CampaignNotFound(id))?;
        if stored.stage() != expected {
            return Ok(false);
        }
        stored.record_stage(next, at);
        Ok(true)
    }

    async fn attach_provider_group(
        &self,
        id: CampaignId,
        group_id: &ProviderGroupId,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.state.write().map_err(lock_error)?;
        let stored = state
            .campaigns
            .get_mut(&id)
            .ok_or(StoreError::CampaignNotFound(id))?;
        let free = stored
            .provider_group_id()
            .is_none_or(|existing| existing == group_id);
        if stored.stage() != CampaignStage::Calling || !free {
            return Ok(false);
        }
        stored.record_group(group_id.clone(), at);
        Ok(true)
    }

    async fn list_by_stage(&self, stage: CampaignStage) -> StoreResult<Vec<Campaign>> {
        let state = self.state.read().map_err(lock_error)?;
        let mut campaigns: Vec<Campaign> = state
            .campaigns
            .values()
            .filter(|campaign| campaign.stage() == stage)
            .cloned()
            .collect();
        campaigns.sort_by_key(Campaign::created_at);
        Ok(campaigns)
    }

    async fn list_by_organization(
        &self,
        organization_id: OrganizationId,
    ) -> StoreResult<Vec<Campaign>> {
        let state = self.state.read().map_err(lock_error)?;
        let mut campaigns: Vec<Campaign> = state
            .campaigns
            .values()
            .filter(|campaign| {
                campaign.organization_id() == organization_id
                    && campaign.stage() != CampaignStage::Deleted
            })
            .cloned()
            .collect();
        campaigns.sort_by_key(Campaign::created_at);
        Ok(campaigns)
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryCampaignStore {
    async fn store_assignments(&self, assignments: &[CallAssignment]) -> StoreResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        if let Some(duplicate) = assignments
            .iter()
            .find(|assignment| state.assignments.contains_key(&assignment.id()))
        {
            return Err(StoreError::DuplicateAssignment(duplicate.id()));
        }
        for assignment in assignments {
            if let Some(job_id) = assignment.provider_job_id() {
                state.job_index.insert(job_id.clone(), assignment.id());
            }
            state.assignments.insert(assignment.id(), assignment.clone());
        }
        Ok(())
    }

    async fn find_assignment(&self, id: AssignmentId) -> StoreResult<Option<CallAssignment>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.assignments.get(&id).cloned())
    }

    async fn list_for_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> StoreResult<Vec<CallAssignment>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(campaign_assignments(&state, campaign_id).cloned().collect())
    }

    async fn bind_job_id(
        &self,
        id: AssignmentId,
        job_id: &ProviderJobId,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.state.write().map_err(lock_error)?;
        if state.job_index.contains_key(job_id) {
            return Ok(false);
        }
        let assignment = state
            .assignments
            .get_mut(&id)
            .ok_or(StoreError::AssignmentNotFound(id))?;
        if !assignment.bind_job_at(job_id.clone(), at) {
            return Ok(false);
        }
        state.job_index.insert(job_id.clone(), id);
        Ok(true)
    }

    async fn pending_outcome_page(
        &self,
        campaign_id: CampaignId,
        after: Option<AssignmentId>,
        limit: usize,
    ) -> StoreResult<Vec<CallAssignment>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(campaign_assignments(&state, campaign_id)
            .filter(|assignment| after.is_none_or(|cursor| assignment.id() > cursor))
            .filter(|assignment| {
                assignment.provider_job_id().is_some()
                    && (assignment.call_status().is_none() || !assignment.has_transcript())
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn apply_outcomes(&self, updates: &[OutcomeUpdate]) -> StoreResult<usize> {
        let mut state = self.state.write().map_err(lock_error)?;
        let mut updated = 0;
        for update in updates {
            if let Some(assignment) = state.assignments.get_mut(&update.assignment_id) {
                assignment.apply_outcome_at(update.outcome.clone(), update.recorded_at);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn stage_counts(&self, campaign_id: CampaignId) -> StoreResult<StageCounts> {
        let mut state = self.state.write().map_err(lock_error)?;
        if state.count_failures > 0 {
            state.count_failures -= 1;
            return Err(StoreError::persistence(std::io::Error::other(
                "stage count query failed",
            )));
        }
        let rows: Vec<&CallAssignment> = campaign_assignments(&state, campaign_id).collect();
        let bound = || rows.iter().filter(|row| row.provider_job_id().is_some());
        Ok(StageCounts {
            total: count(rows.iter()),
            bound: count(bound()),
            terminal: count(bound().filter(|row| row.call_phase().is_terminal())),
            with_verdict: count(bound().filter(|row| row.interest().is_some())),
        })
    }

    async fn list_page(
        &self,
        campaign_id: CampaignId,
        page: u32,
        page_size: u32,
    ) -> StoreResult<(Vec<CallAssignment>, u64)> {
        let state = self.state.read().map_err(lock_error)?;
        let size = usize::try_from(page_size.max(1)).unwrap_or(usize::MAX);
        let skip = usize::try_from(page.saturating_sub(1))
            .unwrap_or(usize::MAX)
            .saturating_mul(size);
        let all: Vec<&CallAssignment> = campaign_assignments(&state, campaign_id).collect();
        let total = u64::try_from(all.len()).unwrap_or(u64::MAX);
        let rows = all.into_iter().skip(skip).take(size).cloned().collect();
        Ok((rows, total))
    }

    async fn list_needing_follow_up(
        &self,
        campaign_id: CampaignId,
    ) -> StoreResult<Vec<AssignmentId>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(campaign_assignments(&state, campaign_id)
            .filter(|assignment| {
                assignment.call_phase().is_terminal() && assignment.interest().is_none()
            })
            .map(CallAssignment::id)
            .collect())
    }
}

#[async_trait]
impl FollowUpRepository for InMemoryCampaignStore {
    async fn find_note(&self, id: FollowUpId) -> StoreResult<Option<FollowUpNote>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.notes.get(&id).cloned())
    }

    async fn create_and_bind(&self, note: &FollowUpNote) -> StoreResult<BindOutcome> {
        let mut state = self.state.write().map_err(lock_error)?;
        let assignment_id = note.assignment_id();
        let assignment = state
            .assignments
            .get_mut(&assignment_id)
            .ok_or(StoreError::AssignmentNotFound(assignment_id))?;
        if !assignment.settle_follow_up_at(note.id(), note.interest(), note.created_at()) {
            return Ok(BindOutcome::AlreadySet);
        }
        state.notes.insert(note.id(), note.clone());
        Ok(BindOutcome::Bound)
    }

    async fn update_and_settle(&self, note: &FollowUpNote) -> StoreResult<BindOutcome> {
        let mut state = self.state.write().map_err(lock_error)?;
        let stored = state
            .notes
            .get_mut(&note.id())
            .ok_or(StoreError::FollowUpNotFound(note.id()))?;
        *stored = note.clone();

        let assignment_id = note.assignment_id();
        let assignment = state
            .assignments
            .get_mut(&assignment_id)
            .ok_or(StoreError::AssignmentNotFound(assignment_id))?;
        if assignment.settle_follow_up_at(note.id(), note.interest(), note.latest_follow_up_at()) {
            Ok(BindOutcome::Bound)
        } else {
            Ok(BindOutcome::AlreadySet)
        }
    }
}

#[async_trait]
impl PollRunRepository for InMemoryCampaignStore {
    async fn try_acquire(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> StoreResult<bool> {
        let mut state = self.state.write().map_err(lock_error)?;
        let run = state
            .poll_runs
            .entry(campaign_id)
            .or_insert_with(|| PollRun::idle(campaign_id));
        if !run.is_acquirable(now, stale_after) {
            return Ok(false);
        }
        run.processing = true;
        run.started_at = Some(now);
        Ok(true)
    }

    async fn release(&self, campaign_id: CampaignId, now: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        let run = state
            .poll_runs
            .entry(campaign_id)
            .or_insert_with(|| PollRun::idle(campaign_id));
        run.processing = false;
        run.last_checked_at = Some(now);
        Ok(())
    }

    async fn find_poll_run(&self, campaign_id: CampaignId) -> StoreResult<Option<PollRun>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.poll_runs.get(&campaign_id).copied())
    }
}
