//! Operator-driven campaign lifecycle: creation, start, suspend/resume and
//! soft delete.

use crate::campaign::{
    domain::{
        AssignmentId, CallAssignment, Campaign, CampaignDomainError, CampaignDraft, CampaignId,
        CampaignStage, LeadContact, LeadId, ReferenceTag,
    },
    ports::{CampaignStore, StoreError},
};
use crate::provider::{
    domain::{CallStrategy, JobGroupSpec, JobRequest, MAX_JOB_BATCH, ProviderGroupId},
    ports::{CallProvider, ProviderError},
};
use mockable::Clock;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// A lead offered for a new campaign, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadCandidate {
    /// Lead identifier.
    pub lead_id: LeadId,
    /// Raw phone number.
    pub phone: String,
    /// Greeting name.
    pub display_name: String,
}

/// Request for creating a campaign.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateCampaignRequest {
    /// Campaign attributes.
    pub draft: CampaignDraft,
    /// Leads selected by the draft's filter.
    pub leads: Vec<LeadCandidate>,
}

/// Operator action on a calling campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendAction {
    /// Pause dialling.
    Suspend,
    /// Continue dialling.
    Resume,
}

/// Summary of a start-calling run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartCallingReport {
    /// Job group created for the campaign.
    pub group_id: ProviderGroupId,
    /// Jobs accepted by the provider.
    pub assigned: usize,
    /// Assignments bound positionally to the returned job ids.
    pub bound: usize,
    /// Assignments left for identity sync to bind.
    pub unbound: usize,
    /// Requests the provider refused.
    pub rejected: usize,
}

/// Service-level errors for campaign lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The campaign does not exist.
    #[error("campaign not found: {0}")]
    NotFound(CampaignId),
    /// The assignment does not exist.
    #[error("assignment not found: {0}")]
    AssignmentNotFound(AssignmentId),
    /// No lead survived validation, or no unbound assignment remains.
    #[error("no assignable leads")]
    NoAssignableLeads,
    /// The operation is not allowed in the campaign's current stage.
    #[error("cannot {operation} campaign {campaign_id} in stage {stage}")]
    InvalidStage {
        /// Campaign identifier.
        campaign_id: CampaignId,
        /// Current stage.
        stage: CampaignStage,
        /// Attempted operation.
        operation: &'static str,
    },
    /// The campaign has no provider job group yet.
    #[error("campaign {0} has no provider job group")]
    MissingProviderGroup(CampaignId),
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] CampaignDomainError),
    /// The call provider failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// Store access failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Campaign lifecycle orchestration service.
#[derive(Clone)]
pub struct CampaignLifecycleService<S, P, C>
where
    S: CampaignStore,
    P: CallProvider,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    provider: Arc<P>,
    clock: Arc<C>,
    strategy: CallStrategy,
}

impl<S, P, C> CampaignLifecycleService<S, P, C>
where
    S: CampaignStore,
    P: CallProvider,
    C: Clock + Send + Sync,
{
    /// Creates a lifecycle service using the default call strategy.
    #[must_use]
    pub fn new(store: Arc<S>, provider: Arc<P>, clock: Arc<C>) -> Self {
        Self {
            store,
            provider,
            clock,
            strategy: CallStrategy::default(),
        }
    }

    /// Replaces the strategy applied to new job groups.
    #[must_use]
    pub fn with_strategy(mut self, strategy: CallStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Creates a campaign and one assignment per distinct valid phone
    /// number.
    ///
    /// Leads with an invalid phone or blank name are skipped; later leads
    /// repeating an earlier phone are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NoAssignableLeads`] when no lead survives,
    /// or a domain or store error.
    pub async fn create_campaign(
        &self,
        request: CreateCampaignRequest,
    ) -> LifecycleResult<(Campaign, Vec<CallAssignment>)> {
        let mut seen_phones = HashSet::new();
        let mut contacts = Vec::with_capacity(request.leads.len());
        for candidate in request.leads {
            match LeadContact::new(candidate.lead_id, &candidate.phone, &candidate.display_name) {
                Ok(contact) => {
                    if seen_phones.insert(contact.phone.clone()) {
                        contacts.push(contact);
                    }
                }
                Err(err) => {
                    warn!(lead_id = %candidate.lead_id, error = %err, "skipping lead");
                }
            }
        }
        if contacts.is_empty() {
            return Err(LifecycleError::NoAssignableLeads);
        }

        let lead_count = u32::try_from(contacts.len()).unwrap_or(u32::MAX);
        let organization_id = request.draft.organization_id;
        let campaign = Campaign::new(request.draft, lead_count, &*self.clock)?;
        let assignments: Vec<CallAssignment> = contacts
            .into_iter()
            .map(|contact| {
                let tag = ReferenceTag::derive(campaign.id(), organization_id, contact.lead_id);
                CallAssignment::new(campaign.id(), tag, contact, &*self.clock)
            })
            .collect();

        self.store.store_campaign(&campaign).await?;
        self.store.store_assignments(&assignments).await?;
        info!(
            campaign_id = %campaign.id(),
            leads = assignments.len(),
            "campaign created"
        );
        Ok((campaign, assignments))
    }

    /// Claims the campaign for calling, creates its provider job group,
    /// assigns every unbound assignment in batches and leaves the campaign
    /// in `calling`.
    ///
    /// The `created` to `calling` move is a compare-and-set write taken
    /// before the provider is contacted, so a concurrent start or delete
    /// sees the claim. When no batch is accepted the claim is handed back
    /// and the job group is kept for the next attempt.
    ///
    /// Returned job ids are bound positionally only when the provider
    /// returns exactly one id per request; otherwise identity sync binds
    /// them later.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidStage`] unless the campaign is in
    /// `created` or when another operation moved it mid-start,
    /// [`LifecycleError::NoAssignableLeads`] when nothing is left to
    /// assign, and the first provider error when no batch was accepted.
    pub async fn start_calling(&self, campaign_id: CampaignId) -> LifecycleResult<StartCallingReport> {
        let mut campaign = self.load(campaign_id).await?;
        if campaign.stage() != CampaignStage::Created {
            return Err(LifecycleError::InvalidStage {
                campaign_id,
                stage: campaign.stage(),
                operation: "start calling",
            });
        }

        let pending: Vec<CallAssignment> = self
            .store
            .list_for_campaign(campaign_id)
            .await?
            .into_iter()
            .filter(|assignment| assignment.provider_job_id().is_none())
            .collect();
        if pending.is_empty() {
            return Err(LifecycleError::NoAssignableLeads);
        }

        campaign.transition_to(CampaignStage::Calling, &*self.clock)?;
        let claimed = self
            .store
            .compare_and_set_stage(
                campaign_id,
                CampaignStage::Created,
                CampaignStage::Calling,
                campaign.updated_at(),
            )
            .await?;
        if !claimed {
            return Err(self.stage_conflict(campaign_id, "start calling").await);
        }

        match self.place_jobs(&campaign, &pending).await {
            Ok(report) => {
                info!(
                    %campaign_id,
                    assigned = report.assigned,
                    bound = report.bound,
                    rejected = report.rejected,
                    "calling started"
                );
                Ok(report)
            }
            Err(err) => {
                let released = self
                    .store
                    .compare_and_set_stage(
                        campaign_id,
                        CampaignStage::Calling,
                        CampaignStage::Created,
                        self.clock.utc(),
                    )
                    .await;
                if let Err(release_err) = released {
                    warn!(%campaign_id, error = %release_err, "failed to hand back start claim");
                }
                Err(err)
            }
        }
    }

    async fn place_jobs(
        &self,
        campaign: &Campaign,
        pending: &[CallAssignment],
    ) -> LifecycleResult<StartCallingReport> {
        let campaign_id = campaign.id();
        let group_id = match campaign.provider_group_id() {
            Some(existing) => existing.clone(),
            None => {
                let spec = JobGroupSpec {
                    name: campaign.name().to_owned(),
                    description: format!("outbound campaign {campaign_id}"),
                    strategy: self.strategy.clone(),
                    script_id: campaign.script_id().clone(),
                };
                self.provider.create_job_group(&spec).await?
            }
        };
        let attached = self
            .store
            .attach_provider_group(campaign_id, &group_id, self.clock.utc())
            .await?;
        if !attached {
            warn!(%campaign_id, %group_id, "campaign moved while its job group was created");
            return Err(self.stage_conflict(campaign_id, "start calling").await);
        }

        let mut report = StartCallingReport {
            group_id: group_id.clone(),
            assigned: 0,
            bound: 0,
            unbound: 0,
            rejected: 0,
        };
        let mut first_error = None;
        for batch in pending.chunks(MAX_JOB_BATCH) {
            match self.assign_batch(campaign_id, &group_id, batch).await {
                Ok((assigned, bound)) => {
                    report.assigned += assigned;
                    report.bound += bound;
                }
                Err(LifecycleError::Provider(err)) => {
                    warn!(%campaign_id, batch = batch.len(), error = %err, "provider refused batch");
                    report.rejected += batch.len();
                    first_error.get_or_insert(err);
                }
                Err(other) => return Err(other),
            }
        }
        if report.assigned == 0 {
            if let Some(err) = first_error {
                return Err(LifecycleError::Provider(err));
            }
        }
        report.unbound = pending.len().saturating_sub(report.bound);
        Ok(report)
    }

    async fn assign_batch(
        &self,
        campaign_id: CampaignId,
        group_id: &ProviderGroupId,
        batch: &[CallAssignment],
    ) -> LifecycleResult<(usize, usize)> {
        let requests: Vec<JobRequest> = batch
            .iter()
            .map(|assignment| JobRequest {
                phone: assignment.phone().clone(),
                display_name: assignment.display_name().to_owned(),
                reference_tag: assignment.reference_tag().clone(),
            })
            .collect();
        let job_ids = self.provider.assign_jobs(group_id, &requests).await?;

        if job_ids.len() != batch.len() {
            warn!(
                %campaign_id,
                requested = batch.len(),
                returned = job_ids.len(),
                "job id count differs from request count; deferring binding to identity sync"
            );
            return Ok((job_ids.len(), 0));
        }

        let mut bound = 0;
        let now = self.clock.utc();
        for (assignment, job_id) in batch.iter().zip(&job_ids) {
            if self.store.bind_job_id(assignment.id(), job_id, now).await? {
                bound += 1;
            }
        }
        Ok((job_ids.len(), bound))
    }

    /// Suspends or resumes dialling after the provider acknowledges.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidStage`] when suspending a campaign
    /// that is not `calling` or resuming one that is not `suspended`.
    pub async fn suspend_resume(
        &self,
        campaign_id: CampaignId,
        action: SuspendAction,
    ) -> LifecycleResult<Campaign> {
        let mut campaign = self.load(campaign_id).await?;
        let (expected, target, operation) = match action {
            SuspendAction::Suspend => (CampaignStage::Calling, CampaignStage::Suspended, "suspend"),
            SuspendAction::Resume => (CampaignStage::Suspended, CampaignStage::Calling, "resume"),
        };
        if campaign.stage() != expected {
            return Err(LifecycleError::InvalidStage {
                campaign_id,
                stage: campaign.stage(),
                operation,
            });
        }
        let group_id = campaign
            .provider_group_id()
            .cloned()
            .ok_or(LifecycleError::MissingProviderGroup(campaign_id))?;

        match action {
            SuspendAction::Suspend => self.provider.suspend(&group_id).await?,
            SuspendAction::Resume => self.provider.resume(&group_id).await?,
        }

        campaign.transition_to(target, &*self.clock)?;
        let written = self
            .store
            .compare_and_set_stage(campaign_id, expected, target, campaign.updated_at())
            .await?;
        if !written {
            return Err(self.stage_conflict(campaign_id, operation).await);
        }
        info!(%campaign_id, %target, operation, "operator changed campaign stage");
        Ok(campaign)
    }

    /// Soft deletes a campaign, pausing its job group first when calling.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidStage`] when already deleted.
    pub async fn delete_campaign(&self, campaign_id: CampaignId) -> LifecycleResult<Campaign> {
        let mut campaign = self.load(campaign_id).await?;
        let current = campaign.stage();
        if !current.can_transition_to(CampaignStage::Deleted) {
            return Err(LifecycleError::InvalidStage {
                campaign_id,
                stage: current,
                operation: "delete",
            });
        }
        if current == CampaignStage::Calling {
            if let Some(group_id) = campaign.provider_group_id() {
                if let Err(err) = self.provider.suspend(group_id).await {
                    warn!(%campaign_id, error = %err, "failed to pause job group before delete");
                }
            }
        }

        campaign.transition_to(CampaignStage::Deleted, &*self.clock)?;
        let written = self
            .store
            .compare_and_set_stage(campaign_id, current, CampaignStage::Deleted, campaign.updated_at())
            .await?;
        if !written {
            return Err(self.stage_conflict(campaign_id, "delete").await);
        }
        info!(%campaign_id, "campaign deleted");
        Ok(campaign)
    }

    /// Resolves the recording of an assignment's latest call attempt.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AssignmentNotFound`] for unknown
    /// assignments and provider errors from the lookup.
    pub async fn recording_url(&self, assignment_id: AssignmentId) -> LifecycleResult<Option<String>> {
        let assignment = self
            .store
            .find_assignment(assignment_id)
            .await?
            .ok_or(LifecycleError::AssignmentNotFound(assignment_id))?;
        match assignment.provider_task_id() {
            Some(task_id) => Ok(self.provider.fetch_recording_url(task_id).await?),
            None => Ok(None),
        }
    }

    async fn load(&self, campaign_id: CampaignId) -> LifecycleResult<Campaign> {
        self.store
            .find_campaign(campaign_id)
            .await?
            .ok_or(LifecycleError::NotFound(campaign_id))
    }

    /// Builds the error for a guarded write that lost to another operation.
    async fn stage_conflict(&self, campaign_id: CampaignId, operation: &'static str) -> LifecycleError {
        match self.load(campaign_id).await {
            Ok(current) => LifecycleError::InvalidStage {
                campaign_id,
                stage: current.stage(),
                operation,
            },
            Err(err) => err,
        }
    }
}
