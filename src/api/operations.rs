//! Operations exposed to the API and CLI layer.

use crate::cache::TtlStatsCache;
use crate::campaign::{
    domain::{
        AssignmentId, CallAssignment, Campaign, CampaignId, CampaignStage, OrganizationId,
        PollRun, StageCounts,
    },
    ports::CampaignStore,
    services::{
        CampaignLifecycleService, CampaignStatsService, CreateCampaignRequest, OrganizationStats,
        StartCallingReport, SuspendAction,
    },
};
use crate::classifier::ports::Classifier;
use crate::provider::{domain::MAX_JOB_BATCH, ports::CallProvider};
use crate::reconcile::{FollowUpTally, ReconcileReport};
use crate::scheduler::{Orchestrator, PollSchedule, WorkQueues, WorkUnit, schedule_polls};
use mockable::Clock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ApiError, ApiResult, Envelope, ErrorCode};

/// Statistics cache used by [`CampaignOperations`].
pub type OrganizationStatsCache<C> = TtlStatsCache<OrganizationId, OrganizationStats, C>;

/// A newly created campaign.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedCampaign {
    /// The campaign.
    pub campaign: Campaign,
    /// Assignments created for it.
    pub assignments: usize,
}

/// One page of a campaign's execution state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionPage {
    /// Campaign queried.
    pub campaign_id: CampaignId,
    /// Stage after any update.
    pub stage: CampaignStage,
    /// 1-based page number.
    pub page: u32,
    /// Page size actually used.
    pub page_size: u32,
    /// Assignments in the campaign.
    pub total: u64,
    /// Assignments on this page.
    pub assignments: Vec<CallAssignment>,
    /// Reconciliation counters when an update was requested.
    pub reconcile: Option<ReconcileReport>,
    /// Inline follow-up tally when an update was requested without queues.
    pub follow_ups: Option<FollowUpTally>,
}

/// Diagnostic snapshot of one campaign.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    /// The campaign.
    pub campaign: Campaign,
    /// Aggregate assignment counts.
    pub counts: StageCounts,
    /// Assignments the provider never acknowledged.
    pub unbound_assignments: Vec<CallAssignment>,
    /// Poll-run bookkeeping, if a pass ever ran.
    pub poll_run: Option<PollRun>,
}

struct Scheduling {
    queues: WorkQueues,
    schedule: PollSchedule,
}

/// Campaign operations with responses wrapped in [`Envelope`]s.
///
/// Without attached queues, follow-ups for assignments that turn terminal
/// during [`Self::query_execution`] are generated inline and no one-shot
/// polls are scheduled.
pub struct CampaignOperations<S, P, K, C>
where
    S: CampaignStore,
    P: CallProvider,
    K: Classifier,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    lifecycle: CampaignLifecycleService<S, P, C>,
    orchestrator: Arc<Orchestrator<S, P, K, C>>,
    stats: CampaignStatsService<S, OrganizationStatsCache<C>>,
    scheduling: Option<Scheduling>,
}

impl<S, P, K, C> CampaignOperations<S, P, K, C>
where
    S: CampaignStore,
    P: CallProvider,
    K: Classifier,
    C: Clock + Send + Sync,
{
    /// Creates the operations facade.
    #[must_use]
    pub const fn new(
        store: Arc<S>,
        lifecycle: CampaignLifecycleService<S, P, C>,
        orchestrator: Arc<Orchestrator<S, P, K, C>>,
        stats: CampaignStatsService<S, OrganizationStatsCache<C>>,
    ) -> Self {
        Self {
            store,
            lifecycle,
            orchestrator,
            stats,
            scheduling: None,
        }
    }

    /// Routes scheduled polls, identity syncs and follow-ups through the
    /// work queues.
    #[must_use]
    pub fn with_queues(mut self, queues: WorkQueues, schedule: PollSchedule) -> Self {
        self.scheduling = Some(Scheduling { queues, schedule });
        self
    }

    /// Creates a campaign and its assignments.
    pub async fn create_campaign(&self, request: CreateCampaignRequest) -> Envelope<CreatedCampaign> {
        self.try_create_campaign(request).await.into()
    }

    async fn try_create_campaign(
        &self,
        request: CreateCampaignRequest,
    ) -> ApiResult<Envelope<CreatedCampaign>> {
        let (campaign, assignments) = self.lifecycle.create_campaign(request).await?;
        self.stats.invalidate(campaign.organization_id());
        Ok(Envelope::success(
            "campaign created",
            CreatedCampaign {
                campaign,
                assignments: assignments.len(),
            },
        ))
    }

    /// Starts calling and schedules the follow-up polls.
    ///
    /// Assignments the provider did not bind positionally are left to
    /// identity sync; the response says how many.
    pub async fn start_calling(&self, campaign_id: CampaignId) -> Envelope<StartCallingReport> {
        self.try_start_calling(campaign_id).await.into()
    }

    async fn try_start_calling(
        &self,
        campaign_id: CampaignId,
    ) -> ApiResult<Envelope<StartCallingReport>> {
        let report = self.lifecycle.start_calling(campaign_id).await?;

        if let Some(scheduling) = &self.scheduling {
            schedule_polls(&scheduling.queues, &scheduling.schedule, campaign_id);
            if report.unbound > 0 {
                if let Err(err) = scheduling
                    .queues
                    .submit(WorkUnit::SyncIdentities(campaign_id))
                    .await
                {
                    warn!(%campaign_id, error = %err, "could not queue identity sync");
                }
            }
        }
        let campaign = self.load_campaign(campaign_id).await?;
        self.stats.invalidate(campaign.organization_id());

        let message = if report.unbound > 0 {
            format!(
                "calling started; {} assignments await provider acknowledgement",
                report.unbound
            )
        } else {
            "calling started".to_owned()
        };
        Ok(Envelope::success(message, report))
    }

    /// Returns one page of assignments, optionally refreshing them from the
    /// provider first.
    ///
    /// With `apply_update`, the page's bound assignments are reconciled,
    /// follow-ups are produced for assignments that turned terminal and the
    /// campaign stage is re-evaluated. Provider failures leave the stored
    /// state in place and are reported in the message.
    pub async fn query_execution(
        &self,
        campaign_id: CampaignId,
        page: u32,
        page_size: u32,
        apply_update: bool,
    ) -> Envelope<ExecutionPage> {
        self.try_query_execution(campaign_id, page, page_size, apply_update)
            .await
            .into()
    }

    async fn try_query_execution(
        &self,
        campaign_id: CampaignId,
        page: u32,
        page_size: u32,
        apply_update: bool,
    ) -> ApiResult<Envelope<ExecutionPage>> {
        let campaign = self.load_campaign(campaign_id).await?;
        let page_number = page.max(1);
        let size = page_size.clamp(1, u32::try_from(MAX_JOB_BATCH).unwrap_or(u32::MAX));
        let (listed, total) = self.store.list_page(campaign_id, page_number, size).await?;

        if !apply_update {
            let message = page_message(&listed, None);
            return Ok(Envelope::success(
                message,
                ExecutionPage {
                    campaign_id,
                    stage: campaign.stage(),
                    page: page_number,
                    page_size: size,
                    total,
                    assignments: listed,
                    reconcile: None,
                    follow_ups: None,
                },
            ));
        }

        let report = self.orchestrator.status().reconcile_assignments(&listed).await?;
        let follow_ups = self.dispatch_follow_ups(&report.newly_terminal).await?;
        if report.updated > 0 {
            self.orchestrator.state_machine().evaluate(campaign_id).await?;
            self.stats.invalidate(campaign.organization_id());
        }

        let refreshed = self.load_campaign(campaign_id).await?;
        let (assignments, refreshed_total) =
            self.store.list_page(campaign_id, page_number, size).await?;
        let message = page_message(&assignments, Some(&report));
        Ok(Envelope::success(
            message,
            ExecutionPage {
                campaign_id,
                stage: refreshed.stage(),
                page: page_number,
                page_size: size,
                total: refreshed_total,
                assignments,
                reconcile: Some(report),
                follow_ups,
            },
        ))
    }

    async fn dispatch_follow_ups(
        &self,
        newly_terminal: &[AssignmentId],
    ) -> ApiResult<Option<FollowUpTally>> {
        if let Some(scheduling) = &self.scheduling {
            let mut queued = true;
            for assignment_id in newly_terminal {
                if let Err(err) = scheduling
                    .queues
                    .submit(WorkUnit::GenerateFollowUp(*assignment_id))
                    .await
                {
                    warn!(%assignment_id, error = %err, "could not queue follow-up; generating inline");
                    queued = false;
                    break;
                }
            }
            if queued {
                debug!(count = newly_terminal.len(), "follow-ups queued");
                return Ok(None);
            }
        }

        let mut tally = FollowUpTally::default();
        for assignment_id in newly_terminal {
            let outcome = self.orchestrator.follow_ups().generate(*assignment_id).await?;
            tally.record(outcome);
        }
        Ok(Some(tally))
    }

    /// Suspends or resumes a calling campaign.
    pub async fn suspend_resume(
        &self,
        campaign_id: CampaignId,
        action: SuspendAction,
    ) -> Envelope<Campaign> {
        self.try_suspend_resume(campaign_id, action).await.into()
    }

    async fn try_suspend_resume(
        &self,
        campaign_id: CampaignId,
        action: SuspendAction,
    ) -> ApiResult<Envelope<Campaign>> {
        let campaign = self.lifecycle.suspend_resume(campaign_id, action).await?;
        self.stats.invalidate(campaign.organization_id());
        let message = match action {
            SuspendAction::Suspend => "campaign suspended",
            SuspendAction::Resume => "campaign resumed",
        };
        Ok(Envelope::success(message, campaign))
    }

    /// Soft deletes a campaign.
    pub async fn delete_campaign(&self, campaign_id: CampaignId) -> Envelope<Campaign> {
        self.try_delete_campaign(campaign_id).await.into()
    }

    async fn try_delete_campaign(&self, campaign_id: CampaignId) -> ApiResult<Envelope<Campaign>> {
        let campaign = self.lifecycle.delete_campaign(campaign_id).await?;
        self.stats.invalidate(campaign.organization_id());
        Ok(Envelope::success("campaign deleted", campaign))
    }

    /// Resolves the recording of an assignment's latest call.
    pub async fn recording_url(&self, assignment_id: AssignmentId) -> Envelope<Option<String>> {
        match self.lifecycle.recording_url(assignment_id).await {
            Ok(Some(url)) => Envelope::success("recording available", Some(url)),
            Ok(None) => Envelope::success("no recording yet", None),
            Err(err) => Envelope::failure(&err.into()),
        }
    }

    /// Reports stage counts, unacknowledged assignments and poll-run state.
    pub async fn diagnose(&self, campaign_id: CampaignId) -> Envelope<Diagnosis> {
        self.try_diagnose(campaign_id).await.into()
    }

    async fn try_diagnose(&self, campaign_id: CampaignId) -> ApiResult<Envelope<Diagnosis>> {
        let campaign = self.load_campaign(campaign_id).await?;
        let counts = self.store.stage_counts(campaign_id).await?;
        let unbound_assignments: Vec<CallAssignment> = self
            .store
            .list_for_campaign(campaign_id)
            .await?
            .into_iter()
            .filter(|assignment| assignment.provider_job_id().is_none())
            .collect();
        let poll_run = self.store.find_poll_run(campaign_id).await?;

        let message = if unbound_assignments.is_empty() {
            format!(
                "{} awaiting status, {} awaiting follow-up",
                counts.awaiting_status(),
                counts.awaiting_verdict()
            )
        } else {
            format!(
                "{} assignments never acknowledged by the provider; campaign cannot complete until they are bound",
                unbound_assignments.len()
            )
        };
        Ok(Envelope::success(
            message,
            Diagnosis {
                campaign,
                counts,
                unbound_assignments,
                poll_run,
            },
        ))
    }

    /// Returns cached statistics for an organization.
    pub async fn organization_stats(
        &self,
        organization_id: OrganizationId,
    ) -> Envelope<OrganizationStats> {
        match self.stats.organization_stats(organization_id).await {
            Ok(stats) => Envelope::success("organization statistics", stats),
            Err(err) => Envelope::failure(&err.into()),
        }
    }

    async fn load_campaign(&self, campaign_id: CampaignId) -> ApiResult<Campaign> {
        self.store.find_campaign(campaign_id).await?.ok_or_else(|| {
            ApiError::new(
                ErrorCode::NotFound,
                format!("campaign not found: {campaign_id}"),
            )
        })
    }
}

fn page_message(assignments: &[CallAssignment], report: Option<&ReconcileReport>) -> String {
    if report.is_some_and(|reconciled| reconciled.errors > 0) {
        return "provider unavailable; showing stored state".to_owned();
    }
    if assignments
        .iter()
        .any(|assignment| !assignment.call_phase().is_terminal())
    {
        "calls still in progress".to_owned()
    } else if assignments
        .iter()
        .any(|assignment| assignment.interest().is_none())
    {
        "calls finished; follow-ups pending".to_owned()
    } else {
        "all calls on this page are settled".to_owned()
    }
}
