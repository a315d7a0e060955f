//! Poll passes, sweeps and the work handler that drives them.

use crate::campaign::{
    domain::{CampaignId, CampaignStage},
    ports::CampaignStore,
    services::{CampaignStateMachine, StageEvaluation},
};
use crate::classifier::ports::Classifier;
use crate::provider::ports::CallProvider;
use crate::reconcile::{
    FollowUpGenerator, FollowUpTally, IdentitySync, ReconcileError, ReconcileReport,
    ReconcileResult, StatusReconciler, SyncReport,
};
use async_trait::async_trait;
use mockable::Clock;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{PollSchedule, WorkFailure, WorkHandler, WorkQueues, WorkUnit};

/// What started a poll pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTrigger {
    /// A scheduled one-shot poll; only `calling` campaigns are polled.
    OneShot,
    /// The recurring sweep; `completed` campaigns are polled too so late
    /// transcripts still produce follow-ups.
    Sweep,
}

impl PollTrigger {
    const fn accepts(self, stage: CampaignStage) -> bool {
        match self {
            Self::OneShot => matches!(stage, CampaignStage::Calling),
            Self::Sweep => matches!(stage, CampaignStage::Calling | CampaignStage::Completed),
        }
    }
}

/// Counters from one completed poll pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPassReport {
    /// Identity sync counters.
    pub sync: SyncReport,
    /// Status reconciliation counters.
    pub reconcile: ReconcileReport,
    /// Inline follow-up generation tally; empty when follow-ups were
    /// queued.
    pub follow_ups: FollowUpTally,
    /// Follow-ups handed to the `generate_follow_up` queue.
    pub queued_follow_ups: usize,
    /// Final stage evaluation.
    pub evaluation: StageEvaluation,
}

/// Result of asking for a poll pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The pass ran.
    Completed(Box<PollPassReport>),
    /// The campaign's stage is not polled by this trigger.
    NotPolled(CampaignStage),
    /// Another pass holds the campaign's poll-run flag.
    Busy,
}

/// Counters from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Campaigns considered.
    pub campaigns: usize,
    /// Passes that ran.
    pub passes: usize,
    /// Campaigns skipped because a pass was already running.
    pub busy: usize,
    /// Campaigns whose pass failed.
    pub failed: usize,
}

/// Runs poll passes for campaigns.
pub struct Orchestrator<S, P, K, C>
where
    S: CampaignStore,
    P: CallProvider,
    K: Classifier,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    clock: Arc<C>,
    identity: IdentitySync<S, P, C>,
    status: StatusReconciler<S, P, C>,
    follow_ups: FollowUpGenerator<S, K, C>,
    state_machine: CampaignStateMachine<S, C>,
    page_size: u32,
    stale_after: chrono::Duration,
    follow_up_queue: OnceLock<WorkQueues>,
}

/// Collaborators for an [`Orchestrator`].
pub struct OrchestratorParts<S, P, K, C>
where
    S: CampaignStore,
    P: CallProvider,
    K: Classifier,
    C: Clock + Send + Sync,
{
    /// Identity sync service.
    pub identity: IdentitySync<S, P, C>,
    /// Status reconciler.
    pub status: StatusReconciler<S, P, C>,
    /// Follow-up generator.
    pub follow_ups: FollowUpGenerator<S, K, C>,
    /// Reconciliation page size.
    pub page_size: u32,
    /// Age after which a held poll-run flag may be taken over.
    pub stale_after: chrono::Duration,
}

impl<S, P, K, C> Orchestrator<S, P, K, C>
where
    S: CampaignStore,
    P: CallProvider,
    K: Classifier,
    C: Clock + Send + Sync,
{
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<C>, parts: OrchestratorParts<S, P, K, C>) -> Self {
        let state_machine = CampaignStateMachine::new(Arc::clone(&store), Arc::clone(&clock));
        Self {
            store,
            clock,
            identity: parts.identity,
            status: parts.status,
            follow_ups: parts.follow_ups,
            state_machine,
            page_size: parts.page_size,
            stale_after: parts.stale_after,
            follow_up_queue: OnceLock::new(),
        }
    }

    /// Hands follow-up generation of later passes to the
    /// `generate_follow_up` queue instead of classifying inline.
    ///
    /// Only the first attachment takes effect.
    pub fn attach_queues(&self, queues: &WorkQueues) {
        if self.follow_up_queue.set(queues.clone()).is_err() {
            debug!("work queues already attached");
        }
    }

    /// Returns the follow-up generator.
    #[must_use]
    pub const fn follow_ups(&self) -> &FollowUpGenerator<S, K, C> {
        &self.follow_ups
    }

    /// Returns the identity sync service.
    #[must_use]
    pub const fn identity(&self) -> &IdentitySync<S, P, C> {
        &self.identity
    }

    /// Returns the status reconciler.
    #[must_use]
    pub const fn status(&self) -> &StatusReconciler<S, P, C> {
        &self.status
    }

    /// Returns the campaign state machine.
    #[must_use]
    pub const fn state_machine(&self) -> &CampaignStateMachine<S, C> {
        &self.state_machine
    }

    /// Runs one poll pass under the campaign's poll-run flag.
    ///
    /// The pass syncs identities, reconciles statuses, generates pending
    /// follow-ups and re-evaluates the stage. With queues attached the
    /// follow-ups are queued rather than generated, so classifier latency
    /// never holds the flag. The flag is released afterwards whether or not
    /// the pass succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] when the campaign is missing or the store
    /// fails.
    pub async fn poll_campaign(
        &self,
        campaign_id: CampaignId,
        trigger: PollTrigger,
    ) -> ReconcileResult<PassOutcome> {
        let campaign = self
            .store
            .find_campaign(campaign_id)
            .await?
            .ok_or(ReconcileError::CampaignNotFound(campaign_id))?;
        if !trigger.accepts(campaign.stage()) {
            debug!(%campaign_id, stage = %campaign.stage(), ?trigger, "campaign not polled");
            return Ok(PassOutcome::NotPolled(campaign.stage()));
        }

        if !self
            .store
            .try_acquire(campaign_id, self.clock.utc(), self.stale_after)
            .await?
        {
            debug!(%campaign_id, "poll pass already running");
            return Ok(PassOutcome::Busy);
        }

        let pass = self.run_pass(campaign_id).await;
        let released = self.store.release(campaign_id, self.clock.utc()).await;
        if let Err(err) = &released {
            warn!(%campaign_id, error = %err, "failed to release poll-run flag");
        }
        let report = pass?;
        released?;
        Ok(PassOutcome::Completed(Box::new(report)))
    }

    async fn run_pass(&self, campaign_id: CampaignId) -> ReconcileResult<PollPassReport> {
        let sync = self.identity.sync(campaign_id).await?;
        let reconcile = self.status.reconcile(campaign_id, self.page_size).await?;
        let (follow_ups, queued_follow_ups) = match self.follow_up_queue.get() {
            Some(queues) => self.queue_follow_ups(campaign_id, queues).await?,
            None => (self.follow_ups.generate_pending(campaign_id).await?, 0),
        };
        let evaluation = self.state_machine.evaluate(campaign_id).await?;
        info!(
            %campaign_id,
            bound = sync.bound,
            updated = reconcile.updated,
            follow_ups = follow_ups.created + follow_ups.updated,
            queued_follow_ups,
            stage = %evaluation.decision.resulting_stage(),
            "poll pass finished"
        );
        Ok(PollPassReport {
            sync,
            reconcile,
            follow_ups,
            queued_follow_ups,
            evaluation,
        })
    }

    /// Queues one unit per terminal assignment without a verdict. Once the
    /// queue is closed the rest are generated inline.
    async fn queue_follow_ups(
        &self,
        campaign_id: CampaignId,
        queues: &WorkQueues,
    ) -> ReconcileResult<(FollowUpTally, usize)> {
        let pending = self.store.list_needing_follow_up(campaign_id).await?;
        let mut tally = FollowUpTally::default();
        let mut queued = 0;
        let mut inline = false;
        for assignment_id in pending {
            if !inline {
                match queues.submit(WorkUnit::GenerateFollowUp(assignment_id)).await {
                    Ok(()) => {
                        queued += 1;
                        continue;
                    }
                    Err(err) => {
                        warn!(%campaign_id, %assignment_id, error = %err, "could not queue follow-up; generating inline");
                        inline = true;
                    }
                }
            }
            tally.record(self.follow_ups.generate(assignment_id).await?);
        }
        if queued > 0 {
            debug!(%campaign_id, queued, "follow-ups queued");
        }
        Ok((tally, queued))
    }

    /// Polls every `calling` and `completed` campaign once.
    ///
    /// A failing campaign is logged and counted; the sweep continues.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Store`] when the campaigns cannot be
    /// listed.
    pub async fn sweep(&self) -> ReconcileResult<SweepReport> {
        let mut campaigns = self.store.list_by_stage(CampaignStage::Calling).await?;
        campaigns.extend(self.store.list_by_stage(CampaignStage::Completed).await?);

        let mut report = SweepReport {
            campaigns: campaigns.len(),
            ..SweepReport::default()
        };
        for campaign in campaigns {
            match self.poll_campaign(campaign.id(), PollTrigger::Sweep).await {
                Ok(PassOutcome::Completed(_)) => report.passes += 1,
                Ok(PassOutcome::Busy) => report.busy += 1,
                Ok(PassOutcome::NotPolled(_)) => {}
                Err(err) => {
                    warn!(campaign_id = %campaign.id(), error = %err, "sweep pass failed");
                    report.failed += 1;
                }
            }
        }
        info!(
            campaigns = report.campaigns,
            passes = report.passes,
            busy = report.busy,
            failed = report.failed,
            "sweep finished"
        );
        Ok(report)
    }
}

impl From<ReconcileError> for WorkFailure {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Store(_) => Self::retryable(err.to_string()),
            ReconcileError::CampaignNotFound(_) | ReconcileError::AssignmentNotFound(_) => {
                Self::permanent(err.to_string())
            }
        }
    }
}

#[async_trait]
impl<S, P, K, C> WorkHandler for Orchestrator<S, P, K, C>
where
    S: CampaignStore + 'static,
    P: CallProvider + 'static,
    K: Classifier + 'static,
    C: Clock + Send + Sync + 'static,
{
    async fn handle(&self, unit: WorkUnit) -> Result<(), WorkFailure> {
        match unit {
            WorkUnit::SyncIdentities(campaign_id) => {
                self.identity.sync(campaign_id).await?;
            }
            WorkUnit::PollStatus(campaign_id) => {
                self.poll_campaign(campaign_id, PollTrigger::OneShot).await?;
            }
            WorkUnit::GenerateFollowUp(assignment_id) => {
                self.follow_ups.generate(assignment_id).await?;
            }
            WorkUnit::Sweep => {
                self.sweep().await?;
            }
        }
        Ok(())
    }
}

/// Queues the decaying one-shot polls for a campaign that just started
/// calling.
pub fn schedule_polls(queues: &WorkQueues, schedule: &PollSchedule, campaign_id: CampaignId) {
    let offsets = schedule.one_shot_offsets();
    debug!(%campaign_id, polls = offsets.len(), "scheduling one-shot polls");
    for offset in offsets {
        queues.submit_after(WorkUnit::PollStatus(campaign_id), offset);
    }
}

/// Submits a sweep every `interval` until `cancel` fires.
pub async fn run_sweep_loop(queues: &WorkQueues, interval: Duration, cancel: &CancellationToken) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = queues.submit(WorkUnit::Sweep).await {
                    warn!(error = %err, "could not queue sweep");
                    break;
                }
            }
        }
    }
    debug!("sweep loop stopped");
}
