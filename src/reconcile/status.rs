//! Paginated provider status polling and batched outcome merge.

use crate::campaign::{
    domain::{AssignmentId, CallAssignment, CampaignId, OutcomeUpdate},
    ports::{CampaignStore, StoreError},
};
use crate::config::ReconcileConfig;
use crate::provider::{
    domain::{MAX_JOB_BATCH, ProviderJobId, ProviderJobState},
    ports::{CallProvider, ProviderError},
};
use crate::retry::RetryPolicy;
use mockable::Clock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::ReconcileResult;

/// Retry settings for status reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Policy for transient provider failures within one page.
    pub retry: RetryPolicy,
    /// Delay before parked pages get their final attempt.
    pub parked_retry_delay: Duration,
}

impl ReconcileSettings {
    /// Builds settings from configuration.
    #[must_use]
    pub const fn from_config(config: &ReconcileConfig) -> Self {
        Self {
            retry: RetryPolicy::new(config.max_attempts, config.retry_delay()),
            parked_retry_delay: config.parked_retry_delay(),
        }
    }
}

/// Counters from one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Local pages processed.
    pub pages: u32,
    /// Jobs the provider returned that matched a page assignment.
    pub retrieved: usize,
    /// Assignments written.
    pub updated: usize,
    /// Pages given up on: business refusals and parked pages that failed
    /// again.
    pub errors: usize,
    /// Returned jobs with no page assignment or an unknown status, plus
    /// page assignments the provider did not return.
    pub discrepancies: usize,
    /// Whether any assignment still lacks a terminal status, unbound ones
    /// included.
    pub needs_more_polling: bool,
    /// Assignments that reached a terminal status in this pass.
    pub newly_terminal: Vec<AssignmentId>,
}

impl ReconcileReport {
    fn absorb(&mut self, page: PageStats) {
        self.retrieved += page.retrieved;
        self.updated += page.updated;
        self.discrepancies += page.discrepancies;
        self.newly_terminal.extend(page.newly_terminal);
    }
}

#[derive(Debug, Default)]
struct PageStats {
    retrieved: usize,
    updated: usize,
    discrepancies: usize,
    newly_terminal: Vec<AssignmentId>,
}

enum PageError {
    Provider(ProviderError),
    Store(StoreError),
}

/// Merges provider job state into call assignments.
pub struct StatusReconciler<S, P, C>
where
    S: CampaignStore,
    P: CallProvider,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    provider: Arc<P>,
    clock: Arc<C>,
    settings: ReconcileSettings,
}

impl<S, P, C> StatusReconciler<S, P, C>
where
    S: CampaignStore,
    P: CallProvider,
    C: Clock + Send + Sync,
{
    /// Creates a reconciler.
    #[must_use]
    pub const fn new(
        store: Arc<S>,
        provider: Arc<P>,
        clock: Arc<C>,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            store,
            provider,
            clock,
            settings,
        }
    }

    /// Reconciles every bound assignment of a campaign that still lacks a
    /// status or a transcript.
    ///
    /// `page_size` is clamped to `1..=100`. Pages are read by assignment id
    /// so rows written earlier in the pass never shift later pages. Pages
    /// whose transient failures outlast the retry policy are parked and
    /// attempted once more after the parked delay.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Store`](super::ReconcileError::Store) when
    /// the store fails; provider failures are counted in the report.
    pub async fn reconcile(
        &self,
        campaign_id: CampaignId,
        page_size: u32,
    ) -> ReconcileResult<ReconcileReport> {
        let limit = usize::try_from(page_size.clamp(1, 100)).unwrap_or(MAX_JOB_BATCH);
        let mut report = ReconcileReport::default();
        let mut parked = Vec::new();
        let mut cursor = None;

        loop {
            let page = self
                .store
                .pending_outcome_page(campaign_id, cursor, limit)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.id());
            let is_full = page.len() == limit;
            report.pages += 1;

            match self.process_page(&page, self.settings.retry).await {
                Ok(stats) => report.absorb(stats),
                Err(PageError::Store(err)) => return Err(err.into()),
                Err(PageError::Provider(err)) if err.is_retryable() => {
                    warn!(%campaign_id, page = report.pages, error = %err, "parking page after retries");
                    parked.push(page);
                }
                Err(PageError::Provider(err)) => {
                    warn!(%campaign_id, page = report.pages, error = %err, "provider refused page");
                    report.errors += 1;
                }
            }
            if !is_full {
                break;
            }
        }

        self.retry_parked(campaign_id, parked, &mut report).await?;

        let counts = self.store.stage_counts(campaign_id).await?;
        report.needs_more_polling = counts.awaiting_status() + counts.unbound() > 0;
        if report.updated > 0 || report.discrepancies > 0 || report.errors > 0 {
            info!(
                %campaign_id,
                pages = report.pages,
                updated = report.updated,
                discrepancies = report.discrepancies,
                errors = report.errors,
                needs_more_polling = report.needs_more_polling,
                "assignments reconciled"
            );
        } else {
            debug!(%campaign_id, pages = report.pages, retrieved = report.retrieved, "no assignment changed");
        }
        Ok(report)
    }

    /// Reconciles an explicit set of assignments.
    ///
    /// Unbound assignments are not looked up but still count towards
    /// [`ReconcileReport::needs_more_polling`]. Provider failures, including
    /// transient ones that outlast the retry policy, are counted as errors;
    /// nothing is parked.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Store`](super::ReconcileError::Store) when
    /// the store fails.
    pub async fn reconcile_assignments(
        &self,
        assignments: &[CallAssignment],
    ) -> ReconcileResult<ReconcileReport> {
        let bound: Vec<CallAssignment> = assignments
            .iter()
            .filter(|assignment| assignment.provider_job_id().is_some())
            .cloned()
            .collect();
        let mut report = ReconcileReport::default();

        for page in bound.chunks(MAX_JOB_BATCH) {
            report.pages += 1;
            match self.process_page(page, self.settings.retry).await {
                Ok(stats) => report.absorb(stats),
                Err(PageError::Store(err)) => return Err(err.into()),
                Err(PageError::Provider(err)) => {
                    warn!(page = report.pages, error = %err, "provider lookup failed");
                    report.errors += 1;
                }
            }
        }

        report.needs_more_polling = assignments.iter().any(|assignment| {
            assignment.provider_job_id().is_none()
                || (!assignment.call_phase().is_terminal()
                    && !report.newly_terminal.contains(&assignment.id()))
        });
        Ok(report)
    }

    async fn retry_parked(
        &self,
        campaign_id: CampaignId,
        parked: Vec<Vec<CallAssignment>>,
        report: &mut ReconcileReport,
    ) -> ReconcileResult<()> {
        if parked.is_empty() {
            return Ok(());
        }
        if !self.settings.parked_retry_delay.is_zero() {
            tokio::time::sleep(self.settings.parked_retry_delay).await;
        }
        for page in parked {
            match self.process_page(&page, RetryPolicy::once()).await {
                Ok(stats) => report.absorb(stats),
                Err(PageError::Store(err)) => return Err(err.into()),
                Err(PageError::Provider(err)) => {
                    warn!(%campaign_id, size = page.len(), error = %err, "parked page failed again; leaving for next pass");
                    report.errors += 1;
                }
            }
        }
        Ok(())
    }

    async fn process_page(
        &self,
        page: &[CallAssignment],
        retry: RetryPolicy,
    ) -> Result<PageStats, PageError> {
        let job_ids: Vec<ProviderJobId> = page
            .iter()
            .filter_map(|assignment| assignment.provider_job_id().cloned())
            .collect();
        let jobs = retry
            .run(
                "list_jobs_by_ids",
                || self.provider.list_jobs_by_ids(&job_ids),
                ProviderError::is_retryable,
            )
            .await
            .map_err(PageError::Provider)?;

        let mut by_job: HashMap<&ProviderJobId, &CallAssignment> = page
            .iter()
            .filter_map(|assignment| {
                assignment
                    .provider_job_id()
                    .map(|job_id| (job_id, assignment))
            })
            .collect();
        let mut stats = PageStats::default();
        let mut updates = Vec::new();
        let now = self.clock.utc();

        for job in jobs {
            let Some(assignment) = by_job.remove(&job.job_id) else {
                warn!(job_id = %job.job_id, "provider returned a job outside the page");
                stats.discrepancies += 1;
                continue;
            };
            stats.retrieved += 1;
            if job.state == ProviderJobState::Unrecognized {
                warn!(job_id = %job.job_id, assignment_id = %assignment.id(), "provider job has an unknown status");
                stats.discrepancies += 1;
                continue;
            }
            let outcome = job.outcome();
            if !assignment.outcome_differs(&outcome) {
                continue;
            }
            if !assignment.call_phase().is_terminal() {
                stats.newly_terminal.push(assignment.id());
            }
            updates.push(OutcomeUpdate {
                assignment_id: assignment.id(),
                outcome,
                recorded_at: now,
            });
        }

        for (job_id, assignment) in &by_job {
            warn!(%job_id, assignment_id = %assignment.id(), "provider did not return a bound job");
        }
        stats.discrepancies += by_job.len();

        if !updates.is_empty() {
            stats.updated = self
                .store
                .apply_outcomes(&updates)
                .await
                .map_err(PageError::Store)?;
        }
        Ok(stats)
    }
}
