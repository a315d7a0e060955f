//! Matching provider jobs back to call assignments.
//!
//! Resolution order: reference tag, then phone number among unbound
//! assignments, then the raw job id. A job id already known locally never
//! binds a second assignment.

use crate::campaign::{
    domain::{AssignmentId, CallAssignment, CampaignId, PhoneNumber},
    ports::CampaignStore,
};
use crate::provider::{
    domain::{ProviderJob, ProviderJobId},
    ports::{CallProvider, ProviderError},
};
use crate::retry::RetryPolicy;
use mockable::Clock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{ReconcileError, ReconcileResult};

/// Outcome of resolving one provider job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The job should be bound to this unbound assignment.
    Bind {
        /// Assignment to bind.
        assignment_id: AssignmentId,
        /// Job to bind.
        job_id: ProviderJobId,
    },
    /// The job is already bound to this assignment.
    AlreadyBound {
        /// Assignment carrying the job.
        assignment_id: AssignmentId,
    },
    /// Several unbound assignments share the job's phone number.
    Ambiguous {
        /// Number of candidate assignments.
        candidates: usize,
    },
    /// The job's tag names an assignment bound to a different job.
    Conflict {
        /// Assignment the tag refers to.
        assignment_id: AssignmentId,
    },
    /// Nothing local refers to the job.
    Unmatched,
}

#[derive(Debug, Clone)]
struct TagEntry {
    assignment_id: AssignmentId,
    job_id: Option<ProviderJobId>,
}

/// Lookup tables built from a campaign's assignments.
#[derive(Debug, Default)]
pub struct IdentityIndex {
    by_tag: HashMap<String, TagEntry>,
    unbound_by_phone: HashMap<PhoneNumber, Vec<AssignmentId>>,
    by_job: HashMap<ProviderJobId, AssignmentId>,
}

impl IdentityIndex {
    /// Builds the index.
    #[must_use]
    pub fn build(assignments: &[CallAssignment]) -> Self {
        let mut index = Self::default();
        for assignment in assignments {
            index.by_tag.insert(
                assignment.reference_tag().as_str().to_owned(),
                TagEntry {
                    assignment_id: assignment.id(),
                    job_id: assignment.provider_job_id().cloned(),
                },
            );
            match assignment.provider_job_id() {
                Some(job_id) => {
                    index.by_job.insert(job_id.clone(), assignment.id());
                }
                None => index
                    .unbound_by_phone
                    .entry(assignment.phone().clone())
                    .or_default()
                    .push(assignment.id()),
            }
        }
        index
    }

    /// Returns the number of assignments still waiting for a job.
    #[must_use]
    pub fn unbound(&self) -> usize {
        self.unbound_by_phone.values().map(Vec::len).sum()
    }

    /// Resolves a job against the index.
    #[must_use]
    pub fn resolve(&self, job: &ProviderJob) -> Resolution {
        let known_owner = self.by_job.get(&job.job_id).copied();

        if let Some(entry) = job.correlation_tag().and_then(|tag| self.by_tag.get(tag)) {
            return match (&entry.job_id, known_owner) {
                (Some(bound), _) if *bound == job.job_id => Resolution::AlreadyBound {
                    assignment_id: entry.assignment_id,
                },
                (None, None) => Resolution::Bind {
                    assignment_id: entry.assignment_id,
                    job_id: job.job_id.clone(),
                },
                _ => Resolution::Conflict {
                    assignment_id: entry.assignment_id,
                },
            };
        }

        if known_owner.is_none() {
            let candidates = job
                .phone
                .as_ref()
                .and_then(|phone| self.unbound_by_phone.get(phone))
                .map_or(&[][..], Vec::as_slice);
            match candidates {
                [only] => {
                    return Resolution::Bind {
                        assignment_id: *only,
                        job_id: job.job_id.clone(),
                    };
                }
                [] => {}
                many => {
                    return Resolution::Ambiguous {
                        candidates: many.len(),
                    };
                }
            }
        }

        known_owner.map_or(Resolution::Unmatched, |assignment_id| {
            Resolution::AlreadyBound { assignment_id }
        })
    }

    /// Records a successful bind so later jobs in the same pass see it.
    pub fn record_binding(&mut self, assignment_id: AssignmentId, job_id: &ProviderJobId) {
        for ids in self.unbound_by_phone.values_mut() {
            ids.retain(|id| *id != assignment_id);
        }
        self.unbound_by_phone.retain(|_, ids| !ids.is_empty());
        if let Some(entry) = self
            .by_tag
            .values_mut()
            .find(|entry| entry.assignment_id == assignment_id)
        {
            entry.job_id = Some(job_id.clone());
        }
        self.by_job.insert(job_id.clone(), assignment_id);
    }
}

/// Counters from one identity sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Provider pages fetched.
    pub pages: u32,
    /// Assignments newly bound.
    pub bound: usize,
    /// Jobs that were already bound, including binds lost to a concurrent
    /// pass.
    pub already_bound: usize,
    /// Jobs whose phone matched several unbound assignments.
    pub ambiguous: usize,
    /// Jobs with no local counterpart or a conflicting tag, plus listed
    /// jobs the adapter dropped as unusable.
    pub discrepancies: usize,
    /// Provider pages that failed after retries.
    pub errors: usize,
}

/// Binds unacknowledged assignments by paging the campaign's job group.
pub struct IdentitySync<S, P, C>
where
    S: CampaignStore,
    P: CallProvider,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    provider: Arc<P>,
    clock: Arc<C>,
    retry: RetryPolicy,
    page_size: u32,
}

impl<S, P, C> IdentitySync<S, P, C>
where
    S: CampaignStore,
    P: CallProvider,
    C: Clock + Send + Sync,
{
    /// Creates an identity sync service.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        provider: Arc<P>,
        clock: Arc<C>,
        retry: RetryPolicy,
        page_size: u32,
    ) -> Self {
        Self {
            store,
            provider,
            clock,
            retry,
            page_size: page_size.clamp(1, 100),
        }
    }

    /// Pages the campaign's job group and binds every job the resolver
    /// matches.
    ///
    /// Campaigns without a job group or without unbound assignments are
    /// skipped. A provider page that still fails after retries ends the
    /// pass early and is counted in [`SyncReport::errors`].
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] when the campaign is missing or the store
    /// fails.
    pub async fn sync(&self, campaign_id: CampaignId) -> ReconcileResult<SyncReport> {
        let campaign = self
            .store
            .find_campaign(campaign_id)
            .await?
            .ok_or(ReconcileError::CampaignNotFound(campaign_id))?;
        let mut report = SyncReport::default();
        let Some(group_id) = campaign.provider_group_id() else {
            debug!(%campaign_id, "campaign has no job group; skipping identity sync");
            return Ok(report);
        };

        let assignments = self.store.list_for_campaign(campaign_id).await?;
        let mut index = IdentityIndex::build(&assignments);
        if index.unbound() == 0 {
            return Ok(report);
        }

        let mut page = 1_u32;
        let mut seen = 0_u64;
        loop {
            let fetched = self
                .retry
                .run(
                    "list_jobs_by_group",
                    || self.provider.list_jobs_by_group(group_id, page, self.page_size),
                    ProviderError::is_retryable,
                )
                .await;
            let job_page = match fetched {
                Ok(job_page) => job_page,
                Err(err) => {
                    warn!(%campaign_id, page, error = %err, "identity sync page failed");
                    report.errors += 1;
                    break;
                }
            };
            report.pages += 1;
            if job_page.malformed > 0 {
                warn!(%campaign_id, page, malformed = job_page.malformed, "provider page carried unusable jobs");
                report.discrepancies += job_page.malformed;
            }
            let listed = job_page.jobs.len() + job_page.malformed;
            if listed == 0 {
                break;
            }
            seen += u64::try_from(listed).unwrap_or(u64::MAX);

            for job in &job_page.jobs {
                self.apply(campaign_id, &mut index, job, &mut report).await?;
            }
            if seen >= job_page.total_count || index.unbound() == 0 {
                break;
            }
            page += 1;
        }

        if report.bound > 0 || report.discrepancies > 0 || report.ambiguous > 0 {
            info!(
                %campaign_id,
                bound = report.bound,
                ambiguous = report.ambiguous,
                discrepancies = report.discrepancies,
                "identity sync finished"
            );
        }
        Ok(report)
    }

    async fn apply(
        &self,
        campaign_id: CampaignId,
        index: &mut IdentityIndex,
        job: &ProviderJob,
        report: &mut SyncReport,
    ) -> ReconcileResult<()> {
        match index.resolve(job) {
            Resolution::Bind {
                assignment_id,
                job_id,
            } => {
                if self
                    .store
                    .bind_job_id(assignment_id, &job_id, self.clock.utc())
                    .await?
                {
                    index.record_binding(assignment_id, &job_id);
                    report.bound += 1;
                } else {
                    debug!(%campaign_id, %assignment_id, job_id = %job_id, "bind lost to a concurrent pass");
                    report.already_bound += 1;
                }
            }
            Resolution::AlreadyBound { .. } => report.already_bound += 1,
            Resolution::Ambiguous { candidates } => {
                warn!(%campaign_id, job_id = %job.job_id, candidates, "phone matches several unbound assignments");
                report.ambiguous += 1;
            }
            Resolution::Conflict { assignment_id } => {
                warn!(%campaign_id, %assignment_id, job_id = %job.job_id, "tagged assignment is bound to another job");
                report.discrepancies += 1;
            }
            Resolution::Unmatched => {
                warn!(%campaign_id, job_id = %job.job_id, "provider job matches no assignment");
                report.discrepancies += 1;
            }
        }
        Ok(())
    }
}
