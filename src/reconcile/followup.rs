//! Exactly-once follow-up note generation for terminal assignments.

use crate::campaign::{
    domain::{
        ANALYSIS_FAILED_REMARK, AssignmentId, CallAssignment, CampaignId, FollowUpId,
        FollowUpNote, InterestVerdict, NOT_CONNECTED_REMARK, Transcript,
    },
    ports::{BindOutcome, CampaignStore},
    services::CampaignStateMachine,
};
use crate::classifier::{
    domain::{CallAnalysis, PromptContext, PromptTemplate, parse_analysis},
    ports::{Classifier, ClassifierError},
};
use crate::provider::domain::{CallPhase, ProviderJobState};
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{ReconcileError, ReconcileResult};

/// Why generation wrote nothing and never will for this assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A verdict was already present.
    AlreadySet,
    /// A concurrent run settled the verdict first.
    ConcurrentRun,
}

/// Why generation wrote nothing yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// The call has no terminal status yet.
    NotTerminal,
    /// The call connected but its transcript has not arrived.
    AwaitingTranscript,
}

/// Result of one generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUpOutcome {
    /// A note was created and bound.
    Created(FollowUpId),
    /// An existing note was revised and its verdict settled.
    Updated(FollowUpId),
    /// Nothing was written, permanently.
    Skipped(SkipReason),
    /// Nothing was written; a later run may succeed.
    Deferred(DeferReason),
}

/// Tally from a campaign-wide generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FollowUpTally {
    /// Notes created.
    pub created: usize,
    /// Notes revised.
    pub updated: usize,
    /// Assignments skipped.
    pub skipped: usize,
    /// Assignments deferred.
    pub deferred: usize,
}

impl FollowUpTally {
    /// Counts one outcome.
    pub const fn record(&mut self, outcome: FollowUpOutcome) {
        match outcome {
            FollowUpOutcome::Created(_) => self.created += 1,
            FollowUpOutcome::Updated(_) => self.updated += 1,
            FollowUpOutcome::Skipped(_) => self.skipped += 1,
            FollowUpOutcome::Deferred(_) => self.deferred += 1,
        }
    }
}

/// Generates follow-up notes and interest verdicts.
pub struct FollowUpGenerator<S, K, C>
where
    S: CampaignStore,
    K: Classifier,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    classifier: Arc<K>,
    clock: Arc<C>,
    template: PromptTemplate,
    retry: RetryPolicy,
    state_machine: CampaignStateMachine<S, C>,
}

impl<S, K, C> FollowUpGenerator<S, K, C>
where
    S: CampaignStore,
    K: Classifier,
    C: Clock + Send + Sync,
{
    /// Creates a generator with the default prompt and no classifier
    /// retries.
    #[must_use]
    pub fn new(store: Arc<S>, classifier: Arc<K>, clock: Arc<C>) -> Self {
        let state_machine = CampaignStateMachine::new(Arc::clone(&store), Arc::clone(&clock));
        Self {
            store,
            classifier,
            clock,
            template: PromptTemplate::default(),
            retry: RetryPolicy::once(),
            state_machine,
        }
    }

    /// Replaces the prompt template.
    #[must_use]
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Retries transient classifier failures with `retry`.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Generates the follow-up for one assignment.
    ///
    /// On `Created` or `Updated` the owning campaign's stage is
    /// re-evaluated.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] when the assignment is missing or the
    /// store fails. Classifier failures degrade to an "analysis failed"
    /// note.
    pub async fn generate(&self, assignment_id: AssignmentId) -> ReconcileResult<FollowUpOutcome> {
        let assignment = self
            .store
            .find_assignment(assignment_id)
            .await?
            .ok_or(ReconcileError::AssignmentNotFound(assignment_id))?;

        if assignment.interest().is_some() {
            return Ok(FollowUpOutcome::Skipped(SkipReason::AlreadySet));
        }
        let Some(status) = assignment.call_status() else {
            return Ok(FollowUpOutcome::Deferred(DeferReason::NotTerminal));
        };
        let now = self.clock.utc();
        let analysis = match (status.phase(), assignment.transcript()) {
            (phase, _) if !phase.is_terminal() => {
                return Ok(FollowUpOutcome::Deferred(DeferReason::NotTerminal));
            }
            (_, Some(transcript)) if !transcript.is_empty() => {
                self.analyse(&assignment, status, transcript, now).await
            }
            (CallPhase::TerminalFailure, _) => CallAnalysis {
                remark: NOT_CONNECTED_REMARK.to_owned(),
                interest: InterestVerdict::Unknown,
                next_follow_up_at: now,
            },
            _ => return Ok(FollowUpOutcome::Deferred(DeferReason::AwaitingTranscript)),
        };

        let outcome = self.write(&assignment, analysis).await?;
        match outcome {
            FollowUpOutcome::Created(note_id) | FollowUpOutcome::Updated(note_id) => {
                info!(%assignment_id, %note_id, ?outcome, "follow-up recorded");
                self.state_machine.evaluate(assignment.campaign_id()).await?;
            }
            FollowUpOutcome::Skipped(reason) => {
                debug!(%assignment_id, ?reason, "follow-up already settled by another run");
            }
            FollowUpOutcome::Deferred(_) => {}
        }
        Ok(outcome)
    }

    /// Generates follow-ups for every terminal assignment of a campaign
    /// that has no verdict.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] when the store fails.
    pub async fn generate_pending(&self, campaign_id: CampaignId) -> ReconcileResult<FollowUpTally> {
        let mut tally = FollowUpTally::default();
        for assignment_id in self.store.list_needing_follow_up(campaign_id).await? {
            tally.record(self.generate(assignment_id).await?);
        }
        Ok(tally)
    }

    async fn analyse(
        &self,
        assignment: &CallAssignment,
        status: ProviderJobState,
        transcript: &Transcript,
        now: DateTime<Utc>,
    ) -> CallAnalysis {
        let assignment_id = assignment.id();
        let context = PromptContext::new(assignment.display_name(), status.as_str(), transcript, now);
        let prompt = match self.template.render(&context) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(%assignment_id, error = %err, "prompt rendering failed");
                return analysis_failed(now);
            }
        };
        let reply = self
            .retry
            .run(
                "classify",
                || self.classifier.classify(&prompt),
                ClassifierError::is_retryable,
            )
            .await;
        match reply {
            Ok(text) => parse_analysis(&text, now).unwrap_or_else(|err| {
                warn!(%assignment_id, error = %err, "classifier output unusable");
                analysis_failed(now)
            }),
            Err(err) => {
                warn!(%assignment_id, error = %err, "classifier call failed");
                analysis_failed(now)
            }
        }
    }

    async fn write(
        &self,
        assignment: &CallAssignment,
        analysis: CallAnalysis,
    ) -> ReconcileResult<FollowUpOutcome> {
        let existing = match assignment.follow_up_id() {
            Some(note_id) => self.store.find_note(note_id).await?,
            None => None,
        };

        if let Some(mut note) = existing {
            note.revise(
                analysis.remark,
                analysis.interest,
                analysis.next_follow_up_at,
                &*self.clock,
            );
            let settled = self.store.update_and_settle(&note).await?;
            return Ok(match settled {
                BindOutcome::Bound => FollowUpOutcome::Updated(note.id()),
                BindOutcome::AlreadySet => FollowUpOutcome::Skipped(SkipReason::ConcurrentRun),
            });
        }

        let note = FollowUpNote::new(
            assignment.lead_id(),
            assignment.id(),
            analysis.remark,
            analysis.interest,
            analysis.next_follow_up_at,
            &*self.clock,
        );
        Ok(match self.store.create_and_bind(&note).await? {
            BindOutcome::Bound => FollowUpOutcome::Created(note.id()),
            BindOutcome::AlreadySet => FollowUpOutcome::Skipped(SkipReason::ConcurrentRun),
        })
    }
}

fn analysis_failed(now: DateTime<Utc>) -> CallAnalysis {
    CallAnalysis {
        remark: ANALYSIS_FAILED_REMARK.to_owned(),
        interest: InterestVerdict::Unknown,
        next_follow_up_at: now,
    }
}
