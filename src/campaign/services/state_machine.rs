//! Completion evaluation with compare-and-set persistence.

use crate::campaign::{
    domain::{CampaignId, StageCounts, StageDecision, evaluate_stage},
    ports::{CampaignStore, StoreError},
};
use mockable::Clock;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors returned by stage evaluation.
#[derive(Debug, Error)]
pub enum StateMachineError {
    /// The campaign does not exist.
    #[error("campaign not found: {0}")]
    NotFound(CampaignId),
    /// Store access failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageEvaluation {
    /// Evaluated campaign.
    pub campaign_id: CampaignId,
    /// Aggregate counts the decision was based on.
    pub counts: StageCounts,
    /// Decided stage change.
    pub decision: StageDecision,
    /// Whether the decided transition was written; `false` for unchanged
    /// decisions and lost compare-and-set races.
    pub applied: bool,
}

/// Re-evaluates campaign stages from aggregate assignment counts.
#[derive(Clone)]
pub struct CampaignStateMachine<S, C>
where
    S: CampaignStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    clock: Arc<C>,
}

impl<S, C> CampaignStateMachine<S, C>
where
    S: CampaignStore,
    C: Clock + Send + Sync,
{
    /// Creates a state machine over a store.
    #[must_use]
    pub const fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self { store, clock }
    }

    /// Evaluates a campaign and writes any stage change with a
    /// compare-and-set on the stage that was read.
    ///
    /// # Errors
    ///
    /// Returns [`StateMachineError::NotFound`] for unknown campaigns and
    /// [`StateMachineError::Store`] when the store fails.
    pub async fn evaluate(&self, campaign_id: CampaignId) -> Result<StageEvaluation, StateMachineError> {
        let campaign = self
            .store
            .find_campaign(campaign_id)
            .await?
            .ok_or(StateMachineError::NotFound(campaign_id))?;

        let current = campaign.stage();
        if !current.is_evaluated() {
            return Ok(StageEvaluation {
                campaign_id,
                counts: StageCounts::default(),
                decision: StageDecision::Unchanged { stage: current },
                applied: false,
            });
        }

        let counts = self.store.stage_counts(campaign_id).await?;
        let decision = evaluate_stage(current, counts);
        let applied = match decision {
            StageDecision::Unchanged { .. } => false,
            StageDecision::Transition { from, to } => {
                let written = self
                    .store
                    .compare_and_set_stage(campaign_id, from, to, self.clock.utc())
                    .await?;
                if written {
                    info!(%campaign_id, %from, %to, ?counts, "campaign stage changed");
                } else {
                    debug!(%campaign_id, %from, %to, "stage changed concurrently; skipping write");
                }
                written
            }
        };

        Ok(StageEvaluation {
            campaign_id,
            counts,
            decision,
            applied,
        })
    }
}
