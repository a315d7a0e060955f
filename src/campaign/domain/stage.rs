//! Pure completion evaluation over aggregate assignment counts.

use super::CampaignStage;
use serde::{Deserialize, Serialize};

/// Aggregate assignment counts for one campaign.
///
/// Produced by a single aggregate store query; callers never iterate rows
/// to build it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    /// All assignments of the campaign.
    pub total: u64,
    /// Assignments bound to a provider job.
    pub bound: u64,
    /// Bound assignments whose call status is terminal.
    pub terminal: u64,
    /// Bound assignments carrying an interest verdict.
    pub with_verdict: u64,
}

impl StageCounts {
    /// Assignments the provider has not acknowledged yet.
    #[must_use]
    pub const fn unbound(self) -> u64 {
        self.total.saturating_sub(self.bound)
    }

    /// Bound assignments still lacking a terminal status.
    #[must_use]
    pub const fn awaiting_status(self) -> u64 {
        self.bound.saturating_sub(self.terminal)
    }

    /// Bound assignments still lacking an interest verdict.
    #[must_use]
    pub const fn awaiting_verdict(self) -> u64 {
        self.bound.saturating_sub(self.with_verdict)
    }

    /// Returns `true` when every assignment is bound and terminal.
    ///
    /// A campaign without assignments, or with any assignment the provider
    /// never acknowledged, is not complete.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        self.total > 0 && self.bound == self.total && self.terminal == self.bound
    }

    /// Returns `true` when complete and every bound assignment has a verdict.
    #[must_use]
    pub const fn is_followed_up(self) -> bool {
        self.is_complete() && self.with_verdict == self.bound
    }

    /// Adds another campaign's counts to these.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        Self {
            total: self.total + other.total,
            bound: self.bound + other.bound,
            terminal: self.terminal + other.terminal,
            with_verdict: self.with_verdict + other.with_verdict,
        }
    }
}

/// Result of evaluating a campaign's stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageDecision {
    /// The stage already reflects the counts.
    Unchanged {
        /// Current stage.
        stage: CampaignStage,
    },
    /// The stage should move.
    Transition {
        /// Current stage.
        from: CampaignStage,
        /// Target stage.
        to: CampaignStage,
    },
}

impl StageDecision {
    /// Returns the stage the campaign ends up in.
    #[must_use]
    pub const fn resulting_stage(self) -> CampaignStage {
        match self {
            Self::Unchanged { stage } => stage,
            Self::Transition { to, .. } => to,
        }
    }
}

/// Decides the stage a campaign should be in given its aggregate counts.
///
/// Only `calling`, `completed` and `followed_up` are evaluated; every other
/// stage is left untouched. The target is the furthest stage the counts
/// support, so `calling` may move straight to `followed_up`, and a
/// regressed aggregate moves `completed`/`followed_up` back to `calling`.
///
/// # Examples
///
/// ```
/// use outcall::campaign::domain::{CampaignStage, StageCounts, StageDecision, evaluate_stage};
///
/// let counts = StageCounts { total: 3, bound: 3, terminal: 3, with_verdict: 3 };
/// assert_eq!(
///     evaluate_stage(CampaignStage::Calling, counts),
///     StageDecision::Transition { from: CampaignStage::Calling, to: CampaignStage::FollowedUp },
/// );
/// ```
#[must_use]
pub const fn evaluate_stage(current: CampaignStage, counts: StageCounts) -> StageDecision {
    if !current.is_evaluated() {
        return StageDecision::Unchanged { stage: current };
    }

    let target = if !counts.is_complete() {
        CampaignStage::Calling
    } else if counts.is_followed_up() {
        CampaignStage::FollowedUp
    } else {
        CampaignStage::Completed
    };

    if target as u8 == current as u8 {
        StageDecision::Unchanged { stage: current }
    } else {
        StageDecision::Transition {
            from: current,
            to: target,
        }
    }
}
