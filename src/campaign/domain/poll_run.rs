//! Poll-run bookkeeping used to keep reconciliation passes from overlapping.

use super::CampaignId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Scheduling record for one campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollRun {
    /// Campaign the record belongs to.
    pub campaign_id: CampaignId,
    /// Whether a reconciliation pass currently holds the campaign.
    pub processing: bool,
    /// When the current or most recent pass acquired the flag.
    pub started_at: Option<DateTime<Utc>>,
    /// When the most recent pass released the flag.
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl PollRun {
    /// Creates an idle record.
    #[must_use]
    pub const fn idle(campaign_id: CampaignId) -> Self {
        Self {
            campaign_id,
            processing: false,
            started_at: None,
            last_checked_at: None,
        }
    }

    /// Returns `true` when a new pass may take the flag at `now`.
    ///
    /// A flag held longer than `stale_after` belongs to a pass that died
    /// without releasing it and may be taken over.
    #[must_use]
    pub fn is_acquirable(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        if !self.processing {
            return true;
        }
        self.started_at
            .is_none_or(|started_at| now - started_at >= stale_after)
    }
}
