//! Follow-up note entity.

use super::{AssignmentId, FollowUpId, InterestVerdict, LeadId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Remark recorded when a call never connected.
pub const NOT_CONNECTED_REMARK: &str = "not connected";

/// Remark recorded when classifier output could not be used.
pub const ANALYSIS_FAILED_REMARK: &str = "analysis failed, needs manual follow-up";

/// Outcome record derived from one call assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpNote {
    id: FollowUpId,
    lead_id: LeadId,
    assignment_id: AssignmentId,
    remark: String,
    interest: InterestVerdict,
    created_at: DateTime<Utc>,
    first_follow_up_at: DateTime<Utc>,
    latest_follow_up_at: DateTime<Utc>,
    next_follow_up_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted follow-up note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedFollowUpData {
    /// Note identifier.
    pub id: FollowUpId,
    /// Lead the note is about.
    pub lead_id: LeadId,
    /// Assignment the note was derived from.
    pub assignment_id: AssignmentId,
    /// Free-text remark.
    pub remark: String,
    /// Interest verdict.
    pub interest: InterestVerdict,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// First follow-up timestamp.
    pub first_follow_up_at: DateTime<Utc>,
    /// Most recent follow-up timestamp.
    pub latest_follow_up_at: DateTime<Utc>,
    /// Scheduled next contact.
    pub next_follow_up_at: DateTime<Utc>,
}

impl FollowUpNote {
    /// Creates a note for an assignment.
    #[must_use]
    pub fn new(
        lead_id: LeadId,
        assignment_id: AssignmentId,
        remark: impl Into<String>,
        interest: InterestVerdict,
        next_follow_up_at: DateTime<Utc>,
        clock: &impl Clock,
    ) -> Self {
        let timestamp = clock.utc();
        Self {
            id: FollowUpId::new(),
            lead_id,
            assignment_id,
            remark: remark.into(),
            interest,
            created_at: timestamp,
            first_follow_up_at: timestamp,
            latest_follow_up_at: timestamp,
            next_follow_up_at,
        }
    }

    /// Reconstructs a note from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedFollowUpData) -> Self {
        Self {
            id: data.id,
            lead_id: data.lead_id,
            assignment_id: data.assignment_id,
            remark: data.remark,
            interest: data.interest,
            created_at: data.created_at,
            first_follow_up_at: data.first_follow_up_at,
            latest_follow_up_at: data.latest_follow_up_at,
            next_follow_up_at: data.next_follow_up_at,
        }
    }

    /// Returns the note identifier.
    #[must_use]
    pub const fn id(&self) -> FollowUpId {
        self.id
    }

    /// Returns the lead identifier.
    #[must_use]
    pub const fn lead_id(&self) -> LeadId {
        self.lead_id
    }

    /// Returns the source assignment.
    #[must_use]
    pub const fn assignment_id(&self) -> AssignmentId {
        self.assignment_id
    }

    /// Returns the remark.
    #[must_use]
    pub fn remark(&self) -> &str {
        &self.remark
    }

    /// Returns the interest verdict.
    #[must_use]
    pub const fn interest(&self) -> InterestVerdict {
        self.interest
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the first follow-up timestamp.
    #[must_use]
    pub const fn first_follow_up_at(&self) -> DateTime<Utc> {
        self.first_follow_up_at
    }

    /// Returns the most recent follow-up timestamp.
    #[must_use]
    pub const fn latest_follow_up_at(&self) -> DateTime<Utc> {
        self.latest_follow_up_at
    }

    /// Returns the scheduled next contact.
    #[must_use]
    pub const fn next_follow_up_at(&self) -> DateTime<Utc> {
        self.next_follow_up_at
    }

    /// Replaces the remark, verdict and next contact time in place.
    ///
    /// The verdict only reaches the assignment if none was settled there
    /// yet.
    pub fn revise(
        &mut self,
        remark: impl Into<String>,
        interest: InterestVerdict,
        next_follow_up_at: DateTime<Utc>,
        clock: &impl Clock,
    ) {
        self.remark = remark.into();
        self.interest = interest;
        self.next_follow_up_at = next_follow_up_at;
        self.latest_follow_up_at = clock.utc();
    }
}
