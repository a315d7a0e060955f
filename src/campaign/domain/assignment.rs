//! Call assignment entity and the value objects it carries.

use super::{
    AssignmentId, CampaignDomainError, CampaignId, FollowUpId, LeadId, ParseInterestVerdictError,
    ReferenceTag,
};
use crate::provider::domain::{CallPhase, ProviderJobId, ProviderJobState, ProviderTaskId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Normalized dialable phone number.
///
/// Separators (spaces, dashes, dots, parentheses) are removed; a single
/// leading `+` is kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    const MIN_DIGITS: usize = 3;
    const MAX_DIGITS: usize = 20;

    /// Creates a normalized phone number.
    ///
    /// # Errors
    ///
    /// Returns [`CampaignDomainError::InvalidPhoneNumber`] when the value
    /// contains characters other than digits and separators, or when the
    /// digit count is outside `3..=20`.
    pub fn new(value: impl Into<String>) -> Result<Self, CampaignDomainError> {
        let raw = value.into();
        let trimmed = raw.trim();
        let (prefix, rest) = trimmed
            .strip_prefix('+')
            .map_or(("", trimmed), |stripped| ("+", stripped));

        let mut digits = String::with_capacity(rest.len() + 1);
        digits.push_str(prefix);
        for ch in rest.chars() {
            match ch {
                '0'..='9' => digits.push(ch),
                ' ' | '-' | '.' | '(' | ')' => {}
                _ => return Err(CampaignDomainError::InvalidPhoneNumber(raw)),
            }
        }

        let digit_count = digits.len() - prefix.len();
        if !(Self::MIN_DIGITS..=Self::MAX_DIGITS).contains(&digit_count) {
            return Err(CampaignDomainError::InvalidPhoneNumber(raw));
        }
        Ok(Self(digits))
    }

    /// Returns the normalized number.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque conversation transcript returned by the provider.
///
/// The store keeps it as structured JSON and never interprets it; only the
/// follow-up generator serializes it into a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript(Value);

impl Transcript {
    /// Wraps a raw transcript payload.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// Returns an empty transcript.
    #[must_use]
    pub const fn empty() -> Self {
        Self(Value::Null)
    }

    /// Returns `true` when the payload carries no conversation content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::String(text) => text.trim().is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Object(fields) => fields.is_empty(),
            Value::Bool(_) | Value::Number(_) => false,
        }
    }

    /// Returns the raw payload.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consumes the transcript and returns the raw payload.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Interest verdict attached to an assignment by follow-up generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestVerdict {
    /// The conversation did not reveal interest either way.
    Unknown,
    /// The lead expressed interest.
    Interested,
    /// The lead declined.
    NotInterested,
}

impl InterestVerdict {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Interested => "interested",
            Self::NotInterested => "not_interested",
        }
    }

    /// Returns the numeric code used by classifiers and API callers.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Interested => 1,
            Self::NotInterested => 2,
        }
    }

    /// Maps a numeric code back to a verdict.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Unknown),
            1 => Some(Self::Interested),
            2 => Some(Self::NotInterested),
            _ => None,
        }
    }
}

impl TryFrom<&str> for InterestVerdict {
    type Error = ParseInterestVerdictError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "unknown" => Ok(Self::Unknown),
            "interested" => Ok(Self::Interested),
            "not_interested" => Ok(Self::NotInterested),
            _ => Err(ParseInterestVerdictError(value.to_owned())),
        }
    }
}

impl fmt::Display for InterestVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of the latest provider-side call attempt for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    /// Provider job state.
    pub state: ProviderJobState,
    /// Provider task of the latest attempt.
    pub task_id: Option<ProviderTaskId>,
    /// Planned dial time.
    pub planned_at: Option<DateTime<Utc>>,
    /// Actual dial time.
    pub actual_at: Option<DateTime<Utc>>,
    /// Number the provider dialled from.
    pub calling_number: Option<String>,
    /// Conversation transcript.
    pub transcript: Transcript,
}

/// Terminal outcome to persist for one assignment.
///
/// Produced by reconciliation for outcomes that differ from the stored
/// values; a page's updates are written in one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeUpdate {
    /// Assignment to update.
    pub assignment_id: AssignmentId,
    /// Terminal outcome reported by the provider.
    pub outcome: CallOutcome,
    /// When reconciliation observed the outcome.
    pub recorded_at: DateTime<Utc>,
}

/// A lead selected into a campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadContact {
    /// Lead identifier.
    pub lead_id: LeadId,
    /// Dialable phone number.
    pub phone: PhoneNumber,
    /// Name used when greeting the lead.
    pub display_name: String,
}

impl LeadContact {
    /// Creates a validated lead contact.
    ///
    /// # Errors
    ///
    /// Returns [`CampaignDomainError`] when the phone number or display name
    /// is invalid.
    pub fn new(
        lead_id: LeadId,
        phone: &str,
        display_name: &str,
    ) -> Result<Self, CampaignDomainError> {
        let name = display_name.trim();
        if name.is_empty() {
            return Err(CampaignDomainError::EmptyDisplayName);
        }
        Ok(Self {
            lead_id,
            phone: PhoneNumber::new(phone)?,
            display_name: name.to_owned(),
        })
    }
}

/// One lead's call attempt within a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallAssignment {
    id: AssignmentId,
    campaign_id: CampaignId,
    lead_id: LeadId,
    phone: PhoneNumber,
    display_name: String,
    reference_tag: ReferenceTag,
    provider_job_id: Option<ProviderJobId>,
    provider_task_id: Option<ProviderTaskId>,
    call_status: Option<ProviderJobState>,
    planned_call_at: Option<DateTime<Utc>>,
    actual_call_at: Option<DateTime<Utc>>,
    calling_number: Option<String>,
    transcript: Option<Transcript>,
    follow_up_id: Option<FollowUpId>,
    interest: Option<InterestVerdict>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedAssignmentData {
    /// Assignment identifier.
    pub id: AssignmentId,
    /// Owning campaign.
    pub campaign_id: CampaignId,
    /// Lead identifier.
    pub lead_id: LeadId,
    /// Phone number.
    pub phone: PhoneNumber,
    /// Display name.
    pub display_name: String,
    /// Correlation tag sent to the provider.
    pub reference_tag: ReferenceTag,
    /// Bound provider job.
    pub provider_job_id: Option<ProviderJobId>,
    /// Provider task of the latest attempt.
    pub provider_task_id: Option<ProviderTaskId>,
    /// Persisted terminal call status.
    pub call_status: Option<ProviderJobState>,
    /// Planned dial time.
    pub planned_call_at: Option<DateTime<Utc>>,
    /// Actual dial time.
    pub actual_call_at: Option<DateTime<Utc>>,
    /// Number dialled from.
    pub calling_number: Option<String>,
    /// Conversation transcript.
    pub transcript: Option<Transcript>,
    /// Bound follow-up note.
    pub follow_up_id: Option<FollowUpId>,
    /// Interest verdict.
    pub interest: Option<InterestVerdict>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl CallAssignment {
    /// Creates an unbound assignment for a lead.
    #[must_use]
    pub fn new(
        campaign_id: CampaignId,
        reference_tag: ReferenceTag,
        contact: LeadContact,
        clock: &impl Clock,
    ) -> Self {
        let timestamp = clock.utc();
        Self {
            id: AssignmentId::new(),
            campaign_id,
            lead_id: contact.lead_id,
            phone: contact.phone,
            display_name: contact.display_name,
            reference_tag,
            provider_job_id: None,
            provider_task_id: None,
            call_status: None,
            planned_call_at: None,
            actual_call_at: None,
            calling_number: None,
            transcript: None,
            follow_up_id: None,
            interest: None,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Reconstructs an assignment from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedAssignmentData) -> Self {
        Self {
            id: data.id,
            campaign_id: data.campaign_id,
            lead_id: data.lead_id,
            phone: data.phone,
            display_name: data.display_name,
            reference_tag: data.reference_tag,
            provider_job_id: data.provider_job_id,
            provider_task_id: data.provider_task_id,
            call_status: data.call_status,
            planned_call_at: data.planned_call_at,
            actual_call_at: data.actual_call_at,
            calling_number: data.calling_number,
            transcript: data.transcript,
            follow_up_id: data.follow_up_id,
            interest: data.interest,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the assignment identifier.
    #[must_use]
    pub const fn id(&self) -> AssignmentId {
        self.id
    }

    /// Returns the owning campaign.
    #[must_use]
    pub const fn campaign_id(&self) -> CampaignId {
        self.campaign_id
    }

    /// Returns the lead identifier.
    #[must_use]
    pub const fn lead_id(&self) -> LeadId {
        self.lead_id
    }

    /// Returns the phone number.
    #[must_use]
    pub const fn phone(&self) -> &PhoneNumber {
        &self.phone
    }

    /// Returns the display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the provider correlation tag.
    #[must_use]
    pub const fn reference_tag(&self) -> &ReferenceTag {
        &self.reference_tag
    }

    /// Returns the bound provider job, if any.
    #[must_use]
    pub const fn provider_job_id(&self) -> Option<&ProviderJobId> {
        self.provider_job_id.as_ref()
    }

    /// Returns the provider task of the latest attempt, if known.
    #[must_use]
    pub const fn provider_task_id(&self) -> Option<&ProviderTaskId> {
        self.provider_task_id.as_ref()
    }

    /// Returns the persisted call status, if any.
    #[must_use]
    pub const fn call_status(&self) -> Option<ProviderJobState> {
        self.call_status
    }

    /// Returns the collapsed call phase; an empty status is pending.
    #[must_use]
    pub fn call_phase(&self) -> CallPhase {
        self.call_status
            .map_or(CallPhase::Pending, ProviderJobState::phase)
    }

    /// Returns the planned dial time.
    #[must_use]
    pub const fn planned_call_at(&self) -> Option<DateTime<Utc>> {
        self.planned_call_at
    }

    /// Returns the actual dial time.
    #[must_use]
    pub const fn actual_call_at(&self) -> Option<DateTime<Utc>> {
        self.actual_call_at
    }

    /// Returns the number dialled from.
    #[must_use]
    pub fn calling_number(&self) -> Option<&str> {
        self.calling_number.as_deref()
    }

    /// Returns the stored transcript, if any.
    #[must_use]
    pub const fn transcript(&self) -> Option<&Transcript> {
        self.transcript.as_ref()
    }

    /// Returns `true` when a non-empty transcript is stored.
    #[must_use]
    pub fn has_transcript(&self) -> bool {
        self.transcript
            .as_ref()
            .is_some_and(|transcript| !transcript.is_empty())
    }

    /// Returns the bound follow-up note, if any.
    #[must_use]
    pub const fn follow_up_id(&self) -> Option<FollowUpId> {
        self.follow_up_id
    }

    /// Returns the interest verdict, if any.
    #[must_use]
    pub const fn interest(&self) -> Option<InterestVerdict> {
        self.interest
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns `true` when the provider outcome differs from what is stored
    /// in a way worth persisting.
    ///
    /// Only terminal outcomes qualify; intermediate states are never
    /// written so later polls keep retrying.
    #[must_use]
    pub fn outcome_differs(&self, outcome: &CallOutcome) -> bool {
        if !outcome.state.is_terminal() {
            return false;
        }
        self.call_status != Some(outcome.state)
            || !same_transcript(self.transcript.as_ref(), &outcome.transcript)
            || self.calling_number != outcome.calling_number
    }

    /// Binds a provider job if the assignment is still unbound.
    ///
    /// Returns `false` when a job is already bound; the first writer wins.
    pub fn bind_job(&mut self, job_id: ProviderJobId, clock: &impl Clock) -> bool {
        self.bind_job_at(job_id, clock.utc())
    }

    /// Binds a provider job at an explicit time; see [`Self::bind_job`].
    pub fn bind_job_at(&mut self, job_id: ProviderJobId, at: DateTime<Utc>) -> bool {
        if self.provider_job_id.is_some() {
            return false;
        }
        self.provider_job_id = Some(job_id);
        self.updated_at = at;
        true
    }

    /// Applies a terminal provider outcome.
    pub fn apply_outcome(&mut self, outcome: CallOutcome, clock: &impl Clock) {
        self.apply_outcome_at(outcome, clock.utc());
    }

    /// Applies a terminal provider outcome recorded at `recorded_at`.
    pub fn apply_outcome_at(&mut self, outcome: CallOutcome, recorded_at: DateTime<Utc>) {
        self.call_status = Some(outcome.state);
        if outcome.task_id.is_some() {
            self.provider_task_id = outcome.task_id;
        }
        if outcome.planned_at.is_some() {
            self.planned_call_at = outcome.planned_at;
        }
        if outcome.actual_at.is_some() {
            self.actual_call_at = outcome.actual_at;
        }
        self.calling_number = outcome.calling_number;
        self.transcript = (!outcome.transcript.is_empty()).then_some(outcome.transcript);
        self.updated_at = recorded_at;
    }

    /// Binds a follow-up note and verdict if no verdict is set yet.
    ///
    /// Returns `false` when a verdict already exists or a different note is
    /// bound; neither is ever replaced.
    pub fn settle_follow_up(
        &mut self,
        follow_up_id: FollowUpId,
        verdict: InterestVerdict,
        clock: &impl Clock,
    ) -> bool {
        self.settle_follow_up_at(follow_up_id, verdict, clock.utc())
    }

    /// Settles a follow-up at an explicit time; see
    /// [`Self::settle_follow_up`].
    pub fn settle_follow_up_at(
        &mut self,
        follow_up_id: FollowUpId,
        verdict: InterestVerdict,
        at: DateTime<Utc>,
    ) -> bool {
        let other_note_bound = self
            .follow_up_id
            .is_some_and(|existing| existing != follow_up_id);
        if self.interest.is_some() || other_note_bound {
            return false;
        }
        self.follow_up_id = Some(follow_up_id);
        self.interest = Some(verdict);
        self.updated_at = at;
        true
    }
}

/// Compares transcripts treating every empty payload as equal.
fn same_transcript(stored: Option<&Transcript>, incoming: &Transcript) -> bool {
    stored.map_or_else(
        || incoming.is_empty(),
        |current| current == incoming || (current.is_empty() && incoming.is_empty()),
    )
}
