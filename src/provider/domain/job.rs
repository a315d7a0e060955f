//! Normalized provider job records.
//!
//! Every provider payload is mapped into these types once, at the adapter
//! boundary. Reconciliation code only ever sees this canonical shape.

use super::{ParseProviderJobStateError, ProviderGroupId, ProviderJobId, ProviderTaskId};
use crate::campaign::domain::{CallOutcome, PhoneNumber, ReferenceTag, Transcript};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider ceiling on job ids per batch lookup.
pub const MAX_JOB_BATCH: usize = 100;

/// Collapsed view of a provider job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    /// Not dialled yet.
    Pending,
    /// Being dialled or in conversation.
    InProgress,
    /// Finished with a connected call.
    TerminalSuccess,
    /// Finished without a usable call.
    TerminalFailure,
}

impl CallPhase {
    /// Returns `true` for both terminal phases.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::TerminalSuccess | Self::TerminalFailure)
    }
}

/// Job state as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderJobState {
    /// Created but not yet released for dialling.
    Drafted,
    /// Waiting for a dial slot.
    Scheduling,
    /// Currently dialling or talking.
    Executing,
    /// Held because the group is suspended.
    Paused,
    /// Finished with a connected call.
    Succeeded,
    /// Finished without connecting.
    Failed,
    /// Withdrawn before completion.
    Cancelled,
    /// A state this client does not know. Never terminal, so the job is
    /// polled again rather than settled.
    Unrecognized,
}

impl ProviderJobState {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Drafted => "drafted",
            Self::Scheduling => "scheduling",
            Self::Executing => "executing",
            Self::Paused => "paused",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Unrecognized => "unrecognized",
        }
    }

    /// Collapses the state into its call phase.
    #[must_use]
    pub const fn phase(self) -> CallPhase {
        match self {
            Self::Drafted | Self::Scheduling | Self::Paused | Self::Unrecognized => {
                CallPhase::Pending
            }
            Self::Executing => CallPhase::InProgress,
            Self::Succeeded => CallPhase::TerminalSuccess,
            Self::Failed | Self::Cancelled => CallPhase::TerminalFailure,
        }
    }

    /// Returns `true` when the provider will not move the job further.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        self.phase().is_terminal()
    }
}

impl TryFrom<&str> for ProviderJobState {
    type Error = ParseProviderJobStateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "drafted" => Ok(Self::Drafted),
            "scheduling" => Ok(Self::Scheduling),
            "executing" => Ok(Self::Executing),
            "paused" => Ok(Self::Paused),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(ParseProviderJobStateError(value.to_owned())),
        }
    }
}

impl fmt::Display for ProviderJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One dial attempt of a provider job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallAttempt {
    /// Provider task identifier.
    pub task_id: Option<ProviderTaskId>,
    /// Planned dial time.
    pub planned_at: Option<DateTime<Utc>>,
    /// Actual dial time.
    pub actual_at: Option<DateTime<Utc>>,
    /// Number dialled from.
    pub calling_number: Option<String>,
    /// Conversation recorded during the attempt.
    pub transcript: Transcript,
}

/// A provider job in canonical shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderJob {
    /// Provider job identifier.
    pub job_id: ProviderJobId,
    /// Group the job belongs to, when reported.
    pub group_id: Option<ProviderGroupId>,
    /// Correlation tag echoed back by the provider.
    pub reference_tag: Option<String>,
    /// Callee phone number.
    pub phone: Option<PhoneNumber>,
    /// Job-level state.
    pub state: ProviderJobState,
    /// Dial attempts in provider order.
    pub attempts: Vec<CallAttempt>,
}

impl ProviderJob {
    /// Returns the snapshot of the latest attempt combined with the job
    /// state.
    ///
    /// The latest attempt is the one with the greatest planned time; ties
    /// and missing times fall back to provider order.
    #[must_use]
    pub fn outcome(&self) -> CallOutcome {
        let latest = self
            .attempts
            .iter()
            .enumerate()
            .max_by_key(|(index, attempt)| (attempt.planned_at, *index))
            .map(|(_, attempt)| attempt);

        latest.map_or_else(
            || CallOutcome {
                state: self.state,
                task_id: None,
                planned_at: None,
                actual_at: None,
                calling_number: None,
                transcript: Transcript::empty(),
            },
            |attempt| CallOutcome {
                state: self.state,
                task_id: attempt.task_id.clone(),
                planned_at: attempt.planned_at,
                actual_at: attempt.actual_at,
                calling_number: attempt.calling_number.clone(),
                transcript: attempt.transcript.clone(),
            },
        )
    }

    /// Returns the non-empty correlation tag, if any.
    #[must_use]
    pub fn correlation_tag(&self) -> Option<&str> {
        self.reference_tag
            .as_deref()
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
    }
}

/// A job to place for one lead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    /// Callee phone number.
    pub phone: PhoneNumber,
    /// Name the bot greets the callee with.
    pub display_name: String,
    /// Correlation tag the provider echoes back.
    pub reference_tag: ReferenceTag,
}

/// Dialling window within a day, in `HH:MM` provider notation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingWindow {
    /// Window start.
    pub start: String,
    /// Window end.
    pub end: String,
}

/// Retry and timing strategy for a job group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStrategy {
    /// Maximum dial attempts per job.
    pub max_attempts: u32,
    /// Minimum minutes between attempts.
    pub retry_interval_minutes: u32,
    /// Allowed dialling windows.
    pub working_windows: Vec<WorkingWindow>,
}

impl Default for CallStrategy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            retry_interval_minutes: 10,
            working_windows: vec![WorkingWindow {
                start: "09:00".to_owned(),
                end: "20:00".to_owned(),
            }],
        }
    }
}

/// Parameters for creating a provider job group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobGroupSpec {
    /// Group name.
    pub name: String,
    /// Group description.
    pub description: String,
    /// Dialling strategy.
    pub strategy: CallStrategy,
    /// Script the bot runs.
    pub script_id: super::ScriptId,
}

/// One page of jobs listed by group.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobPage {
    /// Jobs on this page.
    pub jobs: Vec<ProviderJob>,
    /// Total jobs in the group.
    pub total_count: u64,
    /// Jobs on this page dropped because they carried no usable job id.
    pub malformed: usize,
}
