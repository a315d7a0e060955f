//! Campaign aggregate root and stage lifecycle.

use super::{CampaignDomainError, CampaignId, OrganizationId, ParseCampaignStageError};
use crate::provider::domain::{ProviderGroupId, ScriptId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Campaign lifecycle stage.
///
/// The numeric codes are part of the external contract and are what the
/// API layer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStage {
    /// Campaign and its assignments exist; no calls placed yet.
    Created,
    /// Jobs have been handed to the provider and are being polled.
    Calling,
    /// Every bound assignment reached a terminal call status.
    Completed,
    /// Every bound assignment additionally carries an interest verdict.
    FollowedUp,
    /// Calling was paused by an operator.
    Suspended,
    /// Campaign was soft-deleted.
    Deleted,
}

impl CampaignStage {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Calling => "calling",
            Self::Completed => "completed",
            Self::FollowedUp => "followed_up",
            Self::Suspended => "suspended",
            Self::Deleted => "deleted",
        }
    }

    /// Returns the numeric stage code exposed to API callers.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Created => 1,
            Self::Calling => 2,
            Self::Completed => 3,
            Self::FollowedUp => 4,
            Self::Suspended => 5,
            Self::Deleted => 6,
        }
    }

    /// Returns `true` when the stage is subject to completion evaluation.
    #[must_use]
    pub const fn is_evaluated(self) -> bool {
        matches!(self, Self::Calling | Self::Completed | Self::FollowedUp)
    }

    /// Returns whether an operator-driven transition to `target` is valid.
    ///
    /// Completion transitions (`calling`, `completed`, `followed_up` among
    /// each other) are owned by the state machine evaluation and are also
    /// accepted here so that compare-and-set writes can be validated.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        match (self, target) {
            (Self::Created, Self::Calling)
            | (Self::Calling, Self::Suspended | Self::Completed | Self::FollowedUp)
            | (Self::Suspended, Self::Calling)
            | (Self::Completed, Self::Calling | Self::FollowedUp)
            | (Self::FollowedUp, Self::Calling | Self::Completed) => true,
            (Self::Deleted, _) => false,
            (_, Self::Deleted) => true,
            _ => false,
        }
    }
}

impl TryFrom<&str> for CampaignStage {
    type Error = ParseCampaignStageError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "created" | "1" => Ok(Self::Created),
            "calling" | "2" => Ok(Self::Calling),
            "completed" | "3" => Ok(Self::Completed),
            "followed_up" | "4" => Ok(Self::FollowedUp),
            "suspended" | "5" => Ok(Self::Suspended),
            "deleted" | "6" => Ok(Self::Deleted),
            _ => Err(ParseCampaignStageError(value.to_owned())),
        }
    }
}

impl fmt::Display for CampaignStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validated attributes of a campaign about to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignDraft {
    /// Display name.
    pub name: String,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Provider script/scenario the calls run.
    pub script_id: ScriptId,
    /// Lead filter used to compute the lead set, kept verbatim.
    pub filter_snapshot: Value,
    /// User who created the campaign.
    pub created_by: String,
}

/// Campaign aggregate root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    id: CampaignId,
    name: String,
    organization_id: OrganizationId,
    script_id: ScriptId,
    provider_group_id: Option<ProviderGroupId>,
    stage: CampaignStage,
    lead_count: u32,
    filter_snapshot: Value,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted campaign.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedCampaignData {
    /// Persisted campaign identifier.
    pub id: CampaignId,
    /// Persisted display name.
    pub name: String,
    /// Persisted owning organization.
    pub organization_id: OrganizationId,
    /// Persisted script identifier.
    pub script_id: ScriptId,
    /// Persisted provider group, if calling has started.
    pub provider_group_id: Option<ProviderGroupId>,
    /// Persisted stage.
    pub stage: CampaignStage,
    /// Persisted lead count.
    pub lead_count: u32,
    /// Persisted filter snapshot.
    pub filter_snapshot: Value,
    /// Persisted creator.
    pub created_by: String,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Creates a new campaign in the `created` stage.
    ///
    /// # Errors
    ///
    /// Returns [`CampaignDomainError::EmptyCampaignName`] when the name is
    /// blank.
    pub fn new(
        draft: CampaignDraft,
        lead_count: u32,
        clock: &impl Clock,
    ) -> Result<Self, CampaignDomainError> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(CampaignDomainError::EmptyCampaignName);
        }
        let timestamp = clock.utc();
        Ok(Self {
            id: CampaignId::new(),
            name: name.to_owned(),
            organization_id: draft.organization_id,
            script_id: draft.script_id,
            provider_group_id: None,
            stage: CampaignStage::Created,
            lead_count,
            filter_snapshot: draft.filter_snapshot,
            created_by: draft.created_by,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Reconstructs a campaign from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedCampaignData) -> Self {
        Self {
            id: data.id,
            name: data.name,
            organization_id: data.organization_id,
            script_id: data.script_id,
            provider_group_id: data.provider_group_id,
            stage: data.stage,
            lead_count: data.lead_count,
            filter_snapshot: data.filter_snapshot,
            created_by: data.created_by,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the campaign identifier.
    #[must_use]
    pub const fn id(&self) -> CampaignId {
        self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owning organization.
    #[must_use]
    pub const fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    /// Returns the provider script identifier.
    #[must_use]
    pub const fn script_id(&self) -> &ScriptId {
        &self.script_id
    }

    /// Returns the provider job group, once calling has started.
    #[must_use]
    pub const fn provider_group_id(&self) -> Option<&ProviderGroupId> {
        self.provider_group_id.as_ref()
    }

    /// Returns the current stage.
    #[must_use]
    pub const fn stage(&self) -> CampaignStage {
        self.stage
    }

    /// Returns the number of leads selected for the campaign.
    #[must_use]
    pub const fn lead_count(&self) -> u32 {
        self.lead_count
    }

    /// Returns the lead filter snapshot.
    #[must_use]
    pub const fn filter_snapshot(&self) -> &Value {
        &self.filter_snapshot
    }

    /// Returns the creator.
    #[must_use]
    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest modification timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Records the provider job group and moves the campaign to `calling`.
    ///
    /// # Errors
    ///
    /// Returns [`CampaignDomainError::InvalidStageTransition`] unless the
    /// campaign is still in the `created` stage.
    pub fn start_calling(
        &mut self,
        group_id: ProviderGroupId,
        clock: &impl Clock,
    ) -> Result<(), CampaignDomainError> {
        self.transition_to(CampaignStage::Calling, clock)?;
        self.provider_group_id = Some(group_id);
        Ok(())
    }

    /// Moves the campaign to `target`, validating the transition.
    ///
    /// # Errors
    ///
    /// Returns [`CampaignDomainError::InvalidStageTransition`] when the
    /// stage machine does not permit the change.
    pub fn transition_to(
        &mut self,
        target: CampaignStage,
        clock: &impl Clock,
    ) -> Result<(), CampaignDomainError> {
        if !self.stage.can_transition_to(target) {
            return Err(CampaignDomainError::InvalidStageTransition {
                campaign_id: self.id,
                from: self.stage,
                to: target,
            });
        }
        self.stage = target;
        self.updated_at = clock.utc();
        Ok(())
    }

    /// Stores a stage decided elsewhere, as a compare-and-set write does.
    pub(crate) const fn record_stage(&mut self, stage: CampaignStage, at: DateTime<Utc>) {
        self.stage = stage;
        self.updated_at = at;
    }

    /// Stores a job group recorded by a guarded store write.
    pub(crate) fn record_group(&mut self, group_id: ProviderGroupId, at: DateTime<Utc>) {
        self.provider_group_id = Some(group_id);
        self.updated_at = at;
    }
}
