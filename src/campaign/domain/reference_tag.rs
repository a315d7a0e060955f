//! Deterministic provider correlation tags.

use super::{CampaignId, LeadId, OrganizationId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Correlation key embedded in every provider job request.
///
/// The tag is derived from the campaign, organization and lead so the same
/// inputs always produce the same tag, and jobs can be matched back to their
/// assignment without relying on phone-number uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceTag(String);

impl ReferenceTag {
    const PREFIX: &'static str = "oc";
    const DIGEST_CHARS: usize = 30;

    /// Derives the tag for a lead within a campaign.
    ///
    /// # Examples
    ///
    /// ```
    /// use outcall::campaign::domain::{CampaignId, LeadId, OrganizationId, ReferenceTag};
    ///
    /// let campaign = CampaignId::new();
    /// let org = OrganizationId::new();
    /// let lead = LeadId::new();
    /// assert_eq!(
    ///     ReferenceTag::derive(campaign, org, lead),
    ///     ReferenceTag::derive(campaign, org, lead),
    /// );
    /// ```
    #[must_use]
    pub fn derive(campaign_id: CampaignId, organization_id: OrganizationId, lead_id: LeadId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(campaign_id.into_inner().as_bytes());
        hasher.update(organization_id.into_inner().as_bytes());
        hasher.update(lead_id.into_inner().as_bytes());
        let digest = hasher.finalize();

        let mut tag = String::with_capacity(Self::PREFIX.len() + Self::DIGEST_CHARS);
        tag.push_str(Self::PREFIX);
        for byte in digest.iter().take(Self::DIGEST_CHARS / 2) {
            tag.push_str(&format!("{byte:02x}"));
        }
        Self(tag)
    }

    /// Rehydrates a tag read from storage.
    #[must_use]
    pub const fn from_persisted(value: String) -> Self {
        Self(value)
    }

    /// Returns the tag text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` when a provider-reported tag refers to this tag.
    #[must_use]
    pub fn matches(&self, reported: &str) -> bool {
        let candidate = reported.trim();
        !candidate.is_empty() && candidate == self.0
    }
}

impl fmt::Display for ReferenceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
