//! Per-organization campaign statistics served through an injected cache.

use crate::cache::StatsCache;
use crate::campaign::{
    domain::{CampaignStage, OrganizationId, StageCounts},
    ports::{CampaignStore, StoreResult},
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Aggregated statistics for one organization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrganizationStats {
    /// Organization the figures belong to.
    pub organization_id: Option<OrganizationId>,
    /// Campaign count per stage, soft-deleted campaigns excluded.
    pub campaigns_by_stage: BTreeMap<String, u64>,
    /// Assignment counts summed over every campaign.
    pub counts: StageCounts,
}

/// Computes organization statistics, consulting the cache first.
pub struct CampaignStatsService<S, K>
where
    S: CampaignStore,
    K: StatsCache<OrganizationId, OrganizationStats>,
{
    store: Arc<S>,
    cache: Arc<K>,
}

impl<S, K> CampaignStatsService<S, K>
where
    S: CampaignStore,
    K: StatsCache<OrganizationId, OrganizationStats>,
{
    /// Creates a stats service.
    #[must_use]
    pub const fn new(store: Arc<S>, cache: Arc<K>) -> Self {
        Self { store, cache }
    }

    /// Returns the organization's statistics, recomputing on a cache miss.
    ///
    /// # Errors
    ///
    /// Returns the store error when recomputation fails.
    pub async fn organization_stats(
        &self,
        organization_id: OrganizationId,
    ) -> StoreResult<OrganizationStats> {
        if let Some(cached) = self.cache.get(&organization_id) {
            return Ok(cached);
        }

        let campaigns = self.store.list_by_organization(organization_id).await?;
        let mut stats = OrganizationStats {
            organization_id: Some(organization_id),
            ..OrganizationStats::default()
        };
        for campaign in campaigns {
            *stats
                .campaigns_by_stage
                .entry(campaign.stage().as_str().to_owned())
                .or_insert(0) += 1;
            if campaign.stage() != CampaignStage::Created {
                let counts = self.store.stage_counts(campaign.id()).await?;
                stats.counts = stats.counts.merge(counts);
            }
        }

        self.cache.insert(organization_id, stats.clone());
        Ok(stats)
    }

    /// Drops the cached figures for an organization.
    pub fn invalidate(&self, organization_id: OrganizationId) {
        self.cache.invalidate(&organization_id);
    }
}
