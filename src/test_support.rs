//! Shared fixtures and port mocks for unit tests.

use crate::campaign::{
    adapters::memory::InMemoryCampaignStore,
    domain::{CampaignDraft, CampaignId, LeadId, OrganizationId},
    ports::CampaignRepository,
    services::{CampaignLifecycleService, CreateCampaignRequest, LeadCandidate},
};
use crate::classifier::ports::{Classifier, ClassifierResult};
use crate::provider::{
    adapters::memory::ScriptedCallProvider,
    domain::{
        JobGroupSpec, JobPage, JobRequest, ProviderGroupId, ProviderJob, ProviderJobId,
        ProviderTaskId, ScriptId,
    },
    ports::{CallProvider, ProviderResult},
};
use async_trait::async_trait;
use mockable::DefaultClock;
use mockall::mock;
use serde_json::json;
use std::sync::Arc;

mock! {
    pub(crate) Provider {}

    #[async_trait]
    impl CallProvider for Provider {
        async fn create_job_group(&self, spec: &JobGroupSpec) -> ProviderResult<ProviderGroupId>;
        async fn assign_jobs(
            &self,
            group_id: &ProviderGroupId,
            requests: &[JobRequest],
        ) -> ProviderResult<Vec<ProviderJobId>>;
        async fn list_jobs_by_group(
            &self,
            group_id: &ProviderGroupId,
            page: u32,
            page_size: u32,
        ) -> ProviderResult<JobPage>;
        async fn list_jobs_by_ids(&self, job_ids: &[ProviderJobId]) -> ProviderResult<Vec<ProviderJob>>;
        async fn suspend(&self, group_id: &ProviderGroupId) -> ProviderResult<()>;
        async fn resume(&self, group_id: &ProviderGroupId) -> ProviderResult<()>;
        async fn fetch_recording_url(&self, task_id: &ProviderTaskId) -> ProviderResult<Option<String>>;
    }
}

mock! {
    pub(crate) Llm {}

    #[async_trait]
    impl Classifier for Llm {
        async fn classify(&self, prompt: &str) -> ClassifierResult<String>;
    }
}

/// Scripted provider that yields before every call so joined futures
/// interleave at each provider round-trip.
pub(crate) struct YieldingProvider(pub(crate) Arc<ScriptedCallProvider>);

#[async_trait]
impl CallProvider for YieldingProvider {
    async fn create_job_group(&self, spec: &JobGroupSpec) -> ProviderResult<ProviderGroupId> {
        tokio::task::yield_now().await;
        self.0.create_job_group(spec).await
    }

    async fn assign_jobs(
        &self,
        group_id: &ProviderGroupId,
        requests: &[JobRequest],
    ) -> ProviderResult<Vec<ProviderJobId>> {
        tokio::task::yield_now().await;
        self.0.assign_jobs(group_id, requests).await
    }

    async fn list_jobs_by_group(
        &self,
        group_id: &ProviderGroupId,
        page: u32,
        page_size: u32,
    ) -> ProviderResult<JobPage> {
        tokio::task::yield_now().await;
        self.0.list_jobs_by_group(group_id, page, page_size).await
    }

    async fn list_jobs_by_ids(&self, job_ids: &[ProviderJobId]) -> ProviderResult<Vec<ProviderJob>> {
        tokio::task::yield_now().await;
        self.0.list_jobs_by_ids(job_ids).await
    }

    async fn suspend(&self, group_id: &ProviderGroupId) -> ProviderResult<()> {
        tokio::task::yield_now().await;
        self.0.suspend(group_id).await
    }

    async fn resume(&self, group_id: &ProviderGroupId) -> ProviderResult<()> {
        tokio::task::yield_now().await;
        self.0.resume(group_id).await
    }

    async fn fetch_recording_url(&self, task_id: &ProviderTaskId) -> ProviderResult<Option<String>> {
        tokio::task::yield_now().await;
        self.0.fetch_recording_url(task_id).await
    }
}

/// Builds a draft for a new campaign.
pub(crate) fn draft(name: &str) -> CampaignDraft {
    CampaignDraft {
        name: name.to_owned(),
        organization_id: OrganizationId::new(),
        script_id: ScriptId::new("script-1").expect("valid script id"),
        filter_snapshot: json!({"segment": "spring"}),
        created_by: "operator".to_owned(),
    }
}

/// Builds lead candidates for the given phone numbers.
pub(crate) fn leads(phones: &[&str]) -> Vec<LeadCandidate> {
    phones
        .iter()
        .enumerate()
        .map(|(index, phone)| LeadCandidate {
            lead_id: LeadId::new(),
            phone: (*phone).to_owned(),
            display_name: format!("Lead {index}"),
        })
        .collect()
}

/// In-memory store and scripted provider sharing one clock.
pub(crate) struct Workspace {
    pub(crate) store: Arc<InMemoryCampaignStore>,
    pub(crate) provider: Arc<ScriptedCallProvider>,
    pub(crate) clock: Arc<DefaultClock>,
}

impl Workspace {
    pub(crate) fn new() -> Self {
        Self {
            store: Arc::new(InMemoryCampaignStore::new()),
            provider: Arc::new(ScriptedCallProvider::new()),
            clock: Arc::new(DefaultClock),
        }
    }

    pub(crate) fn lifecycle(
        &self,
    ) -> CampaignLifecycleService<InMemoryCampaignStore, ScriptedCallProvider, DefaultClock> {
        CampaignLifecycleService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.provider),
            Arc::clone(&self.clock),
        )
    }

    /// Lifecycle service whose provider calls yield to other futures.
    pub(crate) fn yielding_lifecycle(
        &self,
    ) -> CampaignLifecycleService<InMemoryCampaignStore, YieldingProvider, DefaultClock> {
        CampaignLifecycleService::new(
            Arc::clone(&self.store),
            Arc::new(YieldingProvider(Arc::clone(&self.provider))),
            Arc::clone(&self.clock),
        )
    }

    /// Creates a campaign with one lead per phone and starts calling.
    pub(crate) async fn calling_campaign(&self, phones: &[&str]) -> CampaignId {
        let lifecycle = self.lifecycle();
        let (campaign, _) = lifecycle
            .create_campaign(CreateCampaignRequest {
                draft: draft("Spring outreach"),
                leads: leads(phones),
            })
            .await
            .expect("campaign created");
        lifecycle
            .start_calling(campaign.id())
            .await
            .expect("calling started");
        campaign.id()
    }

    /// Returns the provider group of a campaign that started calling.
    pub(crate) async fn group_of(&self, campaign_id: CampaignId) -> ProviderGroupId {
        self.store
            .find_campaign(campaign_id)
            .await
            .expect("lookup runs")
            .and_then(|campaign| campaign.provider_group_id().cloned())
            .expect("campaign has a job group")
    }
}
