//! Shared wiring for in-memory integration tests.

use std::sync::Arc;
use std::time::Duration;

use mockable::DefaultClock;
use outcall::api::{CampaignOperations, OrganizationStatsCache};
use outcall::cache::TtlStatsCache;
use outcall::campaign::{
    adapters::InMemoryCampaignStore,
    domain::{CallAssignment, CampaignDraft, CampaignId, CampaignStage, LeadId, OrganizationId},
    ports::{AssignmentRepository, CampaignRepository},
    services::{
        CampaignLifecycleService, CampaignStatsService, CreateCampaignRequest, LeadCandidate,
    },
};
use outcall::classifier::adapters::ScriptedClassifier;
use outcall::provider::{adapters::ScriptedCallProvider, domain::ScriptId};
use outcall::reconcile::{
    FollowUpGenerator, IdentitySync, ReconcileSettings, StatusReconciler,
};
use outcall::retry::RetryPolicy;
use outcall::scheduler::{Orchestrator, OrchestratorParts};
use rstest::fixture;
use serde_json::{Value, json};

/// Orchestrator over the in-memory adapters.
pub type TestOrchestrator =
    Orchestrator<InMemoryCampaignStore, ScriptedCallProvider, ScriptedClassifier, DefaultClock>;

/// Operations facade over the in-memory adapters.
pub type TestOperations = CampaignOperations<
    InMemoryCampaignStore,
    ScriptedCallProvider,
    ScriptedClassifier,
    DefaultClock,
>;

/// Classifier reply for a lead asking to be called back.
pub const INTERESTED_REPLY: &str =
    r#"```json
{"remark": "asked for pricing by email", "interest": "interested", "next_follow_up": "2026-11-02 09:30:00"}
```"#;

/// Every adapter and service wired together.
pub struct Stack {
    /// Campaign store.
    pub store: Arc<InMemoryCampaignStore>,
    /// Scripted call provider.
    pub provider: Arc<ScriptedCallProvider>,
    /// Scripted classifier.
    pub classifier: Arc<ScriptedClassifier>,
    /// Shared clock.
    pub clock: Arc<DefaultClock>,
    /// Poll orchestrator.
    pub orchestrator: Arc<TestOrchestrator>,
    /// Organization the helpers create campaigns for.
    pub organization_id: OrganizationId,
}

/// Provides a fully wired stack whose classifier always reports interest.
#[fixture]
pub fn stack() -> Stack {
    Stack::new(ScriptedClassifier::always(INTERESTED_REPLY))
}

impl Stack {
    /// Wires the stack around `classifier`.
    #[must_use]
    pub fn new(classifier: ScriptedClassifier) -> Self {
        let store = Arc::new(InMemoryCampaignStore::new());
        let provider = Arc::new(ScriptedCallProvider::new());
        let classifier_handle = Arc::new(classifier);
        let clock = Arc::new(DefaultClock);
        let settings = ReconcileSettings {
            retry: RetryPolicy::new(2, Duration::ZERO),
            parked_retry_delay: Duration::ZERO,
        };
        let parts = OrchestratorParts {
            identity: IdentitySync::new(
                Arc::clone(&store),
                Arc::clone(&provider),
                Arc::clone(&clock),
                RetryPolicy::once(),
                100,
            ),
            status: StatusReconciler::new(
                Arc::clone(&store),
                Arc::clone(&provider),
                Arc::clone(&clock),
                settings,
            ),
            follow_ups: FollowUpGenerator::new(
                Arc::clone(&store),
                Arc::clone(&classifier_handle),
                Arc::clone(&clock),
            ),
            page_size: 100,
            stale_after: chrono::Duration::minutes(10),
        };
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            parts,
        ));
        Self {
            store,
            provider,
            classifier: classifier_handle,
            clock,
            orchestrator,
            organization_id: OrganizationId::new(),
        }
    }

    /// Returns a lifecycle service over the stack's adapters.
    #[must_use]
    pub fn lifecycle(
        &self,
    ) -> CampaignLifecycleService<InMemoryCampaignStore, ScriptedCallProvider, DefaultClock> {
        CampaignLifecycleService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.provider),
            Arc::clone(&self.clock),
        )
    }

    /// Returns an operations facade without work queues.
    #[must_use]
    pub fn operations(&self) -> TestOperations {
        let cache: OrganizationStatsCache<DefaultClock> =
            TtlStatsCache::new(chrono::Duration::minutes(5), Arc::clone(&self.clock));
        CampaignOperations::new(
            Arc::clone(&self.store),
            self.lifecycle(),
            Arc::clone(&self.orchestrator),
            CampaignStatsService::new(Arc::clone(&self.store), Arc::new(cache)),
        )
    }

    /// Builds a creation request for one lead per phone number.
    #[must_use]
    pub fn request(&self, name: &str, phones: &[&str]) -> CreateCampaignRequest {
        CreateCampaignRequest {
            draft: CampaignDraft {
                name: name.to_owned(),
                organization_id: self.organization_id,
                script_id: ScriptId::new("renewal-script").expect("valid script id"),
                filter_snapshot: json!({"segment": "renewals", "region": "north"}),
                created_by: "ops@example.com".to_owned(),
            },
            leads: phones
                .iter()
                .enumerate()
                .map(|(index, phone)| LeadCandidate {
                    lead_id: LeadId::new(),
                    phone: (*phone).to_owned(),
                    display_name: format!("Customer {index}"),
                })
                .collect(),
        }
    }

    /// Creates a campaign and starts calling.
    pub async fn calling_campaign(&self, phones: &[&str]) -> CampaignId {
        let lifecycle = self.lifecycle();
        let (campaign, _) = lifecycle
            .create_campaign(self.request("Renewals", phones))
            .await
            .expect("campaign created");
        lifecycle
            .start_calling(campaign.id())
            .await
            .expect("calling started");
        campaign.id()
    }

    /// Returns the campaign's assignments.
    pub async fn assignments(&self, campaign_id: CampaignId) -> Vec<CallAssignment> {
        self.store
            .list_for_campaign(campaign_id)
            .await
            .expect("assignments load")
    }

    /// Returns the assignment dialling `phone`.
    pub async fn assignment_for(&self, campaign_id: CampaignId, phone: &str) -> CallAssignment {
        self.assignments(campaign_id)
            .await
            .into_iter()
            .find(|assignment| assignment.phone().as_str() == phone)
            .expect("assignment for phone")
    }

    /// Returns the campaign's current stage.
    pub async fn stage(&self, campaign_id: CampaignId) -> CampaignStage {
        self.store
            .find_campaign(campaign_id)
            .await
            .expect("lookup runs")
            .expect("campaign exists")
            .stage()
    }

    /// Returns the number of follow-up notes stored.
    #[must_use]
    pub fn note_count(&self) -> usize {
        self.store.notes().expect("notes load").len()
    }
}

/// Transcript of a connected call.
#[must_use]
pub fn conversation() -> Value {
    json!([
        {"role": "bot", "content": "Hi, your contract renews next month."},
        {"role": "customer", "content": "Can you email me the new pricing?"}
    ])
}
