//! Lifecycle service tests against the in-memory store and scripted
//! provider.

use std::sync::Arc;

use crate::campaign::{
    adapters::memory::InMemoryCampaignStore,
    domain::{CampaignStage, LeadId, OutcomeUpdate, Transcript},
    ports::{AssignmentRepository, CampaignRepository},
    services::{
        CampaignLifecycleService, CreateCampaignRequest, LeadCandidate, LifecycleError,
        SuspendAction,
    },
};
use crate::provider::{
    domain::{ProviderGroupId, ProviderJobId, ProviderJobState},
    ports::{CallProvider, ProviderError},
};
use crate::test_support::{MockProvider, Workspace, draft, leads};
use chrono::Utc;
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use serde_json::json;

#[fixture]
fn workspace() -> Workspace {
    Workspace::new()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_skips_invalid_and_duplicate_leads(workspace: Workspace) {
    let mut candidates = leads(&["555-0101", "555 0101", "12", "555-0199"]);
    candidates.push(LeadCandidate {
        lead_id: LeadId::new(),
        phone: "555-0150".to_owned(),
        display_name: "   ".to_owned(),
    });

    let (campaign, assignments) = workspace
        .lifecycle()
        .create_campaign(CreateCampaignRequest {
            draft: draft("Dedup"),
            leads: candidates,
        })
        .await
        .expect("campaign created");

    let phones: Vec<&str> = assignments.iter().map(|row| row.phone().as_str()).collect();
    assert_eq!(phones, vec!["5550101", "5550199"]);
    assert_eq!(campaign.lead_count(), 2);
    assert_eq!(campaign.stage(), CampaignStage::Created);
    let stored = workspace
        .store
        .list_for_campaign(campaign.id())
        .await
        .expect("assignments load");
    assert_eq!(stored.len(), 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_without_usable_leads_fails(workspace: Workspace) {
    let result = workspace
        .lifecycle()
        .create_campaign(CreateCampaignRequest {
            draft: draft("Empty"),
            leads: leads(&["12", "abc"]),
        })
        .await;

    assert!(matches!(result, Err(LifecycleError::NoAssignableLeads)));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn start_calling_binds_jobs_and_moves_to_calling(workspace: Workspace) {
    let lifecycle = workspace.lifecycle();
    let (campaign, _) = lifecycle
        .create_campaign(CreateCampaignRequest {
            draft: draft("Start"),
            leads: leads(&["555-0101", "555-0102", "555-0103"]),
        })
        .await
        .expect("campaign created");

    let report = lifecycle
        .start_calling(campaign.id())
        .await
        .expect("calling started");

    assert_eq!(report.assigned, 3);
    assert_eq!(report.bound, 3);
    assert_eq!(report.unbound, 0);
    assert_eq!(report.rejected, 0);
    let stored = workspace
        .store
        .find_campaign(campaign.id())
        .await
        .expect("lookup runs")
        .expect("campaign exists");
    assert_eq!(stored.stage(), CampaignStage::Calling);
    assert_eq!(stored.provider_group_id(), Some(&report.group_id));
    let rows = workspace
        .store
        .list_for_campaign(campaign.id())
        .await
        .expect("assignments load");
    assert!(rows.iter().all(|row| row.provider_job_id().is_some()));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn second_start_is_rejected(workspace: Workspace) {
    let campaign_id = workspace.calling_campaign(&["555-0101"]).await;

    let result = workspace.lifecycle().start_calling(campaign_id).await;

    assert!(matches!(
        result,
        Err(LifecycleError::InvalidStage {
            stage: CampaignStage::Calling,
            ..
        })
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn suspend_and_resume_follow_the_provider(workspace: Workspace) {
    let campaign_id = workspace.calling_campaign(&["555-0101", "555-0102"]).await;
    let group_id = workspace.group_of(campaign_id).await;
    let lifecycle = workspace.lifecycle();

    let suspended = lifecycle
        .suspend_resume(campaign_id, SuspendAction::Suspend)
        .await
        .expect("suspend succeeds");
    assert_eq!(suspended.stage(), CampaignStage::Suspended);
    assert!(workspace.provider.is_suspended(&group_id).expect("group known"));

    let repeated = lifecycle
        .suspend_resume(campaign_id, SuspendAction::Suspend)
        .await;
    assert!(matches!(repeated, Err(LifecycleError::InvalidStage { .. })));

    let resumed = lifecycle
        .suspend_resume(campaign_id, SuspendAction::Resume)
        .await
        .expect("resume succeeds");
    assert_eq!(resumed.stage(), CampaignStage::Calling);
    assert!(!workspace.provider.is_suspended(&group_id).expect("group known"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn delete_pauses_the_group_and_hides_the_campaign(workspace: Workspace) {
    let campaign_id = workspace.calling_campaign(&["555-0101"]).await;
    let group_id = workspace.group_of(campaign_id).await;
    let lifecycle = workspace.lifecycle();

    let deleted = lifecycle
        .delete_campaign(campaign_id)
        .await
        .expect("delete succeeds");

    assert_eq!(deleted.stage(), CampaignStage::Deleted);
    assert!(workspace.provider.is_suspended(&group_id).expect("group known"));
    let again = lifecycle.delete_campaign(campaign_id).await;
    assert!(matches!(again, Err(LifecycleError::InvalidStage { .. })));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn recording_url_resolves_through_the_latest_task(workspace: Workspace) {
    let campaign_id = workspace.calling_campaign(&["555-0101"]).await;
    let rows = workspace
        .store
        .list_for_campaign(campaign_id)
        .await
        .expect("assignments load");
    let row = rows.first().expect("one assignment");
    let lifecycle = workspace.lifecycle();

    let before = lifecycle
        .recording_url(row.id())
        .await
        .expect("lookup succeeds");
    assert_eq!(before, None);

    let job_id = row.provider_job_id().expect("bound at start").clone();
    workspace
        .provider
        .script_outcome(&job_id, ProviderJobState::Succeeded, Transcript::new(json!(["hi"])))
        .expect("outcome scripted");
    let job = workspace
        .provider
        .list_jobs_by_ids(std::slice::from_ref(&job_id))
        .await
        .expect("job listed");
    let outcome = job.first().expect("job returned").outcome();
    let task_id = outcome.task_id.clone().expect("attempt has a task");
    workspace
        .provider
        .add_recording(task_id, "https://recordings.example/1.mp3")
        .expect("recording added");
    workspace
        .store
        .apply_outcomes(&[OutcomeUpdate {
            assignment_id: row.id(),
            outcome,
            recorded_at: Utc::now(),
        }])
        .await
        .expect("outcome applied");

    let after = lifecycle
        .recording_url(row.id())
        .await
        .expect("lookup succeeds");
    assert_eq!(after.as_deref(), Some("https://recordings.example/1.mp3"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn refused_batches_surface_when_nothing_was_assigned(workspace: Workspace) {
    let (campaign, _) = workspace
        .lifecycle()
        .create_campaign(CreateCampaignRequest {
            draft: draft("Refused"),
            leads: leads(&["555-0101"]),
        })
        .await
        .expect("campaign created");
    let mut provider = MockProvider::new();
    provider
        .expect_create_job_group()
        .times(1)
        .returning(|_| Ok(ProviderGroupId::new("group-9").expect("valid group id")));
    provider
        .expect_assign_jobs()
        .times(1)
        .returning(|_, _| Err(ProviderError::NoAssignableJobs));
    let lifecycle: CampaignLifecycleService<InMemoryCampaignStore, MockProvider, DefaultClock> =
        CampaignLifecycleService::new(
            Arc::clone(&workspace.store),
            Arc::new(provider),
            Arc::clone(&workspace.clock),
        );

    let result = lifecycle.start_calling(campaign.id()).await;

    assert!(matches!(
        result,
        Err(LifecycleError::Provider(ProviderError::NoAssignableJobs))
    ));
    let stored = workspace
        .store
        .find_campaign(campaign.id())
        .await
        .expect("lookup runs")
        .expect("campaign exists");
    assert_eq!(stored.stage(), CampaignStage::Created);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn short_id_list_defers_binding_to_identity_sync(workspace: Workspace) {
    let (campaign, _) = workspace
        .lifecycle()
        .create_campaign(CreateCampaignRequest {
            draft: draft("Short"),
            leads: leads(&["555-0101", "555-0102"]),
        })
        .await
        .expect("campaign created");
    let mut provider = MockProvider::new();
    provider
        .expect_create_job_group()
        .returning(|_| Ok(ProviderGroupId::new("group-3").expect("valid group id")));
    provider.expect_assign_jobs().returning(|_, requests| {
        Ok(requests
            .iter()
            .skip(1)
            .map(|_| ProviderJobId::new("job-77").expect("valid job id"))
            .collect())
    });
    let lifecycle = CampaignLifecycleService::new(
        Arc::clone(&workspace.store),
        Arc::new(provider),
        Arc::clone(&workspace.clock),
    );

    let report = lifecycle
        .start_calling(campaign.id())
        .await
        .expect("calling started");

    assert_eq!(report.assigned, 1);
    assert_eq!(report.bound, 0);
    assert_eq!(report.unbound, 2);
    let rows = workspace
        .store
        .list_for_campaign(campaign.id())
        .await
        .expect("assignments load");
    assert!(rows.iter().all(|row| row.provider_job_id().is_none()));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_starts_place_jobs_once(workspace: Workspace) {
    let lifecycle = workspace.yielding_lifecycle();
    let (campaign, _) = lifecycle
        .create_campaign(CreateCampaignRequest {
            draft: draft("Raced start"),
            leads: leads(&["555-0101", "555-0102"]),
        })
        .await
        .expect("campaign created");

    let (first, second) = tokio::join!(
        lifecycle.start_calling(campaign.id()),
        lifecycle.start_calling(campaign.id())
    );

    let (report, rejected) = match (first, second) {
        (Ok(report), Err(err)) | (Err(err), Ok(report)) => (report, err),
        other => panic!("expected exactly one start to win, got {other:?}"),
    };
    assert!(matches!(
        rejected,
        LifecycleError::InvalidStage {
            stage: CampaignStage::Calling,
            ..
        }
    ));
    let groups = workspace.provider.group_ids().expect("groups listed");
    assert_eq!(groups, vec![report.group_id.clone()]);
    let placed = workspace
        .provider
        .jobs_in_group(&report.group_id)
        .expect("group known");
    assert_eq!(placed.len(), 2);
    assert_eq!(workspace.group_of(campaign.id()).await, report.group_id);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn delete_during_start_is_not_undone(workspace: Workspace) {
    let lifecycle = workspace.yielding_lifecycle();
    let (campaign, _) = lifecycle
        .create_campaign(CreateCampaignRequest {
            draft: draft("Raced delete"),
            leads: leads(&["555-0101", "555-0102"]),
        })
        .await
        .expect("campaign created");

    let (started, deleted) = tokio::join!(
        lifecycle.start_calling(campaign.id()),
        lifecycle.delete_campaign(campaign.id())
    );

    let deleted = deleted.expect("delete succeeds");
    assert_eq!(deleted.stage(), CampaignStage::Deleted);
    assert!(matches!(
        started,
        Err(LifecycleError::InvalidStage {
            stage: CampaignStage::Deleted,
            ..
        })
    ));
    let stored = workspace
        .store
        .find_campaign(campaign.id())
        .await
        .expect("lookup runs")
        .expect("campaign exists");
    assert_eq!(stored.stage(), CampaignStage::Deleted);
    for group_id in workspace.provider.group_ids().expect("groups listed") {
        let placed = workspace.provider.jobs_in_group(&group_id).expect("group known");
        assert!(placed.is_empty(), "jobs placed for a deleted campaign");
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn retried_start_reuses_the_job_group(workspace: Workspace) {
    let (campaign, _) = workspace
        .lifecycle()
        .create_campaign(CreateCampaignRequest {
            draft: draft("Retry"),
            leads: leads(&["555-0101"]),
        })
        .await
        .expect("campaign created");
    let mut provider = MockProvider::new();
    provider
        .expect_create_job_group()
        .times(1)
        .returning(|_| Ok(ProviderGroupId::new("group-5").expect("valid group id")));
    let mut calls = 0;
    provider.expect_assign_jobs().times(2).returning(move |_, _| {
        calls += 1;
        if calls == 1 {
            Err(ProviderError::NoAssignableJobs)
        } else {
            Ok(vec![ProviderJobId::new("job-51").expect("valid job id")])
        }
    });
    let lifecycle = CampaignLifecycleService::new(
        Arc::clone(&workspace.store),
        Arc::new(provider),
        Arc::clone(&workspace.clock),
    );

    let first = lifecycle.start_calling(campaign.id()).await;
    let second = lifecycle
        .start_calling(campaign.id())
        .await
        .expect("retry starts calling");

    assert!(matches!(first, Err(LifecycleError::Provider(_))));
    assert_eq!(second.group_id.as_str(), "group-5");
    assert_eq!(second.bound, 1);
    let stored = workspace
        .store
        .find_campaign(campaign.id())
        .await
        .expect("lookup runs")
        .expect("campaign exists");
    assert_eq!(stored.stage(), CampaignStage::Calling);
}
