//! Envelope responses of the public campaign operations.

use std::time::Duration;

use crate::in_memory::helpers::{Stack, stack};
use outcall::api::ResponseStatus;
use outcall::campaign::{
    domain::{CallAssignment, CampaignId, CampaignStage, Transcript},
    services::SuspendAction,
};
use outcall::provider::{domain::ProviderJobState, ports::ProviderError};
use rstest::rstest;

fn fail_every_call(stack: &Stack, assignments: &[CallAssignment]) {
    for assignment in assignments {
        let job_id = assignment.provider_job_id().expect("bound").clone();
        stack
            .provider
            .script_outcome(&job_id, ProviderJobState::Failed, Transcript::empty())
            .expect("outcome scripted");
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_reports_the_new_campaign(stack: Stack) {
    let response = stack
        .operations()
        .create_campaign(stack.request("Spring renewals", &["5553001", "5553002"]))
        .await;

    assert!(response.is_success());
    assert_eq!(response.code, "OK");
    assert_eq!(response.message, "campaign created");
    let created = response.data.expect("created payload");
    assert_eq!(created.assignments, 2);
    assert_eq!(created.campaign.stage(), CampaignStage::Created);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_without_usable_leads_is_an_error(stack: Stack) {
    let response = stack
        .operations()
        .create_campaign(stack.request("Empty", &["12"]))
        .await;

    assert_eq!(response.status, ResponseStatus::Error);
    assert_eq!(response.code, "NO_ASSIGNABLE_LEADS");
    assert!(response.data.is_none());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn starting_twice_reports_invalid_stage(stack: Stack) {
    let operations = stack.operations();
    let created = operations
        .create_campaign(stack.request("Twice", &["5553101", "5553102"]))
        .await
        .data
        .expect("campaign created");
    let campaign_id = created.campaign.id();

    let first = operations.start_calling(campaign_id).await;
    let second = operations.start_calling(campaign_id).await;

    assert_eq!(first.message, "calling started");
    assert_eq!(first.data.expect("start report").bound, 2);
    assert_eq!(second.code, "INVALID_STAGE");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn query_without_update_shows_stored_state(stack: Stack) {
    let campaign_id = stack.calling_campaign(&["5553201", "5553202"]).await;

    let response = stack
        .operations()
        .query_execution(campaign_id, 1, 20, false)
        .await;

    assert_eq!(response.message, "calls still in progress");
    let page = response.data.expect("page payload");
    assert_eq!(page.total, 2);
    assert_eq!(page.assignments.len(), 2);
    assert_eq!(page.reconcile, None);
    assert_eq!(page.follow_ups, None);
    assert!(stack.provider.lookup_batches().expect("batches").is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn query_with_update_settles_finished_calls(stack: Stack) {
    let campaign_id = stack.calling_campaign(&["5553301", "5553302"]).await;
    fail_every_call(&stack, &stack.assignments(campaign_id).await);

    let response = stack
        .operations()
        .query_execution(campaign_id, 1, 20, true)
        .await;

    assert_eq!(response.message, "all calls on this page are settled");
    let page = response.data.expect("page payload");
    assert_eq!(page.stage, CampaignStage::FollowedUp);
    assert_eq!(page.reconcile.expect("reconcile report").updated, 2);
    assert_eq!(page.follow_ups.expect("inline tally").created, 2);
    assert_eq!(stack.note_count(), 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn provider_outage_falls_back_to_stored_state(stack: Stack) {
    let campaign_id = stack.calling_campaign(&["5553401"]).await;
    fail_every_call(&stack, &stack.assignments(campaign_id).await);
    stack
        .provider
        .fail_next_lookups([
            ProviderError::Timeout(Duration::from_secs(10)),
            ProviderError::Timeout(Duration::from_secs(10)),
        ])
        .expect("failures queued");

    let response = stack
        .operations()
        .query_execution(campaign_id, 1, 20, true)
        .await;

    assert!(response.is_success());
    assert_eq!(response.message, "provider unavailable; showing stored state");
    let page = response.data.expect("page payload");
    assert_eq!(page.stage, CampaignStage::Calling);
    assert_eq!(page.reconcile.expect("reconcile report").errors, 1);
    assert_eq!(stack.note_count(), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_campaign_is_not_found(stack: Stack) {
    let operations = stack.operations();
    let missing = CampaignId::new();

    let query = operations.query_execution(missing, 1, 20, true).await;
    let diagnosis = operations.diagnose(missing).await;
    let start = operations.start_calling(missing).await;

    assert_eq!(query.code, "NOT_FOUND");
    assert_eq!(diagnosis.code, "NOT_FOUND");
    assert_eq!(start.code, "NOT_FOUND");
}

#[rstest]
#[case(0, 0, 1, 1)]
#[case(1, 500, 1, 100)]
#[case(3, 25, 3, 25)]
#[tokio::test(flavor = "multi_thread")]
async fn page_arguments_are_clamped(
    stack: Stack,
    #[case] page: u32,
    #[case] page_size: u32,
    #[case] expected_page: u32,
    #[case] expected_size: u32,
) {
    let campaign_id = stack.calling_campaign(&["5553501"]).await;

    let response = stack
        .operations()
        .query_execution(campaign_id, page, page_size, false)
        .await;

    let listed = response.data.expect("page payload");
    assert_eq!(listed.page, expected_page);
    assert_eq!(listed.page_size, expected_size);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn recording_is_absent_before_any_attempt(stack: Stack) {
    let campaign_id = stack.calling_campaign(&["5553601"]).await;
    let assignment = stack.assignment_for(campaign_id, "5553601").await;

    let response = stack.operations().recording_url(assignment.id()).await;

    assert!(response.is_success());
    assert_eq!(response.message, "no recording yet");
    assert_eq!(response.data, Some(None));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn operator_stage_changes_are_enveloped(stack: Stack) {
    let campaign_id = stack.calling_campaign(&["5553701"]).await;
    let operations = stack.operations();

    let suspended = operations
        .suspend_resume(campaign_id, SuspendAction::Suspend)
        .await;
    let resumed = operations
        .suspend_resume(campaign_id, SuspendAction::Resume)
        .await;
    let resumed_again = operations
        .suspend_resume(campaign_id, SuspendAction::Resume)
        .await;
    let deleted = operations.delete_campaign(campaign_id).await;

    assert_eq!(suspended.message, "campaign suspended");
    assert_eq!(
        suspended.data.expect("campaign").stage(),
        CampaignStage::Suspended
    );
    assert_eq!(resumed.message, "campaign resumed");
    assert_eq!(resumed_again.code, "INVALID_STAGE");
    assert_eq!(deleted.message, "campaign deleted");
    assert_eq!(deleted.data.expect("campaign").stage(), CampaignStage::Deleted);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn organization_stats_count_campaigns_and_calls(stack: Stack) {
    let operations = stack.operations();
    stack.calling_campaign(&["5553801", "5553802"]).await;
    operations
        .create_campaign(stack.request("Later", &["5553803"]))
        .await
        .data
        .expect("campaign created");

    let response = operations.organization_stats(stack.organization_id).await;

    assert_eq!(response.message, "organization statistics");
    let stats = response.data.expect("stats payload");
    assert_eq!(stats.campaigns_by_stage.get("calling"), Some(&1));
    assert_eq!(stats.campaigns_by_stage.get("created"), Some(&1));
    assert_eq!(stats.counts.total, 2);
    assert_eq!(stats.counts.bound, 2);
}
