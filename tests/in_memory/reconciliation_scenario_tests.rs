//! End-to-end reconciliation scenarios over several calls.

use crate::in_memory::helpers::{Stack, conversation, stack};
use outcall::campaign::{
    domain::{
        CampaignId, CampaignStage, InterestVerdict, NOT_CONNECTED_REMARK, PhoneNumber, Transcript,
    },
    ports::{AssignmentRepository, CampaignRepository},
};
use outcall::provider::{
    domain::{CallStrategy, JobGroupSpec, JobRequest, ProviderJob, ProviderJobId, ProviderJobState},
    ports::CallProvider,
};
use outcall::scheduler::{PassOutcome, PollTrigger};
use rstest::rstest;

async fn poll(stack: &Stack, campaign_id: CampaignId, trigger: PollTrigger) -> PassOutcome {
    stack
        .orchestrator
        .poll_campaign(campaign_id, trigger)
        .await
        .expect("poll pass runs")
}

async fn script(
    stack: &Stack,
    campaign_id: CampaignId,
    phone: &str,
    state: ProviderJobState,
    transcript: Transcript,
) {
    let assignment = stack.assignment_for(campaign_id, phone).await;
    let job_id = assignment.provider_job_id().expect("assignment is bound").clone();
    stack
        .provider
        .script_outcome(&job_id, state, transcript)
        .expect("outcome scripted");
}

/// Starts calling without binding, then places provider jobs for the
/// phones in `acknowledged` only.
async fn partially_acknowledged(
    stack: &Stack,
    phones: &[&str],
    acknowledged: &[&str],
) -> CampaignId {
    let (mut campaign, assignments) = stack
        .lifecycle()
        .create_campaign(stack.request("Partial", phones))
        .await
        .expect("campaign created");
    let group_id = stack
        .provider
        .create_job_group(&JobGroupSpec {
            name: campaign.name().to_owned(),
            description: "partial acknowledgement".to_owned(),
            strategy: CallStrategy::default(),
            script_id: campaign.script_id().clone(),
        })
        .await
        .expect("group created");
    let requests: Vec<JobRequest> = assignments
        .iter()
        .filter(|assignment| {
            acknowledged
                .iter()
                .any(|phone| PhoneNumber::new(*phone).ok().as_ref() == Some(assignment.phone()))
        })
        .map(|assignment| JobRequest {
            phone: assignment.phone().clone(),
            display_name: assignment.display_name().to_owned(),
            reference_tag: assignment.reference_tag().clone(),
        })
        .collect();
    if !requests.is_empty() {
        stack
            .provider
            .assign_jobs(&group_id, &requests)
            .await
            .expect("jobs assigned");
    }
    campaign
        .start_calling(group_id, &*stack.clock)
        .expect("created campaign starts calling");
    stack
        .store
        .update_campaign(&campaign)
        .await
        .expect("campaign updated");
    campaign.id()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn three_calls_settle_over_two_passes(stack: Stack) {
    let campaign_id = stack
        .calling_campaign(&["5550101", "5550102", "5550103"])
        .await;
    script(
        &stack,
        campaign_id,
        "5550101",
        ProviderJobState::Succeeded,
        Transcript::new(conversation()),
    )
    .await;
    script(&stack, campaign_id, "5550102", ProviderJobState::Failed, Transcript::empty()).await;
    script(&stack, campaign_id, "5550103", ProviderJobState::Executing, Transcript::empty()).await;

    let first = poll(&stack, campaign_id, PollTrigger::OneShot).await;

    let PassOutcome::Completed(report) = first else {
        panic!("expected the first pass to run, got {first:?}");
    };
    assert_eq!(report.reconcile.updated, 2);
    assert!(report.reconcile.needs_more_polling);
    assert_eq!(report.follow_ups.created, 2);
    assert_eq!(stack.stage(campaign_id).await, CampaignStage::Calling);
    let answered = stack.assignment_for(campaign_id, "5550101").await;
    let missed = stack.assignment_for(campaign_id, "5550102").await;
    let ringing = stack.assignment_for(campaign_id, "5550103").await;
    assert_eq!(answered.interest(), Some(InterestVerdict::Interested));
    assert_eq!(missed.interest(), Some(InterestVerdict::Unknown));
    assert_eq!(ringing.interest(), None);
    assert_eq!(ringing.call_status(), None);

    script(&stack, campaign_id, "5550103", ProviderJobState::Cancelled, Transcript::empty()).await;
    poll(&stack, campaign_id, PollTrigger::OneShot).await;

    assert_eq!(stack.stage(campaign_id).await, CampaignStage::FollowedUp);
    assert_eq!(stack.note_count(), 3);
    let notes = stack.store.notes().expect("notes load");
    let not_connected = notes
        .iter()
        .filter(|note| note.remark() == NOT_CONNECTED_REMARK)
        .count();
    assert_eq!(not_connected, 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn calling_campaign_reaches_followed_up_in_one_pass(stack: Stack) {
    let campaign_id = stack.calling_campaign(&["5550201", "5550202"]).await;
    script(&stack, campaign_id, "5550201", ProviderJobState::Failed, Transcript::empty()).await;
    script(
        &stack,
        campaign_id,
        "5550202",
        ProviderJobState::Succeeded,
        Transcript::new(conversation()),
    )
    .await;

    poll(&stack, campaign_id, PollTrigger::OneShot).await;

    assert_eq!(stack.stage(campaign_id).await, CampaignStage::FollowedUp);
    assert_eq!(stack.classifier.prompts().len(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn late_transcript_completes_then_follows_up_through_the_sweep(stack: Stack) {
    let campaign_id = stack.calling_campaign(&["5550301"]).await;
    script(&stack, campaign_id, "5550301", ProviderJobState::Succeeded, Transcript::empty()).await;

    poll(&stack, campaign_id, PollTrigger::OneShot).await;
    assert_eq!(stack.stage(campaign_id).await, CampaignStage::Completed);
    assert_eq!(stack.note_count(), 0);

    let skipped = poll(&stack, campaign_id, PollTrigger::OneShot).await;
    assert_eq!(skipped, PassOutcome::NotPolled(CampaignStage::Completed));

    script(
        &stack,
        campaign_id,
        "5550301",
        ProviderJobState::Succeeded,
        Transcript::new(conversation()),
    )
    .await;
    let sweep = stack.orchestrator.sweep().await.expect("sweep runs");

    assert_eq!(sweep.passes, 1);
    assert_eq!(stack.stage(campaign_id).await, CampaignStage::FollowedUp);
    let settled = stack.assignment_for(campaign_id, "5550301").await;
    assert!(settled.has_transcript());
    assert_eq!(settled.interest(), Some(InterestVerdict::Interested));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unacknowledged_lead_blocks_completion(stack: Stack) {
    let campaign_id = partially_acknowledged(&stack, &["5550401", "5550402"], &["5550401"]).await;

    poll(&stack, campaign_id, PollTrigger::OneShot).await;
    script(&stack, campaign_id, "5550401", ProviderJobState::Failed, Transcript::empty()).await;
    poll(&stack, campaign_id, PollTrigger::OneShot).await;

    assert_eq!(stack.stage(campaign_id).await, CampaignStage::Calling);
    assert_eq!(stack.note_count(), 1);
    let counts = stack
        .store
        .stage_counts(campaign_id)
        .await
        .expect("counts load");
    assert_eq!(counts.total, 2);
    assert_eq!(counts.bound, 1);
    assert_eq!(counts.unbound(), 1);

    let diagnosis = stack.operations().diagnose(campaign_id).await;
    assert!(diagnosis.is_success());
    assert!(diagnosis.message.contains("never acknowledged"));
    let unbound = diagnosis
        .data
        .expect("diagnosis payload")
        .unbound_assignments;
    assert_eq!(unbound.len(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reference_tag_outranks_phone_number(stack: Stack) {
    let campaign_id = partially_acknowledged(&stack, &["5550501", "5550502"], &[]).await;
    let tagged = stack.assignment_for(campaign_id, "5550501").await;
    let group_id = stack
        .store
        .find_campaign(campaign_id)
        .await
        .expect("lookup runs")
        .and_then(|campaign| campaign.provider_group_id().cloned())
        .expect("group recorded");
    let job_id = ProviderJobId::new("crossed-1").expect("valid job id");
    stack
        .provider
        .insert_foreign_job(ProviderJob {
            job_id: job_id.clone(),
            group_id: Some(group_id),
            reference_tag: Some(tagged.reference_tag().as_str().to_owned()),
            phone: Some(PhoneNumber::new("5550502").expect("valid phone")),
            state: ProviderJobState::Scheduling,
            attempts: Vec::new(),
        })
        .expect("job inserted");

    let report = stack
        .orchestrator
        .identity()
        .sync(campaign_id)
        .await
        .expect("sync runs");

    assert_eq!(report.bound, 1);
    let bound = stack.assignment_for(campaign_id, "5550501").await;
    let other = stack.assignment_for(campaign_id, "5550502").await;
    assert_eq!(bound.provider_job_id(), Some(&job_id));
    assert_eq!(other.provider_job_id(), None);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unchanged_provider_state_is_not_rewritten(stack: Stack) {
    let campaign_id = stack.calling_campaign(&["5550601", "5550602"]).await;
    script(&stack, campaign_id, "5550601", ProviderJobState::Executing, Transcript::empty()).await;

    let first = poll(&stack, campaign_id, PollTrigger::OneShot).await;
    let second = poll(&stack, campaign_id, PollTrigger::OneShot).await;

    for outcome in [first, second] {
        let PassOutcome::Completed(report) = outcome else {
            panic!("expected the pass to run, got {outcome:?}");
        };
        assert_eq!(report.reconcile.updated, 0);
        assert!(report.reconcile.needs_more_polling);
    }
    assert_eq!(stack.stage(campaign_id).await, CampaignStage::Calling);
}
