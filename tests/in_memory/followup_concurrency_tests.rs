//! Exactly-once follow-up notes under overlapping runs.

use std::sync::Arc;

use crate::in_memory::helpers::{Stack, conversation, stack};
use outcall::campaign::domain::{CampaignId, CampaignStage, Transcript};
use outcall::provider::domain::ProviderJobState;
use outcall::reconcile::FollowUpOutcome;
use outcall::scheduler::{PassOutcome, PollTrigger};
use rstest::rstest;
use tokio::task::JoinSet;

async fn finish_all(stack: &Stack, campaign_id: CampaignId) {
    for assignment in stack.assignments(campaign_id).await {
        let job_id = assignment.provider_job_id().expect("bound").clone();
        stack
            .provider
            .script_outcome(
                &job_id,
                ProviderJobState::Succeeded,
                Transcript::new(conversation()),
            )
            .expect("outcome scripted");
    }
    stack
        .orchestrator
        .status()
        .reconcile(campaign_id, 100)
        .await
        .expect("reconcile runs");
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_generation_writes_one_note(stack: Stack) {
    let campaign_id = stack.calling_campaign(&["5551001"]).await;
    finish_all(&stack, campaign_id).await;
    let assignment_id = stack
        .assignments(campaign_id)
        .await
        .first()
        .expect("one assignment")
        .id();

    let mut runs = JoinSet::new();
    for _ in 0..8 {
        let orchestrator = Arc::clone(&stack.orchestrator);
        runs.spawn(async move { orchestrator.follow_ups().generate(assignment_id).await });
    }
    let mut created = 0;
    let mut skipped = 0;
    while let Some(joined) = runs.join_next().await {
        match joined.expect("task joins").expect("generation runs") {
            FollowUpOutcome::Created(_) => created += 1,
            FollowUpOutcome::Skipped(_) => skipped += 1,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(skipped, 7);
    assert_eq!(stack.note_count(), 1);
    assert_eq!(stack.stage(campaign_id).await, CampaignStage::FollowedUp);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_passes_never_duplicate_notes(stack: Stack) {
    let campaign_id = stack
        .calling_campaign(&["5551101", "5551102", "5551103", "5551104"])
        .await;
    for assignment in stack.assignments(campaign_id).await {
        let job_id = assignment.provider_job_id().expect("bound").clone();
        stack
            .provider
            .script_outcome(&job_id, ProviderJobState::Failed, Transcript::empty())
            .expect("outcome scripted");
    }

    let mut passes = JoinSet::new();
    for _ in 0..4 {
        let orchestrator = Arc::clone(&stack.orchestrator);
        passes.spawn(async move {
            orchestrator
                .poll_campaign(campaign_id, PollTrigger::Sweep)
                .await
        });
    }
    let mut completed = 0;
    while let Some(joined) = passes.join_next().await {
        let outcome = joined.expect("task joins").expect("pass runs");
        if matches!(outcome, PassOutcome::Completed(_)) {
            completed += 1;
        }
    }

    assert!(completed >= 1);
    assert_eq!(stack.note_count(), 4);
    assert_eq!(stack.stage(campaign_id).await, CampaignStage::FollowedUp);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn pending_generation_after_settlement_is_a_no_op(stack: Stack) {
    let campaign_id = stack.calling_campaign(&["5551201", "5551202"]).await;
    finish_all(&stack, campaign_id).await;
    let generator = stack.orchestrator.follow_ups();

    let first = generator
        .generate_pending(campaign_id)
        .await
        .expect("generation runs");
    let second = generator
        .generate_pending(campaign_id)
        .await
        .expect("generation runs");

    assert_eq!(first.created, 2);
    assert_eq!(second.created + second.updated + second.skipped + second.deferred, 0);
    assert_eq!(stack.note_count(), 2);
}
