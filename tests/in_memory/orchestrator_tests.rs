//! Poll-run exclusivity, stage gating, sweeps and queue-driven passes.

use std::time::Duration;

use crate::in_memory::helpers::{Stack, stack};
use chrono::Utc;
use eyre::{WrapErr, eyre};
use outcall::campaign::{
    domain::{CampaignId, CampaignStage, Transcript},
    ports::PollRunRepository,
    services::SuspendAction,
};
use outcall::provider::domain::ProviderJobState;
use outcall::scheduler::{
    PassOutcome, PollSchedule, PollTier, PollTrigger, QueueSettings, WorkQueues, WorkUnit,
    schedule_polls,
};
use rstest::rstest;
use tokio_util::sync::CancellationToken;

fn queue_settings() -> QueueSettings {
    QueueSettings {
        workers_per_queue: 2,
        capacity: 16,
        max_attempts: 3,
        retry_delay: Duration::from_millis(10),
    }
}

async fn fail_every_call(stack: &Stack, campaign_id: CampaignId) -> Result<(), eyre::Report> {
    for assignment in stack.assignments(campaign_id).await {
        let job_id = assignment
            .provider_job_id()
            .ok_or_else(|| eyre!("assignment {} is unbound", assignment.id()))?
            .clone();
        stack
            .provider
            .script_outcome(&job_id, ProviderJobState::Failed, Transcript::empty())
            .wrap_err("script outcome")?;
    }
    Ok(())
}

async fn wait_for_stage(
    stack: &Stack,
    campaign_id: CampaignId,
    stage: CampaignStage,
) -> Result<(), eyre::Report> {
    tokio::time::timeout(Duration::from_secs(5), async {
        while stack.stage(campaign_id).await != stage {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .map_err(|_| eyre!("campaign never reached {stage}"))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn held_flag_turns_a_second_pass_away(stack: Stack) -> Result<(), eyre::Report> {
    let campaign_id = stack.calling_campaign(&["5552001"]).await;
    let acquired = stack
        .store
        .try_acquire(campaign_id, Utc::now(), chrono::Duration::minutes(10))
        .await
        .wrap_err("acquire flag")?;
    eyre::ensure!(acquired, "the flag should be free before any pass");

    let outcome = stack
        .orchestrator
        .poll_campaign(campaign_id, PollTrigger::OneShot)
        .await
        .wrap_err("poll while held")?;
    eyre::ensure!(outcome == PassOutcome::Busy, "expected Busy, got {outcome:?}");

    stack
        .store
        .release(campaign_id, Utc::now())
        .await
        .wrap_err("release flag")?;
    let after = stack
        .orchestrator
        .poll_campaign(campaign_id, PollTrigger::OneShot)
        .await
        .wrap_err("poll after release")?;
    eyre::ensure!(
        matches!(after, PassOutcome::Completed(_)),
        "expected the pass to run, got {after:?}"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stale_flag_is_taken_over(stack: Stack) -> Result<(), eyre::Report> {
    let campaign_id = stack.calling_campaign(&["5552101"]).await;
    stack
        .store
        .try_acquire(
            campaign_id,
            Utc::now() - chrono::Duration::minutes(30),
            chrono::Duration::minutes(10),
        )
        .await
        .wrap_err("acquire flag")?;

    let outcome = stack
        .orchestrator
        .poll_campaign(campaign_id, PollTrigger::OneShot)
        .await
        .wrap_err("poll over stale flag")?;

    eyre::ensure!(
        matches!(outcome, PassOutcome::Completed(_)),
        "expected the stale flag to be taken over, got {outcome:?}"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn finished_pass_releases_the_flag(stack: Stack) -> Result<(), eyre::Report> {
    let campaign_id = stack.calling_campaign(&["5552201", "5552202"]).await;

    stack
        .orchestrator
        .poll_campaign(campaign_id, PollTrigger::OneShot)
        .await
        .wrap_err("poll pass")?;

    let run = stack
        .store
        .find_poll_run(campaign_id)
        .await
        .wrap_err("load poll run")?
        .ok_or_else(|| eyre!("no poll-run record written"))?;
    eyre::ensure!(!run.processing, "flag still held after the pass");
    eyre::ensure!(run.started_at.is_some(), "pass start not recorded");
    eyre::ensure!(run.last_checked_at.is_some(), "pass end not recorded");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_pass_still_releases_the_flag(stack: Stack) -> Result<(), eyre::Report> {
    let campaign_id = stack.calling_campaign(&["5552251"]).await;
    stack
        .store
        .fail_next_stage_counts(1)
        .wrap_err("inject count failure")?;

    let failed = stack
        .orchestrator
        .poll_campaign(campaign_id, PollTrigger::OneShot)
        .await;

    eyre::ensure!(failed.is_err(), "expected the pass to fail, got {failed:?}");
    let run = stack
        .store
        .find_poll_run(campaign_id)
        .await
        .wrap_err("load poll run")?
        .ok_or_else(|| eyre!("no poll-run record written"))?;
    eyre::ensure!(!run.processing, "flag still held after a failed pass");
    let retried = stack
        .orchestrator
        .poll_campaign(campaign_id, PollTrigger::OneShot)
        .await
        .wrap_err("poll after failure")?;
    eyre::ensure!(
        matches!(retried, PassOutcome::Completed(_)),
        "expected the next pass to run, got {retried:?}"
    );
    Ok(())
}

#[rstest]
#[case(PollTrigger::OneShot)]
#[case(PollTrigger::Sweep)]
#[tokio::test(flavor = "multi_thread")]
async fn suspended_campaign_is_not_polled(
    stack: Stack,
    #[case] trigger: PollTrigger,
) -> Result<(), eyre::Report> {
    let campaign_id = stack.calling_campaign(&["5552301"]).await;
    stack
        .lifecycle()
        .suspend_resume(campaign_id, SuspendAction::Suspend)
        .await
        .wrap_err("suspend")?;

    let outcome = stack
        .orchestrator
        .poll_campaign(campaign_id, trigger)
        .await
        .wrap_err("poll suspended campaign")?;

    eyre::ensure!(
        outcome == PassOutcome::NotPolled(CampaignStage::Suspended),
        "expected NotPolled(suspended), got {outcome:?}"
    );
    let run = stack
        .store
        .find_poll_run(campaign_id)
        .await
        .wrap_err("load poll run")?;
    eyre::ensure!(run.is_none(), "a skipped campaign should not take the flag");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sweep_covers_calling_and_completed_only(stack: Stack) -> Result<(), eyre::Report> {
    let calling = stack.calling_campaign(&["5552401"]).await;
    let awaiting = stack.calling_campaign(&["5552402"]).await;
    let assignment = stack.assignment_for(awaiting, "5552402").await;
    let job_id = assignment
        .provider_job_id()
        .ok_or_else(|| eyre!("assignment unbound"))?
        .clone();
    stack
        .provider
        .script_outcome(&job_id, ProviderJobState::Succeeded, Transcript::empty())
        .wrap_err("script outcome")?;
    stack
        .orchestrator
        .poll_campaign(awaiting, PollTrigger::OneShot)
        .await
        .wrap_err("settle awaiting campaign")?;
    eyre::ensure!(
        stack.stage(awaiting).await == CampaignStage::Completed,
        "the campaign should wait for its transcript in completed"
    );
    stack
        .lifecycle()
        .create_campaign(stack.request("Not started", &["5552403"]))
        .await
        .wrap_err("create idle campaign")?;

    let report = stack.orchestrator.sweep().await.wrap_err("sweep")?;

    eyre::ensure!(report.campaigns == 2, "swept {} campaigns", report.campaigns);
    eyre::ensure!(report.passes == 2, "ran {} passes", report.passes);
    eyre::ensure!(report.busy == 0 && report.failed == 0, "unexpected {report:?}");
    eyre::ensure!(
        stack.stage(calling).await == CampaignStage::Calling,
        "an unsettled campaign must stay calling"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn queued_poll_unit_drives_the_campaign_forward(stack: Stack) -> Result<(), eyre::Report> {
    let campaign_id = stack.calling_campaign(&["5552501", "5552502"]).await;
    fail_every_call(&stack, campaign_id).await?;
    let queues = WorkQueues::start(&stack.orchestrator, queue_settings(), CancellationToken::new());

    queues
        .submit(WorkUnit::PollStatus(campaign_id))
        .await
        .wrap_err("submit poll")?;
    let reached = wait_for_stage(&stack, campaign_id, CampaignStage::FollowedUp).await;
    queues.shutdown().await;

    reached?;
    eyre::ensure!(stack.note_count() == 2, "wrote {} notes", stack.note_count());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn scheduled_one_shot_polls_run_until_settled(stack: Stack) -> Result<(), eyre::Report> {
    let campaign_id = stack.calling_campaign(&["5552601"]).await;
    fail_every_call(&stack, campaign_id).await?;
    let queues = WorkQueues::start(&stack.orchestrator, queue_settings(), CancellationToken::new());
    let schedule = PollSchedule::new(
        vec![PollTier {
            interval: Duration::from_millis(20),
            until: Duration::from_millis(100),
        }],
        Duration::from_secs(300),
        10,
    );

    schedule_polls(&queues, &schedule, campaign_id);
    let reached = wait_for_stage(&stack, campaign_id, CampaignStage::FollowedUp).await;
    queues.shutdown().await;

    reached?;
    eyre::ensure!(stack.note_count() == 1, "wrote {} notes", stack.note_count());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn attached_queues_take_follow_ups_off_the_pass(stack: Stack) -> Result<(), eyre::Report> {
    let campaign_id = stack.calling_campaign(&["5552701", "5552702"]).await;
    fail_every_call(&stack, campaign_id).await?;
    let queues = WorkQueues::start(&stack.orchestrator, queue_settings(), CancellationToken::new());
    stack.orchestrator.attach_queues(&queues);

    let outcome = stack
        .orchestrator
        .poll_campaign(campaign_id, PollTrigger::OneShot)
        .await
        .wrap_err("poll pass")?;
    let reached = wait_for_stage(&stack, campaign_id, CampaignStage::FollowedUp).await;
    queues.shutdown().await;

    let PassOutcome::Completed(report) = outcome else {
        return Err(eyre!("expected the pass to run, got {outcome:?}"));
    };
    eyre::ensure!(
        report.queued_follow_ups == 2,
        "queued {} follow-ups",
        report.queued_follow_ups
    );
    eyre::ensure!(
        report.follow_ups.created == 0,
        "the pass classified {} calls inline",
        report.follow_ups.created
    );
    reached?;
    eyre::ensure!(stack.note_count() == 2, "wrote {} notes", stack.note_count());
    Ok(())
}
