//! Reconciliation service tests.


use crate::campaign::{
    domain::{CallAssignment, CallOutcome, CampaignId, OutcomeUpdate, Transcript},
    ports::{AssignmentRepository, CampaignRepository},
    services::CreateCampaignRequest,
};
use crate::provider::{
    domain::{CallStrategy, JobGroupSpec, JobRequest, ProviderJobId, ProviderJobState},
    ports::CallProvider,
};
use crate::test_support::{Workspace, draft, leads};
use chrono::Utc;
use mockable::DefaultClock;
use serde_json::json;

/// Creates a calling campaign whose jobs exist at the provider but are not
/// bound locally.
async fn assigned_but_unbound(workspace: &Workspace, phones: &[&str]) -> CampaignId {
    let (mut campaign, assignments) = workspace
        .lifecycle()
        .create_campaign(CreateCampaignRequest {
            draft: draft("Unbound"),
            leads: leads(phones),
        })
        .await
        .expect("campaign created");
    let spec = JobGroupSpec {
        name: campaign.name().to_owned(),
        description: "identity sync".to_owned(),
        strategy: CallStrategy::default(),
        script_id: campaign.script_id().clone(),
    };
    let group_id = workspace
        .provider
        .create_job_group(&spec)
        .await
        .expect("group created");
    let requests: Vec<JobRequest> = assignments
        .iter()
        .map(|assignment| JobRequest {
            phone: assignment.phone().clone(),
            display_name: assignment.display_name().to_owned(),
            reference_tag: assignment.reference_tag().clone(),
        })
        .collect();
    workspace
        .provider
        .assign_jobs(&group_id, &requests)
        .await
        .expect("jobs assigned");
    campaign
        .start_calling(group_id, &DefaultClock)
        .expect("created campaign starts calling");
    workspace
        .store
        .update_campaign(&campaign)
        .await
        .expect("campaign updated");
    campaign.id()
}

async fn rows(workspace: &Workspace, campaign_id: CampaignId) -> Vec<CallAssignment> {
    workspace
        .store
        .list_for_campaign(campaign_id)
        .await
        .expect("assignments load")
}

fn job_of(row: &CallAssignment) -> ProviderJobId {
    row.provider_job_id().expect("assignment is bound").clone()
}

fn conversation() -> Transcript {
    Transcript::new(json!([
        {"role": "bot", "text": "Hello, this is a courtesy call."},
        {"role": "lead", "text": "Sure, send me the details."}
    ]))
}

/// Writes a call outcome straight into the store.
async fn record_outcome(
    workspace: &Workspace,
    row: &CallAssignment,
    state: ProviderJobState,
    transcript: Transcript,
) {
    workspace
        .store
        .apply_outcomes(&[OutcomeUpdate {
            assignment_id: row.id(),
            outcome: CallOutcome {
                state,
                task_id: None,
                planned_at: None,
                actual_at: None,
                calling_number: Some("0000000".to_owned()),
                transcript,
            },
            recorded_at: Utc::now(),
        }])
        .await
        .expect("outcome applied");
}
