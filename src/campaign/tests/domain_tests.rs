//! Domain tests for campaigns, assignments and stage evaluation.

use crate::campaign::domain::{
    CallAssignment, CallOutcome, Campaign, CampaignDomainError, CampaignDraft, CampaignId,
    CampaignStage, LeadContact, LeadId, OrganizationId, PhoneNumber, ReferenceTag, StageCounts,
    StageDecision, Transcript, evaluate_stage,
};
use crate::provider::domain::{CallPhase, ProviderGroupId, ProviderJobId, ProviderJobState, ScriptId};
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use serde_json::json;

#[fixture]
fn clock() -> DefaultClock {
    DefaultClock
}

fn draft(name: &str) -> CampaignDraft {
    CampaignDraft {
        name: name.to_owned(),
        organization_id: OrganizationId::new(),
        script_id: ScriptId::new("script-1").expect("valid script id"),
        filter_snapshot: json!({"tag": "spring"}),
        created_by: "operator".to_owned(),
    }
}

fn assignment(clock: &DefaultClock) -> CallAssignment {
    let contact = LeadContact::new(LeadId::new(), "555-0101", "Ada").expect("valid contact");
    let tag = ReferenceTag::derive(CampaignId::new(), OrganizationId::new(), contact.lead_id);
    CallAssignment::new(CampaignId::new(), tag, contact, clock)
}

fn outcome(state: ProviderJobState, transcript: Transcript) -> CallOutcome {
    CallOutcome {
        state,
        task_id: None,
        planned_at: None,
        actual_at: None,
        calling_number: Some("0000000".to_owned()),
        transcript,
    }
}

#[rstest]
fn new_campaign_starts_created_with_trimmed_name(clock: DefaultClock) {
    let campaign = Campaign::new(draft("  Spring leads  "), 3, &clock).expect("valid campaign");

    assert_eq!(campaign.stage(), CampaignStage::Created);
    assert_eq!(campaign.name(), "Spring leads");
    assert_eq!(campaign.lead_count(), 3);
    assert!(campaign.provider_group_id().is_none());
}

#[rstest]
fn blank_campaign_name_is_rejected(clock: DefaultClock) {
    let result = Campaign::new(draft("   "), 1, &clock);

    assert_eq!(result, Err(CampaignDomainError::EmptyCampaignName));
}

#[rstest]
fn start_calling_records_group_and_moves_to_calling(clock: DefaultClock) {
    let mut campaign = Campaign::new(draft("Spring"), 1, &clock).expect("valid campaign");
    let group_id = ProviderGroupId::new("group-1").expect("valid group id");

    campaign
        .start_calling(group_id.clone(), &clock)
        .expect("created campaigns may start calling");

    assert_eq!(campaign.stage(), CampaignStage::Calling);
    assert_eq!(campaign.provider_group_id(), Some(&group_id));
}

#[rstest]
#[case(CampaignStage::Created, CampaignStage::Calling, true)]
#[case(CampaignStage::Calling, CampaignStage::Suspended, true)]
#[case(CampaignStage::Suspended, CampaignStage::Calling, true)]
#[case(CampaignStage::Completed, CampaignStage::FollowedUp, true)]
#[case(CampaignStage::FollowedUp, CampaignStage::Calling, true)]
#[case(CampaignStage::Calling, CampaignStage::Deleted, true)]
#[case(CampaignStage::Created, CampaignStage::Completed, false)]
#[case(CampaignStage::Suspended, CampaignStage::Completed, false)]
#[case(CampaignStage::Deleted, CampaignStage::Calling, false)]
fn stage_transitions_follow_the_state_machine(
    #[case] from: CampaignStage,
    #[case] to: CampaignStage,
    #[case] allowed: bool,
) {
    assert_eq!(from.can_transition_to(to), allowed);
}

#[rstest]
#[case("created", CampaignStage::Created)]
#[case("4", CampaignStage::FollowedUp)]
#[case(" Suspended ", CampaignStage::Suspended)]
fn stages_parse_from_names_and_codes(#[case] raw: &str, #[case] expected: CampaignStage) {
    assert_eq!(CampaignStage::try_from(raw), Ok(expected));
}

#[rstest]
#[case("+1 (555) 010-1234", "+15550101234")]
#[case("555.0101", "5550101")]
fn phone_numbers_are_normalized(#[case] raw: &str, #[case] expected: &str) {
    let phone = PhoneNumber::new(raw).expect("valid phone");

    assert_eq!(phone.as_str(), expected);
}

#[rstest]
#[case("12")]
#[case("555-CALL")]
#[case("")]
fn malformed_phone_numbers_are_rejected(#[case] raw: &str) {
    assert!(matches!(
        PhoneNumber::new(raw),
        Err(CampaignDomainError::InvalidPhoneNumber(_))
    ));
}

#[rstest]
fn reference_tags_differ_per_lead() {
    let campaign = CampaignId::new();
    let org = OrganizationId::new();

    assert_ne!(
        ReferenceTag::derive(campaign, org, LeadId::new()),
        ReferenceTag::derive(campaign, org, LeadId::new()),
    );
}

#[rstest]
fn intermediate_outcomes_are_never_worth_persisting(clock: DefaultClock) {
    let fresh = assignment(&clock);

    assert!(!fresh.outcome_differs(&outcome(ProviderJobState::Executing, Transcript::empty())));
    assert!(fresh.outcome_differs(&outcome(ProviderJobState::Failed, Transcript::empty())));
}

#[rstest]
fn applied_outcome_is_not_reapplied(clock: DefaultClock) {
    let mut row = assignment(&clock);
    let transcript = Transcript::new(json!([{"role": "bot", "text": "hello"}]));
    let terminal = outcome(ProviderJobState::Succeeded, transcript);

    row.apply_outcome(terminal.clone(), &clock);

    assert_eq!(row.call_phase(), CallPhase::TerminalSuccess);
    assert!(row.has_transcript());
    assert!(!row.outcome_differs(&terminal));
}

#[rstest]
fn first_job_binding_wins(clock: DefaultClock) {
    let mut row = assignment(&clock);
    let first = ProviderJobId::new("job-1").expect("valid job id");
    let second = ProviderJobId::new("job-2").expect("valid job id");

    assert!(row.bind_job(first.clone(), &clock));
    assert!(!row.bind_job(second, &clock));
    assert_eq!(row.provider_job_id(), Some(&first));
}

#[rstest]
#[case(StageCounts { total: 3, bound: 3, terminal: 2, with_verdict: 0 }, CampaignStage::Calling, None)]
#[case(StageCounts { total: 3, bound: 3, terminal: 3, with_verdict: 0 }, CampaignStage::Calling, Some(CampaignStage::Completed))]
#[case(StageCounts { total: 3, bound: 3, terminal: 3, with_verdict: 3 }, CampaignStage::Completed, Some(CampaignStage::FollowedUp))]
#[case(StageCounts { total: 3, bound: 2, terminal: 2, with_verdict: 2 }, CampaignStage::Calling, None)]
#[case(StageCounts { total: 0, bound: 0, terminal: 0, with_verdict: 0 }, CampaignStage::Calling, None)]
#[case(StageCounts { total: 3, bound: 3, terminal: 2, with_verdict: 2 }, CampaignStage::FollowedUp, Some(CampaignStage::Calling))]
#[case(StageCounts { total: 3, bound: 3, terminal: 3, with_verdict: 3 }, CampaignStage::Suspended, None)]
fn stage_evaluation_moves_only_when_counts_allow(
    #[case] counts: StageCounts,
    #[case] current: CampaignStage,
    #[case] target: Option<CampaignStage>,
) {
    let expected = target.map_or(StageDecision::Unchanged { stage: current }, |to| {
        StageDecision::Transition { from: current, to }
    });

    assert_eq!(evaluate_stage(current, counts), expected);
}
