//! Diesel row models for campaign persistence.

use super::schema::{call_assignments, campaigns, followup_notes, poll_runs};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Row for campaign records.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = campaigns)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CampaignRow {
    pub id: uuid::Uuid,
    pub name: String,
    pub organization_id: uuid::Uuid,
    pub script_id: String,
    pub provider_group_id: Option<String>,
    pub stage: String,
    pub lead_count: i32,
    pub filter_snapshot: Value,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row for call assignment records.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = call_assignments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AssignmentRow {
    pub id: uuid::Uuid,
    pub campaign_id: uuid::Uuid,
    pub lead_id: uuid::Uuid,
    pub phone: String,
    pub display_name: String,
    pub reference_tag: String,
    pub provider_job_id: Option<String>,
    pub provider_task_id: Option<String>,
    pub call_status: Option<String>,
    pub planned_call_at: Option<DateTime<Utc>>,
    pub actual_call_at: Option<DateTime<Utc>>,
    pub calling_number: Option<String>,
    pub transcript: Option<Value>,
    pub follow_up_id: Option<uuid::Uuid>,
    pub interest: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row for follow-up note records.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = followup_notes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FollowUpRow {
    pub id: uuid::Uuid,
    pub lead_id: uuid::Uuid,
    pub assignment_id: uuid::Uuid,
    pub remark: String,
    pub interest: String,
    pub created_at: DateTime<Utc>,
    pub first_follow_up_at: DateTime<Utc>,
    pub latest_follow_up_at: DateTime<Utc>,
    pub next_follow_up_at: DateTime<Utc>,
}

/// Row for poll-run flags.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = poll_runs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PollRunRow {
    pub campaign_id: uuid::Uuid,
    pub processing: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Aggregate counts for one campaign.
#[derive(Debug, Clone, Copy, QueryableByName)]
pub struct StageCountsRow {
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub total: i64,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub bound: i64,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub terminal: i64,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub with_verdict: i64,
}
