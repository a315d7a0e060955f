//! `PostgreSQL` implementation of the campaign store ports.

use super::{
    models::{AssignmentRow, CampaignRow, FollowUpRow, PollRunRow, StageCountsRow},
    schema::{call_assignments, campaigns, followup_notes, poll_runs},
};
use crate::campaign::{
    domain::{
        AssignmentId, CallAssignment, Campaign, CampaignId, CampaignStage, FollowUpId,
        FollowUpNote, InterestVerdict, LeadId, OrganizationId, OutcomeUpdate,
        PersistedAssignmentData, PersistedCampaignData, PersistedFollowUpData, PhoneNumber,
        PollRun, ReferenceTag, StageCounts, Transcript,
    },
    ports::{
        AssignmentRepository, BindOutcome, CampaignRepository, FollowUpRepository,
        PollRunRepository, StoreError, StoreResult,
    },
};
use crate::provider::domain::{
    ProviderGroupId, ProviderJobId, ProviderJobState, ProviderTaskId, ScriptId,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{Array, Jsonb, Text, Timestamptz, Uuid as SqlUuid};
use serde_json::{Value, json};

/// `PostgreSQL` connection pool type used by the campaign store.
pub type CampaignPgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed campaign store.
#[derive(Debug, Clone)]
pub struct PostgresCampaignStore {
    pool: CampaignPgPool,
}

impl PostgresCampaignStore {
    /// Creates a store from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: CampaignPgPool) -> Self {
        Self { pool }
    }

    /// Builds a pool for `database_url` and wraps it in a store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the pool cannot be built.
    pub fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(max_connections)
            .build(manager)
            .map_err(StoreError::persistence)?;
        Ok(Self::new(pool))
    }

    async fn run_blocking<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(StoreError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(StoreError::persistence)?
    }
}

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

/// Transaction outcome that forces a rollback when the guarded write lost.
enum FollowUpTxError {
    Lost,
    Store(StoreError),
}

impl From<DieselError> for FollowUpTxError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => Self::Lost,
            other => Self::Store(StoreError::persistence(other)),
        }
    }
}

const TERMINAL_STATES: [ProviderJobState; 3] = [
    ProviderJobState::Succeeded,
    ProviderJobState::Failed,
    ProviderJobState::Cancelled,
];

fn terminal_state_names() -> Vec<String> {
    TERMINAL_STATES
        .iter()
        .map(|state| state.as_str().to_owned())
        .collect()
}

fn to_i64(value: usize) -> StoreResult<i64> {
    i64::try_from(value).map_err(StoreError::persistence)
}

fn to_u64(value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(StoreError::persistence)
}

#[async_trait]
impl CampaignRepository for PostgresCampaignStore {
    async fn store_campaign(&self, campaign: &Campaign) -> StoreResult<()> {
        let campaign_id = campaign.id();
        let row = to_campaign_row(campaign)?;
        self.run_blocking(move |connection| {
            diesel::insert_into(campaigns::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        StoreError::DuplicateCampaign(campaign_id)
                    }
                    _ => StoreError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn find_campaign(&self, id: CampaignId) -> StoreResult<Option<Campaign>> {
        self.run_blocking(move |connection| {
            let row = campaigns::table
                .filter(campaigns::id.eq(id.into_inner()))
                .select(CampaignRow::as_select())
                .first::<CampaignRow>(connection)
                .optional()?;
            row.map(row_to_campaign).transpose()
        })
        .await
    }

    async fn update_campaign(&self, campaign: &Campaign) -> StoreResult<()> {
        let campaign_id = campaign.id();
        let row = to_campaign_row(campaign)?;
        self.run_blocking(move |connection| {
            let updated = diesel::update(campaigns::table.filter(campaigns::id.eq(row.id)))
                .set((
                    campaigns::name.eq(&row.name),
                    campaigns::provider_group_id.eq(&row.provider_group_id),
                    campaigns::stage.eq(&row.stage),
                    campaigns::lead_count.eq(row.lead_count),
                    campaigns::updated_at.eq(row.updated_at),
                ))
                .execute(connection)?;
            if updated == 0 {
                return Err(StoreError::CampaignNotFound(campaign_id));
            }
            Ok(())
        })
        .await
    }

    async fn compare_and_set_stage(
        &self,
        id: CampaignId,
        expected: CampaignStage,
        next: CampaignStage,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                campaigns::table
                    .filter(campaigns::id.eq(id.into_inner()))
                    .filter(campaigns::stage.eq(expected.as_str())),
            )
            .set((
                campaigns::stage.eq(next.as_str()),
                campaigns::updated_at.eq(at),
            ))
            .execute(connection)?;
            if updated > 0 {
                return Ok(true);
            }
            let exists: i64 = campaigns::table
                .filter(campaigns::id.eq(id.into_inner()))
                .count()
                .get_result(connection)?;
            if exists == 0 {
                return Err(StoreError::CampaignNotFound(id));
            }
            Ok(false)
        })
        .await
    }

    async fn attach_provider_group(
        &self,
        id: CampaignId,
        group_id: &ProviderGroupId,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let group = group_id.as_str().to_owned();
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                campaigns::table
                    .filter(campaigns::id.eq(id.into_inner()))
                    .filter(campaigns::stage.eq(CampaignStage::Calling.as_str()))
                    .filter(
                        campaigns::provider_group_id
                            .is_null()
                            .or(campaigns::provider_group_id.eq(&group)),
                    ),
            )
            .set((
                campaigns::provider_group_id.eq(&group),
                campaigns::updated_at.eq(at),
            ))
            .execute(connection)?;
            if updated > 0 {
                return Ok(true);
            }
            let exists: i64 = campaigns::table
                .filter(campaigns::id.eq(id.into_inner()))
                .count()
                .get_result(connection)?;
            if exists == 0 {
                return Err(StoreError::CampaignNotFound(id));
            }
            Ok(false)
        })
        .await
    }

    async fn list_by_stage(&self, stage: CampaignStage) -> StoreResult<Vec<Campaign>> {
        self.run_blocking(move |connection| {
            campaigns::table
                .filter(campaigns::stage.eq(stage.as_str()))
                .order(campaigns::created_at.asc())
                .select(CampaignRow::as_select())
                .load::<CampaignRow>(connection)?
                .into_iter()
                .map(row_to_campaign)
                .collect()
        })
        .await
    }

    async fn list_by_organization(
        &self,
        organization_id: OrganizationId,
    ) -> StoreResult<Vec<Campaign>> {
        self.run_blocking(move |connection| {
            campaigns::table
                .filter(campaigns::organization_id.eq(organization_id.into_inner()))
                .filter(campaigns::stage.ne(CampaignStage::Deleted.as_str()))
                .order(campaigns::created_at.asc())
                .select(CampaignRow::as_select())
                .load::<CampaignRow>(connection)?
                .into_iter()
                .map(row_to_campaign)
                .collect()
        })
        .await
    }
}

#[async_trait]
impl AssignmentRepository for PostgresCampaignStore {
    async fn store_assignments(&self, assignments: &[CallAssignment]) -> StoreResult<()> {
        if assignments.is_empty() {
            return Ok(());
        }
        let rows: Vec<AssignmentRow> = assignments.iter().map(to_assignment_row).collect();
        let first_id = assignments.first().map(CallAssignment::id);
        self.run_blocking(move |connection| {
            diesel::insert_into(call_assignments::table)
                .values(&rows)
                .execute(connection)
                .map_err(|err| match (err, first_id) {
                    (
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _),
                        Some(id),
                    ) => StoreError::DuplicateAssignment(id),
                    (other, _) => StoreError::persistence(other),
                })?;
            Ok(())
        })
        .await
    }

    async fn find_assignment(&self, id: AssignmentId) -> StoreResult<Option<CallAssignment>> {
        self.run_blocking(move |connection| {
            let row = call_assignments::table
                .filter(call_assignments::id.eq(id.into_inner()))
                .select(AssignmentRow::as_select())
                .first::<AssignmentRow>(connection)
                .optional()?;
            row.map(row_to_assignment).transpose()
        })
        .await
    }

    async fn list_for_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> StoreResult<Vec<CallAssignment>> {
        self.run_blocking(move |connection| {
            call_assignments::table
                .filter(call_assignments::campaign_id.eq(campaign_id.into_inner()))
                .order(call_assignments::id.asc())
                .select(AssignmentRow::as_select())
                .load::<AssignmentRow>(connection)?
                .into_iter()
                .map(row_to_assignment)
                .collect()
        })
        .await
    }

    async fn bind_job_id(
        &self,
        id: AssignmentId,
        job_id: &ProviderJobId,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let job = job_id.as_str().to_owned();
        self.run_blocking(move |connection| {
            let updated = diesel::sql_query(concat!(
                "UPDATE call_assignments SET provider_job_id = $2, updated_at = $3 ",
                "WHERE id = $1 AND provider_job_id IS NULL ",
                "AND NOT EXISTS (SELECT 1 FROM call_assignments WHERE provider_job_id = $2)",
            ))
            .bind::<SqlUuid, _>(id.into_inner())
            .bind::<Text, _>(job)
            .bind::<Timestamptz, _>(at)
            .execute(connection)?;
            if updated > 0 {
                return Ok(true);
            }
            let exists: i64 = call_assignments::table
                .filter(call_assignments::id.eq(id.into_inner()))
                .count()
                .get_result(connection)?;
            if exists == 0 {
                return Err(StoreError::AssignmentNotFound(id));
            }
            Ok(false)
        })
        .await
    }

    async fn pending_outcome_page(
        &self,
        campaign_id: CampaignId,
        after: Option<AssignmentId>,
        limit: usize,
    ) -> StoreResult<Vec<CallAssignment>> {
        let limit_rows = to_i64(limit)?;
        self.run_blocking(move |connection| {
            let mut query = call_assignments::table
                .filter(call_assignments::campaign_id.eq(campaign_id.into_inner()))
                .filter(call_assignments::provider_job_id.is_not_null())
                .filter(
                    call_assignments::call_status
                        .is_null()
                        .or(call_assignments::transcript.is_null()),
                )
                .into_boxed();
            if let Some(cursor) = after {
                query = query.filter(call_assignments::id.gt(cursor.into_inner()));
            }
            query
                .order(call_assignments::id.asc())
                .limit(limit_rows)
                .select(AssignmentRow::as_select())
                .load::<AssignmentRow>(connection)?
                .into_iter()
                .map(row_to_assignment)
                .collect()
        })
        .await
    }

    async fn apply_outcomes(&self, updates: &[OutcomeUpdate]) -> StoreResult<usize> {
        if updates.is_empty() {
            return Ok(0);
        }
        let payload = outcome_payload(updates);
        self.run_blocking(move |connection| {
            let updated = diesel::sql_query(concat!(
                "UPDATE call_assignments AS a SET ",
                "call_status = v.call_status, ",
                "provider_task_id = COALESCE(v.provider_task_id, a.provider_task_id), ",
                "planned_call_at = COALESCE(v.planned_call_at, a.planned_call_at), ",
                "actual_call_at = COALESCE(v.actual_call_at, a.actual_call_at), ",
                "calling_number = v.calling_number, ",
                "transcript = v.transcript, ",
                "updated_at = v.recorded_at ",
                "FROM jsonb_to_recordset($1) AS v(",
                "id UUID, call_status TEXT, provider_task_id TEXT, ",
                "planned_call_at TIMESTAMPTZ, actual_call_at TIMESTAMPTZ, ",
                "calling_number TEXT, transcript JSONB, recorded_at TIMESTAMPTZ) ",
                "WHERE a.id = v.id",
            ))
            .bind::<Jsonb, _>(payload)
            .execute(connection)?;
            Ok(updated)
        })
        .await
    }

    async fn stage_counts(&self, campaign_id: CampaignId) -> StoreResult<StageCounts> {
        let terminal = terminal_state_names();
        self.run_blocking(move |connection| {
            let row = diesel::sql_query(concat!(
                "SELECT COUNT(*) AS total, ",
                "COUNT(provider_job_id) AS bound, ",
                "COUNT(*) FILTER (WHERE provider_job_id IS NOT NULL ",
                "AND call_status = ANY($2)) AS terminal, ",
                "COUNT(*) FILTER (WHERE provider_job_id IS NOT NULL ",
                "AND interest IS NOT NULL) AS with_verdict ",
                "FROM call_assignments WHERE campaign_id = $1",
            ))
            .bind::<SqlUuid, _>(campaign_id.into_inner())
            .bind::<Array<Text>, _>(terminal)
            .get_result::<StageCountsRow>(connection)?;
            Ok(StageCounts {
                total: to_u64(row.total)?,
                bound: to_u64(row.bound)?,
                terminal: to_u64(row.terminal)?,
                with_verdict: to_u64(row.with_verdict)?,
            })
        })
        .await
    }

    async fn list_page(
        &self,
        campaign_id: CampaignId,
        page: u32,
        page_size: u32,
    ) -> StoreResult<(Vec<CallAssignment>, u64)> {
        let size = i64::from(page_size.max(1));
        let offset = i64::from(page.saturating_sub(1)).saturating_mul(size);
        self.run_blocking(move |connection| {
            let total: i64 = call_assignments::table
                .filter(call_assignments::campaign_id.eq(campaign_id.into_inner()))
                .count()
                .get_result(connection)?;
            let rows = call_assignments::table
                .filter(call_assignments::campaign_id.eq(campaign_id.into_inner()))
                .order(call_assignments::id.asc())
                .limit(size)
                .offset(offset)
                .select(AssignmentRow::as_select())
                .load::<AssignmentRow>(connection)?
                .into_iter()
                .map(row_to_assignment)
                .collect::<StoreResult<Vec<_>>>()?;
            Ok((rows, to_u64(total)?))
        })
        .await
    }

    async fn list_needing_follow_up(
        &self,
        campaign_id: CampaignId,
    ) -> StoreResult<Vec<AssignmentId>> {
        let terminal = terminal_state_names();
        self.run_blocking(move |connection| {
            let ids = call_assignments::table
                .filter(call_assignments::campaign_id.eq(campaign_id.into_inner()))
                .filter(call_assignments::call_status.eq_any(terminal))
                .filter(call_assignments::interest.is_null())
                .order(call_assignments::id.asc())
                .select(call_assignments::id)
                .load::<uuid::Uuid>(connection)?;
            Ok(ids.into_iter().map(AssignmentId::from_uuid).collect())
        })
        .await
    }
}

#[async_trait]
impl FollowUpRepository for PostgresCampaignStore {
    async fn find_note(&self, id: FollowUpId) -> StoreResult<Option<FollowUpNote>> {
        self.run_blocking(move |connection| {
            let row = followup_notes::table
                .filter(followup_notes::id.eq(id.into_inner()))
                .select(FollowUpRow::as_select())
                .first::<FollowUpRow>(connection)
                .optional()?;
            row.map(row_to_note).transpose()
        })
        .await
    }

    async fn create_and_bind(&self, note: &FollowUpNote) -> StoreResult<BindOutcome> {
        let row = to_note_row(note);
        let assignment_id = note.assignment_id();
        self.run_blocking(move |connection| {
            let result = connection.transaction::<_, FollowUpTxError, _>(|tx| {
                diesel::insert_into(followup_notes::table)
                    .values(&row)
                    .execute(tx)?;
                let settled = settle_verdict(tx, &row, row.created_at)?;
                if settled == 0 {
                    return Err(FollowUpTxError::Lost);
                }
                Ok(())
            });
            match result {
                Ok(()) => Ok(BindOutcome::Bound),
                Err(FollowUpTxError::Store(err)) => Err(err),
                Err(FollowUpTxError::Lost) => {
                    let exists: i64 = call_assignments::table
                        .filter(call_assignments::id.eq(assignment_id.into_inner()))
                        .count()
                        .get_result(connection)?;
                    if exists == 0 {
                        return Err(StoreError::AssignmentNotFound(assignment_id));
                    }
                    Ok(BindOutcome::AlreadySet)
                }
            }
        })
        .await
    }

    async fn update_and_settle(&self, note: &FollowUpNote) -> StoreResult<BindOutcome> {
        let row = to_note_row(note);
        let note_id = note.id();
        self.run_blocking(move |connection| {
            connection.transaction::<_, StoreError, _>(|tx| {
                let updated =
                    diesel::update(followup_notes::table.filter(followup_notes::id.eq(row.id)))
                        .set((
                            followup_notes::remark.eq(&row.remark),
                            followup_notes::interest.eq(&row.interest),
                            followup_notes::latest_follow_up_at.eq(row.latest_follow_up_at),
                            followup_notes::next_follow_up_at.eq(row.next_follow_up_at),
                        ))
                        .execute(tx)?;
                if updated == 0 {
                    return Err(StoreError::FollowUpNotFound(note_id));
                }
                let settled = settle_verdict(tx, &row, row.latest_follow_up_at)?;
                Ok(if settled > 0 {
                    BindOutcome::Bound
                } else {
                    BindOutcome::AlreadySet
                })
            })
        })
        .await
    }
}

/// Sets the note and verdict on the note's assignment unless a verdict or a
/// different note is already present.
fn settle_verdict(
    connection: &mut PgConnection,
    row: &FollowUpRow,
    at: DateTime<Utc>,
) -> Result<usize, DieselError> {
    diesel::update(
        call_assignments::table
            .filter(call_assignments::id.eq(row.assignment_id))
            .filter(call_assignments::interest.is_null())
            .filter(
                call_assignments::follow_up_id
                    .is_null()
                    .or(call_assignments::follow_up_id.eq(row.id)),
            ),
    )
    .set((
        call_assignments::follow_up_id.eq(row.id),
        call_assignments::interest.eq(&row.interest),
        call_assignments::updated_at.eq(at),
    ))
    .execute(connection)
}

#[async_trait]
impl PollRunRepository for PostgresCampaignStore {
    async fn try_acquire(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> StoreResult<bool> {
        let stale_before = now - stale_after;
        self.run_blocking(move |connection| {
            let taken = diesel::sql_query(concat!(
                "INSERT INTO poll_runs (campaign_id, processing, started_at, last_checked_at) ",
                "VALUES ($1, TRUE, $2, NULL) ",
                "ON CONFLICT (campaign_id) DO UPDATE ",
                "SET processing = TRUE, started_at = EXCLUDED.started_at ",
                "WHERE poll_runs.processing = FALSE ",
                "OR poll_runs.started_at IS NULL ",
                "OR poll_runs.started_at <= $3",
            ))
            .bind::<SqlUuid, _>(campaign_id.into_inner())
            .bind::<Timestamptz, _>(now)
            .bind::<Timestamptz, _>(stale_before)
            .execute(connection)?;
            Ok(taken > 0)
        })
        .await
    }

    async fn release(&self, campaign_id: CampaignId, now: DateTime<Utc>) -> StoreResult<()> {
        self.run_blocking(move |connection| {
            diesel::sql_query(concat!(
                "INSERT INTO poll_runs (campaign_id, processing, started_at, last_checked_at) ",
                "VALUES ($1, FALSE, NULL, $2) ",
                "ON CONFLICT (campaign_id) DO UPDATE ",
                "SET processing = FALSE, last_checked_at = EXCLUDED.last_checked_at",
            ))
            .bind::<SqlUuid, _>(campaign_id.into_inner())
            .bind::<Timestamptz, _>(now)
            .execute(connection)?;
            Ok(())
        })
        .await
    }

    async fn find_poll_run(&self, campaign_id: CampaignId) -> StoreResult<Option<PollRun>> {
        self.run_blocking(move |connection| {
            let row = poll_runs::table
                .filter(poll_runs::campaign_id.eq(campaign_id.into_inner()))
                .select(PollRunRow::as_select())
                .first::<PollRunRow>(connection)
                .optional()?;
            Ok(row.map(|found| PollRun {
                campaign_id: CampaignId::from_uuid(found.campaign_id),
                processing: found.processing,
                started_at: found.started_at,
                last_checked_at: found.last_checked_at,
            }))
        })
        .await
    }
}

fn outcome_payload(updates: &[OutcomeUpdate]) -> Value {
    Value::Array(
        updates
            .iter()
            .map(|update| {
                let outcome = &update.outcome;
                let transcript = (!outcome.transcript.is_empty())
                    .then(|| outcome.transcript.as_value().clone());
                json!({
                    "id": update.assignment_id.into_inner(),
                    "call_status": outcome.state.as_str(),
                    "provider_task_id": outcome.task_id.as_ref().map(ProviderTaskId::as_str),
                    "planned_call_at": outcome.planned_at,
                    "actual_call_at": outcome.actual_at,
                    "calling_number": outcome.calling_number,
                    "transcript": transcript,
                    "recorded_at": update.recorded_at,
                })
            })
            .collect(),
    )
}

fn to_campaign_row(campaign: &Campaign) -> StoreResult<CampaignRow> {
    Ok(CampaignRow {
        id: campaign.id().into_inner(),
        name: campaign.name().to_owned(),
        organization_id: campaign.organization_id().into_inner(),
        script_id: campaign.script_id().as_str().to_owned(),
        provider_group_id: campaign
            .provider_group_id()
            .map(|group| group.as_str().to_owned()),
        stage: campaign.stage().as_str().to_owned(),
        lead_count: i32::try_from(campaign.lead_count()).map_err(StoreError::persistence)?,
        filter_snapshot: campaign.filter_snapshot().clone(),
        created_by: campaign.created_by().to_owned(),
        created_at: campaign.created_at(),
        updated_at: campaign.updated_at(),
    })
}

fn row_to_campaign(row: CampaignRow) -> StoreResult<Campaign> {
    let data = PersistedCampaignData {
        id: CampaignId::from_uuid(row.id),
        name: row.name,
        organization_id: OrganizationId::from_uuid(row.organization_id),
        script_id: ScriptId::new(row.script_id).map_err(StoreError::persistence)?,
        provider_group_id: row
            .provider_group_id
            .map(ProviderGroupId::new)
            .transpose()
            .map_err(StoreError::persistence)?,
        stage: CampaignStage::try_from(row.stage.as_str()).map_err(StoreError::persistence)?,
        lead_count: u32::try_from(row.lead_count).map_err(StoreError::persistence)?,
        filter_snapshot: row.filter_snapshot,
        created_by: row.created_by,
        created_at: row.created_at,
        updated_at: row.updated_at,
    };
    Ok(Campaign::from_persisted(data))
}

fn to_assignment_row(assignment: &CallAssignment) -> AssignmentRow {
    AssignmentRow {
        id: assignment.id().into_inner(),
        campaign_id: assignment.campaign_id().into_inner(),
        lead_id: assignment.lead_id().into_inner(),
        phone: assignment.phone().as_str().to_owned(),
        display_name: assignment.display_name().to_owned(),
        reference_tag: assignment.reference_tag().as_str().to_owned(),
        provider_job_id: assignment
            .provider_job_id()
            .map(|job| job.as_str().to_owned()),
        provider_task_id: assignment
            .provider_task_id()
            .map(|task| task.as_str().to_owned()),
        call_status: assignment.call_status().map(|state| state.as_str().to_owned()),
        planned_call_at: assignment.planned_call_at(),
        actual_call_at: assignment.actual_call_at(),
        calling_number: assignment.calling_number().map(str::to_owned),
        transcript: assignment
            .transcript()
            .map(|transcript| transcript.as_value().clone()),
        follow_up_id: assignment.follow_up_id().map(FollowUpId::into_inner),
        interest: assignment
            .interest()
            .map(|verdict| verdict.as_str().to_owned()),
        created_at: assignment.created_at(),
        updated_at: assignment.updated_at(),
    }
}

fn row_to_assignment(row: AssignmentRow) -> StoreResult<CallAssignment> {
    let data = PersistedAssignmentData {
        id: AssignmentId::from_uuid(row.id),
        campaign_id: CampaignId::from_uuid(row.campaign_id),
        lead_id: LeadId::from_uuid(row.lead_id),
        phone: PhoneNumber::new(row.phone).map_err(StoreError::persistence)?,
        display_name: row.display_name,
        reference_tag: ReferenceTag::from_persisted(row.reference_tag),
        provider_job_id: row
            .provider_job_id
            .map(ProviderJobId::new)
            .transpose()
            .map_err(StoreError::persistence)?,
        provider_task_id: row
            .provider_task_id
            .map(ProviderTaskId::new)
            .transpose()
            .map_err(StoreError::persistence)?,
        call_status: row
            .call_status
            .as_deref()
            .map(ProviderJobState::try_from)
            .transpose()
            .map_err(StoreError::persistence)?,
        planned_call_at: row.planned_call_at,
        actual_call_at: row.actual_call_at,
        calling_number: row.calling_number,
        transcript: row.transcript.map(Transcript::new),
        follow_up_id: row.follow_up_id.map(FollowUpId::from_uuid),
        interest: row
            .interest
            .as_deref()
            .map(InterestVerdict::try_from)
            .transpose()
            .map_err(StoreError::persistence)?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    };
    Ok(CallAssignment::from_persisted(data))
}

fn to_note_row(note: &FollowUpNote) -> FollowUpRow {
    FollowUpRow {
        id: note.id().into_inner(),
        lead_id: note.lead_id().into_inner(),
        assignment_id: note.assignment_id().into_inner(),
        remark: note.remark().to_owned(),
        interest: note.interest().as_str().to_owned(),
        created_at: note.created_at(),
        first_follow_up_at: note.first_follow_up_at(),
        latest_follow_up_at: note.latest_follow_up_at(),
        next_follow_up_at: note.next_follow_up_at(),
    }
}

fn row_to_note(row: FollowUpRow) -> StoreResult<FollowUpNote> {
    let data = PersistedFollowUpData {
        id: FollowUpId::from_uuid(row.id),
        lead_id: LeadId::from_uuid(row.lead_id),
        assignment_id: AssignmentId::from_uuid(row.assignment_id),
        remark: row.remark,
        interest: InterestVerdict::try_from(row.interest.as_str())
            .map_err(StoreError::persistence)?,
        created_at: row.created_at,
        first_follow_up_at: row.first_follow_up_at,
        latest_follow_up_at: row.latest_follow_up_at,
        next_follow_up_at: row.next_follow_up_at,
    };
    Ok(FollowUpNote::from_persisted(data))
}
