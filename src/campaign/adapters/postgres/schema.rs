//! Diesel schema for campaign persistence.

diesel::table! {
    /// Outbound-calling campaigns.
    campaigns (id) {
        /// Campaign identifier.
        id -> Uuid,
        /// Display name.
        #[max_length = 255]
        name -> Varchar,
        /// Owning organization.
        organization_id -> Uuid,
        /// Provider script identifier.
        #[max_length = 255]
        script_id -> Varchar,
        /// Provider job group, set once calling starts.
        #[max_length = 255]
        provider_group_id -> Nullable<Varchar>,
        /// Lifecycle stage.
        #[max_length = 50]
        stage -> Varchar,
        /// Number of selected leads.
        lead_count -> Int4,
        /// Lead filter snapshot.
        filter_snapshot -> Jsonb,
        /// Creator.
        #[max_length = 255]
        created_by -> Varchar,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// One row per lead selected into a campaign.
    call_assignments (id) {
        /// Assignment identifier.
        id -> Uuid,
        /// Owning campaign.
        campaign_id -> Uuid,
        /// Lead identifier.
        lead_id -> Uuid,
        /// Normalized phone number.
        #[max_length = 32]
        phone -> Varchar,
        /// Greeting name.
        #[max_length = 255]
        display_name -> Varchar,
        /// Provider correlation tag.
        #[max_length = 64]
        reference_tag -> Varchar,
        /// Bound provider job.
        #[max_length = 255]
        provider_job_id -> Nullable<Varchar>,
        /// Provider task of the latest attempt.
        #[max_length = 255]
        provider_task_id -> Nullable<Varchar>,
        /// Terminal provider job state.
        #[max_length = 50]
        call_status -> Nullable<Varchar>,
        /// Planned dial time.
        planned_call_at -> Nullable<Timestamptz>,
        /// Actual dial time.
        actual_call_at -> Nullable<Timestamptz>,
        /// Number dialled from.
        #[max_length = 64]
        calling_number -> Nullable<Varchar>,
        /// Conversation transcript.
        transcript -> Nullable<Jsonb>,
        /// Bound follow-up note.
        follow_up_id -> Nullable<Uuid>,
        /// Interest verdict.
        #[max_length = 50]
        interest -> Nullable<Varchar>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Follow-up notes, at most one per assignment.
    followup_notes (id) {
        /// Note identifier.
        id -> Uuid,
        /// Lead identifier.
        lead_id -> Uuid,
        /// Source assignment (unique).
        assignment_id -> Uuid,
        /// Free-text remark.
        remark -> Text,
        /// Interest verdict.
        #[max_length = 50]
        interest -> Varchar,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// First follow-up timestamp.
        first_follow_up_at -> Timestamptz,
        /// Most recent follow-up timestamp.
        latest_follow_up_at -> Timestamptz,
        /// Scheduled next contact.
        next_follow_up_at -> Timestamptz,
    }
}

diesel::table! {
    /// Per-campaign poll-run flags.
    poll_runs (campaign_id) {
        /// Campaign identifier.
        campaign_id -> Uuid,
        /// Whether a pass holds the flag.
        processing -> Bool,
        /// When the flag was last taken.
        started_at -> Nullable<Timestamptz>,
        /// When the flag was last released.
        last_checked_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(call_assignments -> campaigns (campaign_id));
diesel::allow_tables_to_appear_in_same_query!(campaigns, call_assignments, followup_notes, poll_runs);
