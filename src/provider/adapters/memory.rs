//! Scripted in-memory call provider for tests and dry runs.
//!
//! Jobs are created on assignment in the `scheduling` state; tests move them
//! forward with [`ScriptedCallProvider::script_outcome`] and inject
//! failures with [`ScriptedCallProvider::fail_next_lookups`].

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use crate::campaign::domain::Transcript;
use crate::provider::{
    domain::{
        CallAttempt, JobGroupSpec, JobPage, JobRequest, MAX_JOB_BATCH, ProviderGroupId,
        ProviderJob, ProviderJobId, ProviderJobState, ProviderTaskId,
    },
    ports::{CallProvider, ProviderError, ProviderResult},
};

/// Thread-safe scripted provider.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCallProvider {
    state: Arc<RwLock<ScriptedState>>,
}

#[derive(Debug, Default)]
struct ScriptedState {
    next_id: u64,
    groups: HashMap<ProviderGroupId, ScriptedGroup>,
    jobs: HashMap<ProviderJobId, ProviderJob>,
    recordings: HashMap<ProviderTaskId, String>,
    lookup_failures: VecDeque<ProviderError>,
    lookup_batches: Vec<usize>,
    hide_reference_tags: bool,
}

#[derive(Debug)]
struct ScriptedGroup {
    spec: JobGroupSpec,
    suspended: bool,
    job_ids: Vec<ProviderJobId>,
}

impl ScriptedState {
    fn allocate(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

fn lock_error(err: impl std::fmt::Display) -> ProviderError {
    ProviderError::transport(std::io::Error::other(err.to_string()))
}

fn identifier(value: String) -> ProviderResult<ProviderJobId> {
    ProviderJobId::new(value).map_err(|err| ProviderError::MalformedResponse(err.to_string()))
}

impl ScriptedCallProvider {
    /// Creates an empty scripted provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops echoing correlation tags so identity falls back to phone
    /// matching.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transport`] when the state lock is poisoned.
    pub fn hide_reference_tags(&self) -> ProviderResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.hide_reference_tags = true;
        for job in state.jobs.values_mut() {
            job.reference_tag = None;
        }
        Ok(())
    }

    /// Moves a job to `job_state` with a single attempt carrying the given
    /// transcript.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NoValidJobIds`] for an unknown job.
    pub fn script_outcome(
        &self,
        job_id: &ProviderJobId,
        job_state: ProviderJobState,
        transcript: Transcript,
    ) -> ProviderResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        let task_id = ProviderTaskId::new(state.allocate("task"))
            .map_err(|err| ProviderError::MalformedResponse(err.to_string()))?;
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or(ProviderError::NoValidJobIds)?;
        job.state = job_state;
        job.attempts = vec![CallAttempt {
            task_id: Some(task_id),
            planned_at: None,
            actual_at: None,
            calling_number: Some("0000000".to_owned()),
            transcript,
        }];
        Ok(())
    }

    /// Registers a job that no local assignment knows about.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Rejected`] when the job names an unknown
    /// group.
    pub fn insert_foreign_job(&self, job: ProviderJob) -> ProviderResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        if let Some(group_id) = job.group_id.clone() {
            let group = state
                .groups
                .get_mut(&group_id)
                .ok_or_else(|| unknown_group(&group_id))?;
            group.job_ids.push(job.job_id.clone());
        }
        state.jobs.insert(job.job_id.clone(), job);
        Ok(())
    }

    /// Registers a recording for a task.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transport`] when the state lock is poisoned.
    pub fn add_recording(&self, task_id: ProviderTaskId, url: &str) -> ProviderResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.recordings.insert(task_id, url.to_owned());
        Ok(())
    }

    /// Queues errors returned by the next batch lookups, one per call.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transport`] when the state lock is poisoned.
    pub fn fail_next_lookups(
        &self,
        failures: impl IntoIterator<Item = ProviderError>,
    ) -> ProviderResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.lookup_failures.extend(failures);
        Ok(())
    }

    /// Returns the size of every batch lookup received so far.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transport`] when the state lock is poisoned.
    pub fn lookup_batches(&self) -> ProviderResult<Vec<usize>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.lookup_batches.clone())
    }

    /// Returns every created group, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transport`] when the lock is poisoned.
    pub fn group_ids(&self) -> ProviderResult<Vec<ProviderGroupId>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.groups.keys().cloned().collect())
    }

    /// Returns the job ids of a group in assignment order.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Rejected`] for an unknown group.
    pub fn jobs_in_group(&self, group_id: &ProviderGroupId) -> ProviderResult<Vec<ProviderJobId>> {
        let state = self.state.read().map_err(lock_error)?;
        state
            .groups
            .get(group_id)
            .map(|group| group.job_ids.clone())
            .ok_or_else(|| unknown_group(group_id))
    }

    /// Returns whether a group is currently suspended.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Rejected`] for an unknown group.
    pub fn is_suspended(&self, group_id: &ProviderGroupId) -> ProviderResult<bool> {
        let state = self.state.read().map_err(lock_error)?;
        state
            .groups
            .get(group_id)
            .map(|group| group.suspended)
            .ok_or_else(|| unknown_group(group_id))
    }

    /// Returns the spec a group was created with.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Rejected`] for an unknown group.
    pub fn group_spec(&self, group_id: &ProviderGroupId) -> ProviderResult<JobGroupSpec> {
        let state = self.state.read().map_err(lock_error)?;
        state
            .groups
            .get(group_id)
            .map(|group| group.spec.clone())
            .ok_or_else(|| unknown_group(group_id))
    }

    fn set_suspended(&self, group_id: &ProviderGroupId, suspended: bool) -> ProviderResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        let group = state
            .groups
            .get_mut(group_id)
            .ok_or_else(|| unknown_group(group_id))?;
        group.suspended = suspended;
        let paused_ids = group.job_ids.clone();
        for job_id in &paused_ids {
            if let Some(job) = state.jobs.get_mut(job_id) {
                job.state = match (suspended, job.state) {
                    (true, ProviderJobState::Scheduling) => ProviderJobState::Paused,
                    (false, ProviderJobState::Paused) => ProviderJobState::Scheduling,
                    (_, current) => current,
                };
            }
        }
        Ok(())
    }
}

fn unknown_group(group_id: &ProviderGroupId) -> ProviderError {
    ProviderError::Rejected {
        code: "GroupNotFound".to_owned(),
        message: format!("unknown job group {group_id}"),
    }
}

#[async_trait]
impl CallProvider for ScriptedCallProvider {
    async fn create_job_group(&self, spec: &JobGroupSpec) -> ProviderResult<ProviderGroupId> {
        let mut state = self.state.write().map_err(lock_error)?;
        let group_id = ProviderGroupId::new(state.allocate("group"))
            .map_err(|err| ProviderError::MalformedResponse(err.to_string()))?;
        state.groups.insert(
            group_id.clone(),
            ScriptedGroup {
                spec: spec.clone(),
                suspended: false,
                job_ids: Vec::new(),
            },
        );
        Ok(group_id)
    }

    async fn assign_jobs(
        &self,
        group_id: &ProviderGroupId,
        requests: &[JobRequest],
    ) -> ProviderResult<Vec<ProviderJobId>> {
        if requests.is_empty() {
            return Err(ProviderError::NoAssignableJobs);
        }
        let mut state = self.state.write().map_err(lock_error)?;
        if !state.groups.contains_key(group_id) {
            return Err(unknown_group(group_id));
        }

        let mut assigned = Vec::with_capacity(requests.len());
        for request in requests {
            let job_id = identifier(state.allocate("job"))?;
            let reference_tag = (!state.hide_reference_tags)
                .then(|| request.reference_tag.as_str().to_owned());
            state.jobs.insert(
                job_id.clone(),
                ProviderJob {
                    job_id: job_id.clone(),
                    group_id: Some(group_id.clone()),
                    reference_tag,
                    phone: Some(request.phone.clone()),
                    state: ProviderJobState::Scheduling,
                    attempts: Vec::new(),
                },
            );
            assigned.push(job_id);
        }
        if let Some(group) = state.groups.get_mut(group_id) {
            group.job_ids.extend(assigned.iter().cloned());
        }
        Ok(assigned)
    }

    async fn list_jobs_by_group(
        &self,
        group_id: &ProviderGroupId,
        page: u32,
        page_size: u32,
    ) -> ProviderResult<JobPage> {
        let state = self.state.read().map_err(lock_error)?;
        let group = state
            .groups
            .get(group_id)
            .ok_or_else(|| unknown_group(group_id))?;
        let size = usize::try_from(page_size.max(1)).unwrap_or(MAX_JOB_BATCH);
        let skip = usize::try_from(page.saturating_sub(1))
            .unwrap_or(usize::MAX)
            .saturating_mul(size);
        let jobs = group
            .job_ids
            .iter()
            .skip(skip)
            .take(size)
            .filter_map(|job_id| state.jobs.get(job_id).cloned())
            .collect();
        Ok(JobPage {
            jobs,
            total_count: u64::try_from(group.job_ids.len()).unwrap_or(u64::MAX),
            malformed: 0,
        })
    }

    async fn list_jobs_by_ids(
        &self,
        job_ids: &[ProviderJobId],
    ) -> ProviderResult<Vec<ProviderJob>> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.lookup_batches.push(job_ids.len());
        if let Some(failure) = state.lookup_failures.pop_front() {
            return Err(failure);
        }
        if job_ids.is_empty() || job_ids.len() > MAX_JOB_BATCH {
            return Err(ProviderError::NoValidJobIds);
        }
        let jobs: Vec<ProviderJob> = job_ids
            .iter()
            .filter_map(|job_id| state.jobs.get(job_id).cloned())
            .collect();
        if jobs.is_empty() {
            return Err(ProviderError::NoValidJobIds);
        }
        Ok(jobs)
    }

    async fn suspend(&self, group_id: &ProviderGroupId) -> ProviderResult<()> {
        self.set_suspended(group_id, true)
    }

    async fn resume(&self, group_id: &ProviderGroupId) -> ProviderResult<()> {
        self.set_suspended(group_id, false)
    }

    async fn fetch_recording_url(
        &self,
        task_id: &ProviderTaskId,
    ) -> ProviderResult<Option<String>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.recordings.get(task_id).cloned())
    }
}
