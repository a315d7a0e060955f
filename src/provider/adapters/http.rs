//! HTTP adapter for a REST voice-bot provider.
//!
//! The provider answers every call with a `{code, message, data}` envelope.
//! Field names differ between provider API versions (`jobId` vs `JobId`);
//! serde aliases absorb that once here and [`normalize_job`] produces the
//! canonical [`ProviderJob`].

use crate::campaign::domain::{PhoneNumber, Transcript};
use crate::config::ProviderConfig;
use crate::provider::{
    domain::{
        CallAttempt, CallStrategy, JobGroupSpec, JobPage, JobRequest, MAX_JOB_BATCH,
        ProviderGroupId, ProviderJob, ProviderJobId, ProviderJobState, ProviderTaskId,
    },
    ports::{CallProvider, ProviderError, ProviderResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const SUCCESS_CODES: [&str; 3] = ["OK", "200", "SUCCESS"];
const NO_ASSIGNABLE_JOBS: &str = "NOASSIGNABLEJOBS";
const NO_VALID_JOB_IDS: &str = "NOVALIDJOBIDS";

/// REST call provider client.
#[derive(Debug, Clone)]
pub struct HttpCallProvider {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpCallProvider {
    /// Creates a client from provider configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transport`] when the HTTP client cannot be
    /// built (for example, TLS backend initialization failure).
    pub fn from_config(config: &ProviderConfig) -> ProviderResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProviderError::transport)?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
            timeout,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send<T>(&self, request: reqwest::RequestBuilder) -> ProviderResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| self.map_reqwest_error(err))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::transport(std::io::Error::other(format!(
                "provider returned HTTP {status}"
            ))));
        }

        let envelope = response
            .json::<Envelope<T>>()
            .await
            .map_err(|err| self.map_reqwest_error(err))?;
        envelope.into_result()
    }

    fn map_reqwest_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout)
        } else if err.is_decode() {
            ProviderError::MalformedResponse(err.to_string())
        } else {
            ProviderError::transport(err)
        }
    }
}

#[async_trait]
impl CallProvider for HttpCallProvider {
    async fn create_job_group(&self, spec: &JobGroupSpec) -> ProviderResult<ProviderGroupId> {
        let body = CreateGroupBody {
            name: &spec.name,
            description: &spec.description,
            strategy: &spec.strategy,
            script_id: spec.script_id.as_str(),
        };
        let data: CreateGroupData = self
            .send(self.client.post(self.url("/job-groups")).json(&body))
            .await?
            .ok_or_else(|| missing_data("job group"))?;
        ProviderGroupId::new(data.job_group_id)
            .map_err(|err| ProviderError::MalformedResponse(err.to_string()))
    }

    async fn assign_jobs(
        &self,
        group_id: &ProviderGroupId,
        requests: &[JobRequest],
    ) -> ProviderResult<Vec<ProviderJobId>> {
        if requests.is_empty() {
            return Err(ProviderError::NoAssignableJobs);
        }
        let body = AssignJobsBody {
            jobs: requests
                .iter()
                .map(|request| RawJobRequest {
                    phone_number: request.phone.as_str(),
                    display_name: &request.display_name,
                    reference_id: request.reference_tag.as_str(),
                })
                .collect(),
        };
        let path = format!("/job-groups/{}/jobs", group_id.as_str());
        let data: AssignJobsData = self
            .send(self.client.post(self.url(&path)).json(&body))
            .await?
            .ok_or_else(|| missing_data("assigned jobs"))?;
        data.job_ids
            .into_iter()
            .map(|id| {
                ProviderJobId::new(id)
                    .map_err(|err| ProviderError::MalformedResponse(err.to_string()))
            })
            .collect()
    }

    async fn list_jobs_by_group(
        &self,
        group_id: &ProviderGroupId,
        page: u32,
        page_size: u32,
    ) -> ProviderResult<JobPage> {
        let path = format!("/job-groups/{}/jobs", group_id.as_str());
        let request = self
            .client
            .get(self.url(&path))
            .query(&[("pageNumber", page), ("pageSize", page_size)]);
        debug!(group_id = %group_id, page, page_size, "listing provider jobs by group");
        let data: ListByGroupData = self.send(request).await?.unwrap_or_default();
        let (jobs, malformed) = normalize_jobs(data.list);
        Ok(JobPage {
            jobs,
            total_count: data.total_count,
            malformed,
        })
    }

    async fn list_jobs_by_ids(
        &self,
        job_ids: &[ProviderJobId],
    ) -> ProviderResult<Vec<ProviderJob>> {
        if job_ids.is_empty() {
            return Err(ProviderError::NoValidJobIds);
        }
        if job_ids.len() > MAX_JOB_BATCH {
            return Err(ProviderError::Rejected {
                code: "BatchTooLarge".to_owned(),
                message: format!("{} job ids exceed the limit of {MAX_JOB_BATCH}", job_ids.len()),
            });
        }
        let body = BatchGetBody {
            job_ids: job_ids.iter().map(ProviderJobId::as_str).collect(),
        };
        debug!(batch = job_ids.len(), "fetching provider jobs by id");
        let data: BatchGetData = self
            .send(self.client.post(self.url("/jobs/batch-get")).json(&body))
            .await?
            .unwrap_or_default();
        let (jobs, _) = normalize_jobs(data.jobs);
        Ok(jobs)
    }

    async fn suspend(&self, group_id: &ProviderGroupId) -> ProviderResult<()> {
        let path = format!("/job-groups/{}/suspend", group_id.as_str());
        self.send::<Value>(self.client.post(self.url(&path)))
            .await
            .map(|_| ())
    }

    async fn resume(&self, group_id: &ProviderGroupId) -> ProviderResult<()> {
        let path = format!("/job-groups/{}/resume", group_id.as_str());
        self.send::<Value>(self.client.post(self.url(&path)))
            .await
            .map(|_| ())
    }

    async fn fetch_recording_url(
        &self,
        task_id: &ProviderTaskId,
    ) -> ProviderResult<Option<String>> {
        let path = format!("/tasks/{}/recording", task_id.as_str());
        let data: Option<RecordingData> = self.send(self.client.get(self.url(&path))).await?;
        Ok(data
            .and_then(|recording| recording.url)
            .filter(|url| !url.trim().is_empty()))
    }
}

fn missing_data(what: &str) -> ProviderError {
    ProviderError::MalformedResponse(format!("response carried no {what} data"))
}

/// Maps raw jobs and returns them with the number dropped.
///
/// Only a job without a usable id is dropped. By-id lookups need no count:
/// the reconciler sees the bound assignment missing from the response and
/// counts it as a discrepancy.
fn normalize_jobs(raw_jobs: Vec<RawJob>) -> (Vec<ProviderJob>, usize) {
    let mut malformed = 0;
    let jobs = raw_jobs
        .into_iter()
        .filter_map(|raw| match normalize_job(raw) {
            Ok(job) => Some(job),
            Err(reason) => {
                warn!(%reason, "dropping provider job with unexpected shape");
                malformed += 1;
                None
            }
        })
        .collect();
    (jobs, malformed)
}

/// Maps one raw provider job into the canonical shape.
///
/// An unknown status keeps the job as [`ProviderJobState::Unrecognized`]
/// so identity matching can still use its tag and phone.
fn normalize_job(raw: RawJob) -> Result<ProviderJob, String> {
    let job_id = ProviderJobId::new(raw.job_id).map_err(|err| err.to_string())?;
    let state = ProviderJobState::try_from(raw.status.as_str()).unwrap_or_else(|err| {
        warn!(%job_id, error = %err, "provider job has an unknown status");
        ProviderJobState::Unrecognized
    });
    let group_id = raw
        .job_group_id
        .and_then(|id| ProviderGroupId::new(id).ok());

    let contact = raw.contacts.into_iter().next();
    let phone = contact
        .as_ref()
        .and_then(|contact| contact.phone_number.as_deref())
        .and_then(|phone| PhoneNumber::new(phone).ok());
    let reference_tag = raw
        .reference_id
        .or_else(|| contact.and_then(|contact| contact.reference_id));

    let attempts = raw
        .tasks
        .into_iter()
        .map(|task| CallAttempt {
            task_id: task.task_id.and_then(|id| ProviderTaskId::new(id).ok()),
            planned_at: task.planned_time.and_then(DateTime::<Utc>::from_timestamp_millis),
            actual_at: task.actual_time.and_then(DateTime::<Utc>::from_timestamp_millis),
            calling_number: task.calling_number.filter(|number| !number.trim().is_empty()),
            transcript: task.conversation.map_or_else(Transcript::empty, Transcript::new),
        })
        .collect();

    Ok(ProviderJob {
        job_id,
        group_id,
        reference_tag,
        phone,
        state,
        attempts,
    })
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(alias = "Code")]
    code: Value,
    #[serde(default, alias = "Message")]
    message: Option<String>,
    #[serde(default = "Option::default", alias = "Data")]
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_result(self) -> ProviderResult<Option<T>> {
        let code = match &self.code {
            Value::String(text) => text.trim().to_owned(),
            other => other.to_string(),
        };
        let normalized = code.to_ascii_uppercase().replace(['_', '-'], "");
        if SUCCESS_CODES.contains(&normalized.as_str()) {
            return Ok(self.data);
        }
        match normalized.as_str() {
            NO_ASSIGNABLE_JOBS => Err(ProviderError::NoAssignableJobs),
            NO_VALID_JOB_IDS => Err(ProviderError::NoValidJobIds),
            _ => Err(ProviderError::Rejected {
                code,
                message: self.message.unwrap_or_default(),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateGroupBody<'a> {
    name: &'a str,
    description: &'a str,
    strategy: &'a CallStrategy,
    script_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGroupData {
    #[serde(alias = "JobGroupId")]
    job_group_id: String,
}

#[derive(Debug, Serialize)]
struct AssignJobsBody<'a> {
    jobs: Vec<RawJobRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawJobRequest<'a> {
    phone_number: &'a str,
    display_name: &'a str,
    reference_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignJobsData {
    #[serde(alias = "JobIds")]
    job_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListByGroupData {
    #[serde(default, alias = "List", alias = "jobs", alias = "Jobs")]
    list: Vec<RawJob>,
    #[serde(default, alias = "TotalCount")]
    total_count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetBody<'a> {
    job_ids: Vec<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
struct BatchGetData {
    #[serde(default, alias = "Jobs")]
    jobs: Vec<RawJob>,
}

#[derive(Debug, Deserialize)]
struct RecordingData {
    #[serde(default, alias = "Url", alias = "fileUrl")]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawJob {
    #[serde(default, alias = "JobId")]
    job_id: String,
    #[serde(default, alias = "JobGroupId")]
    job_group_id: Option<String>,
    #[serde(default, alias = "ReferenceId")]
    reference_id: Option<String>,
    #[serde(default, alias = "Status")]
    status: String,
    #[serde(default, alias = "Contacts")]
    contacts: Vec<RawContact>,
    #[serde(default, alias = "Tasks")]
    tasks: Vec<RawTask>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContact {
    #[serde(default, alias = "PhoneNumber")]
    phone_number: Option<String>,
    #[serde(default, alias = "ReferenceId")]
    reference_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTask {
    #[serde(default, alias = "TaskId")]
    task_id: Option<String>,
    #[serde(default, alias = "PlannedTime")]
    planned_time: Option<i64>,
    #[serde(default, alias = "ActualTime")]
    actual_time: Option<i64>,
    #[serde(default, alias = "CallingNumber")]
    calling_number: Option<String>,
    #[serde(default, alias = "Conversation")]
    conversation: Option<Value>,
}
