use chrono::{DateTime, Utc};
use nhanhoc_jobs::{JobRecord, JobStatus};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub operations: Vec<String>,
    pub active_jobs: usize,
}

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// Poll view of a job. `result` only appears once the job completed and
/// `error` only once it failed.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<JobRecord> for JobStatusResponse {
    fn from(job: JobRecord) -> Self {
        let result = job.result.filter(|_| job.status == JobStatus::Completed);
        let error = job.error.filter(|_| job.status == JobStatus::Failed);
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            progress_message: job.progress_message,
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
            result,
            error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub operation: String,
    pub jobs: Vec<JobStatusResponse>,
}
