use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use nhanhoc_common::error::NhanhocError;
use nhanhoc_jobs::JobRecord;
use serde_json::Value;

use crate::{
    handlers::ApiError,
    router::AppState,
    types::{JobListResponse, JobStatusResponse, SubmitJobResponse},
};

pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Path(operation): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), ApiError> {
    let operation = state.registry.get(&operation)?;
    let Json(input) =
        payload.map_err(|err| NhanhocError::InvalidArgument(err.body_text()))?;

    let job = state.runner.submit_operation(operation, input)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            job_id: job.id,
            status: job.status,
        }),
    ))
}

pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path((operation, job_id)): Path<(String, String)>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job = find_job(&state, &operation, &job_id)?;
    Ok(Json(job.into()))
}

pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Path(operation): Path<String>,
) -> Result<Json<JobListResponse>, ApiError> {
    state.registry.get(&operation)?;
    let jobs = state
        .runner
        .list(Some(&operation))
        .into_iter()
        .map(JobStatusResponse::from)
        .collect();
    Ok(Json(JobListResponse { operation, jobs }))
}

pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path((operation, job_id)): Path<(String, String)>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    find_job(&state, &operation, &job_id)?;
    let job = state.runner.cancel(&job_id).await?;
    Ok(Json(job.into()))
}

pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path((operation, job_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    find_job(&state, &operation, &job_id)?;
    state.runner.delete(&job_id)?;
    Ok(StatusCode::NO_CONTENT)
}

// Jobs are scoped to the operation that created them.
fn find_job(state: &AppState, operation: &str, job_id: &str) -> Result<JobRecord, NhanhocError> {
    state
        .runner
        .status(job_id)
        .ok()
        .filter(|job| job.operation == operation)
        .ok_or_else(|| NhanhocError::JobNotFound(job_id.to_string()))
}
