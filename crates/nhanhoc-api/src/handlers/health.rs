use std::sync::Arc;

use axum::{Json, extract::State};

use crate::{router::AppState, types::HealthResponse};

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        operations: state.registry.names(),
        active_jobs: state.runner.active_jobs(),
    })
}
