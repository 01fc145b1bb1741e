use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use nhanhoc_jobs::{JobRunner, OperationRegistry};
use tower_http::trace::TraceLayer;

use crate::handlers;

pub struct AppState {
    pub runner: JobRunner,
    pub registry: OperationRegistry,
}

impl AppState {
    pub fn new(runner: JobRunner, registry: OperationRegistry) -> Self {
        Self { runner, registry }
    }
}

pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::health::health))
        .route("/api/{operation}", post(handlers::jobs::submit_job))
        .route("/api/{operation}/jobs", get(handlers::jobs::list_jobs))
        .route(
            "/api/{operation}/status/{job_id}",
            get(handlers::jobs::job_status).delete(handlers::jobs::delete_job),
        )
        .route(
            "/api/{operation}/cancel/{job_id}",
            post(handlers::jobs::cancel_job),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use async_trait::async_trait;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use nhanhoc_common::{NhanhocError, Result};
    use nhanhoc_jobs::{FanOutCoordinator, JobRunner, JobStore};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::{AppState, api_router};
    use crate::{
        completion::{CompletionClient, CompletionRequest},
        operations::{OperationSettings, builtin_registry},
    };

    /// Echoes prompts back; prompts mentioning "fail" or "slow" misbehave.
    struct ScriptedClient;

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            if request.prompt.contains("fail") {
                return Err(NhanhocError::Upstream("model overloaded".to_string()));
            }
            if request.prompt.contains("slow") {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(format!("echo: {}", request.prompt))
        }
    }

    fn app() -> (Router, JobStore) {
        let store = JobStore::new();
        let registry = builtin_registry(
            Arc::new(ScriptedClient),
            FanOutCoordinator::new(3),
            OperationSettings {
                completion_latency: Duration::from_millis(200),
                fanout_timeout: Duration::from_millis(200),
            },
        );
        let state = Arc::new(AppState::new(JobRunner::new(store.clone()), registry));
        (api_router(state), store)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn submit(app: &Router, operation: &str, input: Value) -> String {
        let (status, body) = call(app, "POST", &format!("/api/{operation}"), Some(input)).await;
        assert_eq!(status, StatusCode::ACCEPTED, "{body}");
        assert_eq!(body["status"], "pending");
        body["job_id"].as_str().unwrap().to_string()
    }

    async fn poll_until_terminal(app: &Router, operation: &str, job_id: &str) -> Value {
        let uri = format!("/api/{operation}/status/{job_id}");
        for _ in 0..400 {
            let (status, body) = call(app, "GET", &uri, None).await;
            assert_eq!(status, StatusCode::OK);
            if !matches!(body["status"].as_str(), Some("pending" | "processing")) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {job_id} did not finish");
    }

    #[tokio::test]
    async fn health_lists_operations() {
        let (app, _) = app();
        let (status, body) = call(&app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["operations"], json!(["batch-completion", "completion"]));
    }

    #[tokio::test]
    async fn completion_job_runs_to_completion() {
        let (app, _) = app();
        let job_id = submit(&app, "completion", json!({"prompt": "what is a lifetime?"})).await;

        let body = poll_until_terminal(&app, "completion", &job_id).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["progress"], 100);
        assert_eq!(body["result"], json!({"text": "echo: what is a lifetime?"}));
        assert!(body["completed_at"].is_string());
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn upstream_failure_is_reported_on_poll() {
        let (app, _) = app();
        let job_id = submit(&app, "completion", json!({"prompt": "please fail"})).await;

        let body = poll_until_terminal(&app, "completion", &job_id).await;
        assert_eq!(body["status"], "failed");
        assert!(body["error"].as_str().unwrap().contains("model overloaded"));
        assert!(body.get("result").is_none());
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_without_a_job() {
        let (app, store) = app();
        let (status, body) = call(&app, "POST", "/api/completion", Some(json!({"system": "tutor"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "InvalidArgument");

        let (status, _) = call(&app, "POST", "/api/completion", Some(json!({"prompt": "   "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unknown_operation_and_job_are_not_found() {
        let (app, _) = app();
        let (status, body) = call(&app, "POST", "/api/flashcards", Some(json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "UnknownOperation");

        let (status, body) = call(
            &app,
            "GET",
            "/api/completion/status/0b6f1a1e-8d3c-4f51-9d0a-000000000000",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "JobNotFound");
    }

    #[tokio::test]
    async fn jobs_are_scoped_to_their_operation() {
        let (app, _) = app();
        let job_id = submit(&app, "completion", json!({"prompt": "hello"})).await;

        let (status, _) = call(
            &app,
            "GET",
            &format!("/api/batch-completion/status/{job_id}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&app, "GET", "/api/completion/jobs", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["jobs"][0]["job_id"], job_id.as_str());
    }

    #[tokio::test]
    async fn batch_completion_masks_failed_prompts() {
        let (app, _) = app();
        let job_id = submit(
            &app,
            "batch-completion",
            json!({
                "prompts": {
                    "summary": "summarise ownership",
                    "quiz": "fail to write a quiz",
                    "roadmap": "slow roadmap"
                },
                "fallback": "n/a"
            }),
        )
        .await;

        let body = poll_until_terminal(&app, "batch-completion", &job_id).await;
        assert_eq!(body["status"], "completed");
        let result = &body["result"];
        assert_eq!(
            result["results"],
            json!({
                "quiz": "n/a",
                "roadmap": "n/a",
                "summary": "echo: summarise ownership"
            })
        );
        assert_eq!(result["failed"], json!(["quiz", "roadmap"]));
        assert!(result["elapsed_ms"].as_u64().unwrap() < 5_000);
    }

    #[tokio::test]
    async fn cancel_and_delete_running_job() {
        let (app, store) = app();
        let job_id = submit(&app, "completion", json!({"prompt": "slow answer"})).await;

        let (status, body) = call(&app, "DELETE", &format!("/api/completion/status/{job_id}"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "JobStillRunning");

        let (status, body) = call(&app, "POST", &format!("/api/completion/cancel/{job_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "cancelled");
        assert!(body.get("result").is_none());
        assert!(body.get("error").is_none());

        let (status, _) = call(&app, "DELETE", &format!("/api/completion/status/{job_id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(store.is_empty());
    }
}
