use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use nhanhoc_common::error::{NhanhocError, Result};
use nhanhoc_jobs::{FanOutCoordinator, FanOutTask, JobContext, Operation};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::parse_input;
use crate::completion::{CompletionClient, CompletionRequest};

pub const BATCH_COMPLETION_OPERATION: &str = "batch-completion";

#[derive(Debug, Deserialize)]
struct BatchCompletionInput {
    prompts: BTreeMap<String, String>,
    #[serde(default)]
    system: Option<String>,
    #[serde(default)]
    fallback: String,
}

/// Runs several independent prompts through the shared fan-out pool. Prompts
/// that fail or time out are answered with the caller's `fallback` and listed
/// under `failed`.
pub struct BatchCompletionOperation {
    client: Arc<dyn CompletionClient>,
    coordinator: FanOutCoordinator,
    task_timeout: Duration,
}

impl BatchCompletionOperation {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        coordinator: FanOutCoordinator,
        task_timeout: Duration,
    ) -> Self {
        Self {
            client,
            coordinator,
            task_timeout,
        }
    }

    fn parse(input: &Value) -> Result<BatchCompletionInput> {
        let input: BatchCompletionInput = parse_input(input)?;
        if input.prompts.is_empty() {
            return Err(NhanhocError::InvalidArgument(
                "prompts must contain at least one entry".to_string(),
            ));
        }
        if let Some((key, _)) = input
            .prompts
            .iter()
            .find(|(key, prompt)| key.is_empty() || prompt.trim().is_empty())
        {
            return Err(NhanhocError::InvalidArgument(format!(
                "prompt {key:?} must have a non-empty key and text"
            )));
        }
        Ok(input)
    }
}

#[async_trait]
impl Operation for BatchCompletionOperation {
    fn name(&self) -> &str {
        BATCH_COMPLETION_OPERATION
    }

    fn validate(&self, input: &Value) -> Result<()> {
        Self::parse(input).map(|_| ())
    }

    async fn execute(&self, ctx: JobContext, input: Value) -> anyhow::Result<Value> {
        let input = Self::parse(&input)?;
        let total = input.prompts.len();
        ctx.set_progress(5, format!("dispatching {total} prompts"));

        let tasks: Vec<FanOutTask<String>> = input
            .prompts
            .into_iter()
            .map(|(key, prompt)| {
                let client = Arc::clone(&self.client);
                let request = CompletionRequest::new(prompt).with_system(input.system.clone());
                FanOutTask::new(key, self.task_timeout, input.fallback.clone(), async move {
                    client
                        .complete(&request)
                        .await
                        .map_err(anyhow::Error::from)
                })
            })
            .collect();

        let expected =
            expected_duration(self.task_timeout, total, self.coordinator.max_concurrency());
        let report = ctx
            .with_progress(10, 90, expected, "waiting for completions", self.coordinator.run(tasks))
            .await;

        let elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX);
        let mut failed: Vec<&String> = report.failures.keys().collect();
        failed.sort();
        info!(
            job_id = %ctx.id(),
            total,
            failed = failed.len(),
            elapsed_ms,
            "batch completion finished"
        );

        let results: BTreeMap<&String, &String> = report.results.iter().collect();
        Ok(json!({
            "results": results,
            "failed": failed,
            "elapsed_ms": elapsed_ms,
        }))
    }
}

// Slots are shared, so a full batch may take several timeouts.
fn expected_duration(task_timeout: Duration, total: usize, slots: usize) -> Duration {
    let rounds = u32::try_from(total.div_ceil(slots.max(1))).unwrap_or(u32::MAX);
    task_timeout.saturating_mul(rounds)
}
