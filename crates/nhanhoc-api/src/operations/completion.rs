use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use nhanhoc_common::error::{NhanhocError, Result};
use nhanhoc_jobs::{JobContext, Operation};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::parse_input;
use crate::completion::{CompletionClient, CompletionRequest};

pub const COMPLETION_OPERATION: &str = "completion";

#[derive(Debug, Deserialize)]
struct CompletionInput {
    prompt: String,
    #[serde(default)]
    system: Option<String>,
}

/// Sends one prompt to the completion service and returns `{text}`.
pub struct CompletionOperation {
    client: Arc<dyn CompletionClient>,
    expected_latency: Duration,
}

impl CompletionOperation {
    pub fn new(client: Arc<dyn CompletionClient>, expected_latency: Duration) -> Self {
        Self {
            client,
            expected_latency,
        }
    }

    fn parse(input: &Value) -> Result<CompletionRequest> {
        let input: CompletionInput = parse_input(input)?;
        if input.prompt.trim().is_empty() {
            return Err(NhanhocError::InvalidArgument(
                "prompt must not be empty".to_string(),
            ));
        }
        Ok(CompletionRequest::new(input.prompt).with_system(input.system))
    }
}

#[async_trait]
impl Operation for CompletionOperation {
    fn name(&self) -> &str {
        COMPLETION_OPERATION
    }

    fn validate(&self, input: &Value) -> Result<()> {
        Self::parse(input).map(|_| ())
    }

    async fn execute(&self, ctx: JobContext, input: Value) -> anyhow::Result<Value> {
        let request = Self::parse(&input)?;
        ctx.set_progress(5, "preparing request");

        let text = ctx
            .with_progress(
                10,
                90,
                self.expected_latency,
                "waiting for the model",
                self.client.complete(&request),
            )
            .await?;
        debug!(job_id = %ctx.id(), chars = text.len(), "completion received");

        Ok(json!({ "text": text }))
    }
}
