pub mod batch;
pub mod completion;

use std::{sync::Arc, time::Duration};

use nhanhoc_common::error::{NhanhocError, Result};
use nhanhoc_jobs::{FanOutCoordinator, OperationRegistry};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::completion::CompletionClient;

pub use batch::{BATCH_COMPLETION_OPERATION, BatchCompletionOperation};
pub use completion::{COMPLETION_OPERATION, CompletionOperation};

#[derive(Debug, Clone, Copy)]
pub struct OperationSettings {
    /// Expected duration of one completion call, used to pace progress.
    pub completion_latency: Duration,
    /// Per-prompt limit inside a batch.
    pub fanout_timeout: Duration,
}

impl Default for OperationSettings {
    fn default() -> Self {
        Self {
            completion_latency: Duration::from_secs(20),
            fanout_timeout: Duration::from_secs(15),
        }
    }
}

pub fn builtin_registry(
    client: Arc<dyn CompletionClient>,
    coordinator: FanOutCoordinator,
    settings: OperationSettings,
) -> OperationRegistry {
    let mut registry = OperationRegistry::new();
    registry
        .register(Arc::new(CompletionOperation::new(
            Arc::clone(&client),
            settings.completion_latency,
        )))
        .register(Arc::new(BatchCompletionOperation::new(
            client,
            coordinator,
            settings.fanout_timeout,
        )));
    registry
}

fn parse_input<T: DeserializeOwned>(input: &Value) -> Result<T> {
    serde_json::from_value(input.clone())
        .map_err(|err| NhanhocError::InvalidArgument(format!("invalid input: {err}")))
}
