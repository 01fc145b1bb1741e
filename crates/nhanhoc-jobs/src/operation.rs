use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use nhanhoc_common::error::{NhanhocError, Result};
use serde_json::Value;

use crate::context::JobContext;

/// A named kind of long-running work that can be submitted as a job.
#[async_trait]
pub trait Operation: Send + Sync {
    fn name(&self) -> &str;

    /// Rejects malformed input before a job is created for it.
    fn validate(&self, _input: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: JobContext, input: Value) -> anyhow::Result<Value>;
}

#[derive(Clone, Default)]
pub struct OperationRegistry {
    operations: HashMap<String, Arc<dyn Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `operation` under its name, replacing any previous entry.
    pub fn register(&mut self, operation: Arc<dyn Operation>) -> &mut Self {
        self.operations
            .insert(operation.name().to_string(), operation);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Operation>> {
        self.operations
            .get(name)
            .cloned()
            .ok_or_else(|| NhanhocError::UnknownOperation(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.operations.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use async_trait::async_trait;
    use nhanhoc_common::{NhanhocError, Result};
    use serde_json::{Value, json};

    use super::{Operation, OperationRegistry};
    use crate::{context::JobContext, runner::JobRunner, store::JobStore, types::JobStatus};

    struct Summarise;

    #[async_trait]
    impl Operation for Summarise {
        fn name(&self) -> &str {
            "summarise"
        }

        fn validate(&self, input: &Value) -> Result<()> {
            match input.get("text").and_then(Value::as_str) {
                Some(text) if !text.trim().is_empty() => Ok(()),
                _ => Err(NhanhocError::InvalidArgument(
                    "text must be a non-empty string".to_string(),
                )),
            }
        }

        async fn execute(&self, ctx: JobContext, input: Value) -> anyhow::Result<Value> {
            ctx.set_progress(50, "summarising");
            let text = input["text"].as_str().unwrap_or_default();
            Ok(json!({"words": text.split_whitespace().count()}))
        }
    }

    #[test]
    fn registry_resolves_by_name() {
        let mut registry = OperationRegistry::new();
        registry.register(Arc::new(Summarise));

        assert_eq!(registry.get("summarise").unwrap().name(), "summarise");
        assert_eq!(registry.names(), vec!["summarise".to_string()]);
        assert!(matches!(
            registry.get("translate"),
            Err(NhanhocError::UnknownOperation(_))
        ));
    }

    #[tokio::test]
    async fn invalid_input_creates_no_job() {
        let store = JobStore::new();
        let runner = JobRunner::new(store.clone());

        let err = runner
            .submit_operation(Arc::new(Summarise), json!({"text": "  "}))
            .unwrap_err();
        assert!(matches!(err, NhanhocError::InvalidArgument(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn operation_runs_as_job() {
        let runner = JobRunner::new(JobStore::new());
        let job = runner
            .submit_operation(Arc::new(Summarise), json!({"text": "rust owns memory"}))
            .unwrap();
        assert_eq!(job.operation, "summarise");

        let mut done = runner.status(&job.id).unwrap();
        for _ in 0..200 {
            if done.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            done = runner.status(&job.id).unwrap();
        }
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.result, Some(json!({"words": 3})));
    }
}
