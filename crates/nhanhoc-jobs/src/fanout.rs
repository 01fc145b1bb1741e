use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::Arc,
    time::Duration,
};

use futures::{FutureExt, StreamExt, future::BoxFuture, stream::FuturesUnordered};
use thiserror::Error;
use tokio::{sync::Semaphore, time::Instant};
use tracing::{debug, warn};

use crate::task::{AbortOnDrop, join_error_message};

pub const DEFAULT_FANOUT_CONCURRENCY: usize = 3;

pub struct FanOutTask<T> {
    key: String,
    timeout: Duration,
    fallback: T,
    work: BoxFuture<'static, anyhow::Result<T>>,
}

impl<T> FanOutTask<T> {
    pub fn new<F>(key: impl Into<String>, timeout: Duration, fallback: T, work: F) -> Self
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            key: key.into(),
            timeout,
            fallback,
            work: work.boxed(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FanOutFailure {
    #[error("{0}")]
    Failed(String),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("{0}")]
    Panicked(String),
}

/// Aggregate of a fan-out call. `results` always holds one entry per distinct
/// task key; failed keys carry their fallback and are listed in `failures`.
#[derive(Debug)]
pub struct FanOutReport<T> {
    pub results: HashMap<String, T>,
    pub failures: HashMap<String, FanOutFailure>,
    pub elapsed: Duration,
}

impl<T> FanOutReport<T> {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FanOutCoordinator {
    permits: Arc<Semaphore>,
    max_concurrency: usize,
}

impl Default for FanOutCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_FANOUT_CONCURRENCY)
    }
}

impl FanOutCoordinator {
    pub fn new(max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Runs every task and never fails. A task that errors, panics or exceeds
    /// its timeout contributes its fallback instead. The timeout starts once
    /// the task holds a pool slot. A repeated key is dropped with a warning.
    pub async fn run<T>(&self, tasks: Vec<FanOutTask<T>>) -> FanOutReport<T>
    where
        T: Send + 'static,
    {
        let started = Instant::now();
        let mut seen = HashSet::new();
        let mut pending = FuturesUnordered::new();

        for task in tasks {
            let FanOutTask {
                key,
                timeout,
                fallback,
                work,
            } = task;
            if !seen.insert(key.clone()) {
                warn!(key = %key, "duplicate fan-out key ignored");
                continue;
            }

            let permits = Arc::clone(&self.permits);
            let handle = AbortOnDrop::new(tokio::spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return Err(FanOutFailure::Failed("fan-out pool is closed".to_string()));
                };
                match tokio::time::timeout(timeout, work).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(err)) => Err(FanOutFailure::Failed(format!("{err:#}"))),
                    Err(_) => Err(FanOutFailure::TimedOut(timeout)),
                }
            }));
            pending.push(async move { (key, fallback, handle.await) });
        }

        let mut results = HashMap::with_capacity(seen.len());
        let mut failures = HashMap::new();
        while let Some((key, fallback, joined)) = pending.next().await {
            let outcome = joined
                .unwrap_or_else(|err| Err(FanOutFailure::Panicked(join_error_message(err))));
            match outcome {
                Ok(value) => {
                    debug!(key = %key, "fan-out task completed");
                    results.insert(key, value);
                }
                Err(failure) => {
                    warn!(key = %key, error = %failure, "fan-out task failed, using fallback");
                    results.insert(key.clone(), fallback);
                    failures.insert(key, failure);
                }
            }
        }

        FanOutReport {
            results,
            failures,
            elapsed: started.elapsed(),
        }
    }
}
