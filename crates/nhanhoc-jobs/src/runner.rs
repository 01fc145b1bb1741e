use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use nhanhoc_common::{
    error::{NhanhocError, Result},
    time::now,
};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    context::JobContext,
    operation::Operation,
    record::JobRecord,
    store::JobStore,
    task::{AbortOnDrop, join_error_message},
    types::JobStatus,
};

struct RunningJob {
    cancel: CancellationToken,
    finished: CancellationToken,
    handle: JoinHandle<()>,
}

enum Outcome {
    Completed(Value),
    Failed(String),
    Cancelled,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub finished: Vec<String>,
    pub cancelled: Vec<String>,
}

/// Accepts work, runs it off the caller's task and records its lifecycle in
/// the [`JobStore`].
#[derive(Clone)]
pub struct JobRunner {
    store: JobStore,
    tasks: Arc<Mutex<HashMap<String, RunningJob>>>,
}

impl JobRunner {
    pub fn new(store: JobStore) -> Self {
        Self {
            store,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Creates a `pending` job and schedules `work` for it.
    pub fn submit<F, Fut>(&self, operation: &str, input: Value, work: F) -> Result<JobRecord>
    where
        F: FnOnce(JobContext, Value) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        if operation.trim().is_empty() {
            return Err(NhanhocError::InvalidArgument(
                "operation name must not be empty".to_string(),
            ));
        }

        let job = self.store.create(operation, input.clone())?;
        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();
        let ctx = JobContext::new(job.id.clone(), self.store.clone(), cancel.clone());

        // The job removes its own entry when done, which needs this lock, so
        // the entry is always in place first.
        let mut tasks = self.tasks();
        let runner = self.clone();
        let done = finished.clone();
        let handle = tokio::spawn(async move {
            runner.execute(ctx, input, work).await;
            done.cancel();
        });
        tasks.insert(
            job.id.clone(),
            RunningJob {
                cancel,
                finished,
                handle,
            },
        );
        drop(tasks);

        info!(job_id = %job.id, operation = %job.operation, "job submitted");
        Ok(job)
    }

    pub fn submit_operation(
        &self,
        operation: Arc<dyn Operation>,
        input: Value,
    ) -> Result<JobRecord> {
        operation.validate(&input)?;
        let name = operation.name().to_string();
        self.submit(&name, input, move |ctx, input| async move {
            operation.execute(ctx, input).await
        })
    }

    pub fn status(&self, id: &str) -> Result<JobRecord> {
        self.store
            .get(id)
            .ok_or_else(|| NhanhocError::JobNotFound(id.to_string()))
    }

    pub fn list(&self, operation: Option<&str>) -> Vec<JobRecord> {
        self.store.list(operation)
    }

    pub fn active_jobs(&self) -> usize {
        self.tasks().len()
    }

    /// Requests cancellation and waits for the job to settle. Terminal jobs
    /// are returned unchanged.
    pub async fn cancel(&self, id: &str) -> Result<JobRecord> {
        let (job, was_pending) = self.store.update(id, |job| {
            let was_pending = job.status == JobStatus::Pending;
            if was_pending {
                job.cancel(now())?;
            }
            Ok((job.clone(), was_pending))
        })?;
        if was_pending {
            info!(job_id = %id, "job cancelled before start");
        } else if job.is_terminal() {
            return Ok(job);
        }

        let finished = self.tasks().get(id).map(|running| {
            running.cancel.cancel();
            running.finished.clone()
        });
        match finished {
            Some(finished) => finished.cancelled().await,
            None if !was_pending => {
                debug!(job_id = %id, "no tracked task, cancellation not delivered");
            }
            None => {}
        }

        self.status(id)
    }

    pub fn delete(&self, id: &str) -> Result<JobRecord> {
        let job = self.store.remove(id)?;
        debug!(job_id = %id, "job deleted");
        Ok(job)
    }

    /// Waits up to `grace` for outstanding jobs, then cancels the rest and
    /// waits for them to record their cancellation.
    pub async fn drain(&self, grace: Duration) -> DrainReport {
        let running: Vec<(String, RunningJob)> = self.tasks().drain().collect();
        let deadline = tokio::time::Instant::now() + grace;
        let mut report = DrainReport::default();

        for (id, mut job) in running {
            if tokio::time::timeout_at(deadline, &mut job.handle).await.is_ok() {
                report.finished.push(id);
                continue;
            }

            job.cancel.cancel();
            if let Err(err) = job.handle.await {
                warn!(job_id = %id, error = %err, "job task ended abnormally during drain");
            }
            warn!(job_id = %id, "job abandoned at shutdown");
            report.cancelled.push(id);
        }

        report
    }

    async fn execute<F, Fut>(self, ctx: JobContext, input: Value, work: F)
    where
        F: FnOnce(JobContext, Value) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let id = ctx.id().to_string();
        if let Err(err) = self.store.update(&id, |job| job.start(now())) {
            debug!(job_id = %id, error = %err, "job not started");
            self.forget(&id);
            return;
        }
        debug!(job_id = %id, "job processing");

        let token = ctx.cancellation_token();
        let mut work = AbortOnDrop::new(tokio::spawn(work(ctx.clone(), input)));
        let outcome = tokio::select! {
            joined = &mut work => match joined {
                Ok(Ok(value)) => Outcome::Completed(value),
                Ok(Err(err)) => Outcome::Failed(format!("{err:#}")),
                Err(err) => Outcome::Failed(join_error_message(err)),
            },
            _ = token.cancelled() => {
                work.abort();
                let _ = (&mut work).await;
                Outcome::Cancelled
            }
        };

        // No reporter may tick after the terminal write below.
        ctx.stop_progress().await;

        let written = match outcome {
            Outcome::Completed(value) => self
                .store
                .update(&id, |job| job.complete(value, now()))
                .map(|()| info!(job_id = %id, "job completed")),
            Outcome::Failed(error) => {
                warn!(job_id = %id, error = %error, "job failed");
                self.store.update(&id, |job| job.fail(error, now()))
            }
            Outcome::Cancelled => self
                .store
                .update(&id, |job| job.cancel(now()))
                .map(|()| info!(job_id = %id, "job cancelled")),
        };
        if let Err(err) = written {
            warn!(job_id = %id, error = %err, "failed to record job outcome");
        }

        self.forget(&id);
    }

    fn forget(&self, id: &str) {
        self.tasks().remove(id);
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, RunningJob>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
