use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use nhanhoc_common::time::now;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{progress::ProgressReporter, store::JobStore, types::ProgressUpdate};

/// Handle given to a job's work function.
#[derive(Clone)]
pub struct JobContext {
    id: String,
    store: JobStore,
    cancel: CancellationToken,
    reporters: Arc<Mutex<Vec<ProgressReporter>>>,
}

impl JobContext {
    pub(crate) fn new(id: String, store: JobStore, cancel: CancellationToken) -> Self {
        Self {
            id,
            store,
            cancel,
            reporters: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn set_progress(&self, progress: u8, message: impl Into<String>) {
        let message = message.into();
        match self.store.update(&self.id, |job| {
            Ok(job.advance_progress(progress, Some(message), now()))
        }) {
            Ok(ProgressUpdate::Applied) => {}
            Ok(outcome) => {
                debug!(job_id = %self.id, progress, ?outcome, "progress update not applied");
            }
            Err(err) => {
                debug!(job_id = %self.id, error = %err, "progress update failed");
            }
        }
    }

    pub fn report_progress(
        &self,
        from: u8,
        to: u8,
        duration: Duration,
        message: impl Into<String>,
    ) {
        let reporter =
            ProgressReporter::start(self.store.clone(), self.id.clone(), from, to, duration, message);
        self.reporters().push(reporter);
    }

    pub async fn stop_progress(&self) {
        let reporters = std::mem::take(&mut *self.reporters());
        for reporter in reporters {
            reporter.stop().await;
        }
    }

    /// Runs `work` while a reporter advances progress from `from` to `to`.
    /// The reporter is stopped as soon as `work` resolves.
    pub async fn with_progress<F>(
        &self,
        from: u8,
        to: u8,
        duration: Duration,
        message: impl Into<String>,
        work: F,
    ) -> F::Output
    where
        F: Future,
    {
        self.report_progress(from, to, duration, message);
        let output = work.await;
        self.stop_progress().await;
        output
    }

    fn reporters(&self) -> MutexGuard<'_, Vec<ProgressReporter>> {
        match self.reporters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
