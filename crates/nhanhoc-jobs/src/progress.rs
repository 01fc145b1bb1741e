use std::time::Duration;

use nhanhoc_common::time::now;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{store::JobStore, types::ProgressUpdate};

/// Ticks a job's progress forward while it waits on a call that reports nothing.
#[derive(Debug)]
pub struct ProgressReporter {
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    pub fn start(
        store: JobStore,
        job_id: impl Into<String>,
        from: u8,
        to: u8,
        duration: Duration,
        message: impl Into<String>,
    ) -> Self {
        let from = from.min(100);
        let to = to.clamp(from, 100);
        let stop = CancellationToken::new();
        let handle = tokio::spawn(run_ticks(
            store,
            job_id.into(),
            from,
            to,
            tick_interval(from, to, duration),
            message.into(),
            stop.clone(),
        ));

        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    pub async fn stop(mut self) {
        self.stop.cancel();
        self.wait().await;
    }

    pub async fn join(mut self) {
        self.wait().await;
    }

    async fn wait(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if let Err(err) = handle.await
            && err.is_panic()
        {
            warn!(error = %err, "progress reporter panicked");
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

fn tick_interval(from: u8, to: u8, duration: Duration) -> Duration {
    let steps = u32::from(to - from);
    if steps == 0 {
        return Duration::ZERO;
    }
    duration / steps
}

async fn run_ticks(
    store: JobStore,
    job_id: String,
    from: u8,
    to: u8,
    interval: Duration,
    message: String,
    stop: CancellationToken,
) {
    let mut progress = from;
    loop {
        if stop.is_cancelled() {
            break;
        }
        let update = store.update(&job_id, |job| {
            Ok(job.advance_progress(progress, Some(message.clone()), now()))
        });
        match update {
            Ok(ProgressUpdate::Closed) => {
                debug!(job_id = %job_id, progress, "job finished, progress reporter stopping");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                debug!(job_id = %job_id, error = %err, "progress reporter could not update job");
                break;
            }
        }

        if progress >= to {
            break;
        }
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        progress += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;

    use super::{ProgressReporter, tick_interval};
    use crate::{store::JobStore, types::JobStatus};

    fn processing_job(store: &JobStore) -> String {
        let job = store.create("pdf-analysis", json!({})).unwrap();
        store.update(&job.id, |record| record.start(Utc::now())).unwrap();
        job.id
    }

    #[test]
    fn interval_spreads_duration_over_steps() {
        assert_eq!(
            tick_interval(30, 65, Duration::from_millis(3500)),
            Duration::from_millis(100)
        );
        assert_eq!(tick_interval(50, 50, Duration::from_secs(1)), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn reporter_reaches_target_linearly() {
        let store = JobStore::new();
        let id = processing_job(&store);

        let reporter = ProgressReporter::start(
            store.clone(),
            id.clone(),
            80,
            90,
            Duration::from_millis(1000),
            "rendering",
        );

        tokio::time::sleep(Duration::from_millis(450)).await;
        let midway = store.get(&id).unwrap().progress;
        assert!((83..=86).contains(&midway), "progress was {midway}");

        reporter.join().await;
        let job = store.get(&id).unwrap();
        assert_eq!(job.progress, 90);
        assert_eq!(job.progress_message.as_deref(), Some("rendering"));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_reporter_writes_nothing_more() {
        let store = JobStore::new();
        let id = processing_job(&store);

        let reporter = ProgressReporter::start(
            store.clone(),
            id.clone(),
            30,
            65,
            Duration::from_secs(3),
            "analysing",
        );
        tokio::time::sleep(Duration::from_millis(500)).await;
        reporter.stop().await;
        let frozen = store.get(&id).unwrap().progress;

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.get(&id).unwrap().progress, frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn reporter_gives_up_once_job_is_terminal() {
        let store = JobStore::new();
        let id = processing_job(&store);

        let reporter = ProgressReporter::start(
            store.clone(),
            id.clone(),
            10,
            90,
            Duration::from_secs(8),
            "waiting",
        );
        tokio::time::sleep(Duration::from_millis(350)).await;
        store
            .update(&id, |record| record.complete(json!("ok"), Utc::now()))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(reporter.is_finished());

        let job = store.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
    }

    #[tokio::test]
    async fn missing_job_ends_reporter_quietly() {
        let store = JobStore::new();
        let reporter = ProgressReporter::start(
            store,
            "does-not-exist",
            0,
            50,
            Duration::from_secs(10),
            "noop",
        );
        tokio::time::timeout(Duration::from_secs(1), reporter.join())
            .await
            .expect("reporter should stop on its own");
    }
}
