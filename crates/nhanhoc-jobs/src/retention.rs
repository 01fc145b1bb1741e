use std::time::Duration;

use nhanhoc_common::time::now;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::store::JobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// How long a finished job stays queryable.
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Removes finished jobs older than the policy's ttl and returns how many
/// were dropped. Pending and processing jobs are never touched.
pub fn sweep_expired(store: &JobStore, policy: &RetentionPolicy) -> usize {
    let removed = store.purge_expired(policy.ttl, now());
    if !removed.is_empty() {
        info!(removed = removed.len(), remaining = store.len(), "expired jobs evicted");
    }
    removed.len()
}

pub fn spawn_retention_sweeper(
    store: JobStore,
    policy: RetentionPolicy,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = policy.sweep_interval.max(Duration::from_millis(10));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("retention sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    sweep_expired(&store, &policy);
                }
            }
        }
    })
}
