use std::time::Duration;

use chrono::{DateTime, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Returns true once `duration` has passed since `since`, as observed at `at`.
///
/// Timestamps in the future relative to `at` never count as elapsed.
pub fn elapsed_since(since: DateTime<Utc>, at: DateTime<Utc>, duration: Duration) -> bool {
    let Ok(duration) = chrono::Duration::from_std(duration) else {
        return false;
    };
    at.signed_duration_since(since) >= duration
}
