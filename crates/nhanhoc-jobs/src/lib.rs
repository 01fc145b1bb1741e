pub mod context;
pub mod fanout;
pub mod operation;
pub mod progress;
pub mod record;
pub mod retention;
pub mod runner;
pub mod store;
mod task;
pub mod types;

pub use context::JobContext;
pub use fanout::{
    DEFAULT_FANOUT_CONCURRENCY, FanOutCoordinator, FanOutFailure, FanOutReport, FanOutTask,
};
pub use operation::{Operation, OperationRegistry};
pub use progress::ProgressReporter;
pub use record::{JobRecord, MAX_RUNNING_PROGRESS};
pub use retention::{RetentionPolicy, spawn_retention_sweeper, sweep_expired};
pub use runner::{DrainReport, JobRunner};
pub use store::JobStore;
pub use types::{JobStatus, ProgressUpdate};
