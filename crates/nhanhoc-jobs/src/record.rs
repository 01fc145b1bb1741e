use chrono::{DateTime, Utc};
use nhanhoc_common::error::{NhanhocError, Result};
use serde::Serialize;
use serde_json::Value;

use crate::types::{JobStatus, ProgressUpdate};

/// Highest progress a job may report before it has actually completed.
pub const MAX_RUNNING_PROGRESS: u8 = 99;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub operation: String,
    pub status: JobStatus,
    pub input: Value,
    pub progress: u8,
    pub progress_message: Option<String>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new(
        id: impl Into<String>,
        operation: impl Into<String>,
        input: Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            operation: operation.into(),
            status: JobStatus::Pending,
            input,
            progress: 0,
            progress_message: None,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(JobStatus::Processing, now)
    }

    /// Moves progress forward. Values are capped below 100 until the job
    /// completes, and a value lower than the current one is ignored.
    pub fn advance_progress(
        &mut self,
        progress: u8,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> ProgressUpdate {
        match self.status {
            JobStatus::Processing => {}
            JobStatus::Pending => return ProgressUpdate::Ignored,
            _ => return ProgressUpdate::Closed,
        }

        let progress = progress.min(MAX_RUNNING_PROGRESS);
        if progress < self.progress {
            return ProgressUpdate::Ignored;
        }

        self.progress = progress;
        if message.is_some() {
            self.progress_message = message;
        }
        self.updated_at = now;
        ProgressUpdate::Applied
    }

    pub fn complete(&mut self, result: Value, now: DateTime<Utc>) -> Result<()> {
        self.transition(JobStatus::Completed, now)?;
        self.progress = 100;
        self.progress_message = Some("completed".to_string());
        self.result = Some(result);
        self.error = None;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.transition(JobStatus::Failed, now)?;
        let error = error.into();
        self.progress_message = Some(format!("failed: {error}"));
        self.result = None;
        self.error = Some(error);
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(JobStatus::Cancelled, now)?;
        self.progress_message = Some("cancelled".to_string());
        self.result = None;
        self.error = None;
        self.completed_at = Some(now);
        Ok(())
    }

    fn transition(&mut self, next: JobStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(NhanhocError::InvalidTransition {
                id: self.id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}
