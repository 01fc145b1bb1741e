use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use chrono::{DateTime, Utc};
use nhanhoc_common::{
    error::{NhanhocError, Result},
    time::{elapsed_since, now},
};
use serde_json::Value;
use uuid::Uuid;

use crate::record::JobRecord;

/// In-memory registry of job records.
///
/// Every mutation runs against a copy of the record and is written back only
/// if it succeeds, so readers see either the old record or the new one.
#[derive(Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<String, JobRecord>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, operation: &str, input: Value) -> Result<JobRecord> {
        let id = Uuid::new_v4().to_string();
        let record = JobRecord::new(id.clone(), operation, input, now());

        let mut jobs = self.write();
        if jobs.contains_key(&id) {
            return Err(NhanhocError::InternalError(format!(
                "job id collision: {id}"
            )));
        }
        jobs.insert(id, record.clone());
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.read().get(id).cloned()
    }

    pub fn update<T>(
        &self,
        id: &str,
        mutation: impl FnOnce(&mut JobRecord) -> Result<T>,
    ) -> Result<T> {
        let mut jobs = self.write();
        let current = jobs
            .get_mut(id)
            .ok_or_else(|| NhanhocError::JobNotFound(id.to_string()))?;

        let mut next = current.clone();
        let output = mutation(&mut next)?;
        *current = next;
        Ok(output)
    }

    pub fn list(&self, operation: Option<&str>) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self
            .read()
            .values()
            .filter(|job| operation.is_none_or(|name| job.operation == name))
            .cloned()
            .collect();
        jobs.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        jobs
    }

    /// Removes a terminal record. Jobs that are still pending or processing
    /// stay in the store.
    pub fn remove(&self, id: &str) -> Result<JobRecord> {
        let mut jobs = self.write();
        let job = jobs
            .get(id)
            .ok_or_else(|| NhanhocError::JobNotFound(id.to_string()))?;
        if !job.is_terminal() {
            return Err(NhanhocError::JobStillRunning(id.to_string()));
        }
        jobs.remove(id)
            .ok_or_else(|| NhanhocError::JobNotFound(id.to_string()))
    }

    pub fn purge_expired(&self, ttl: Duration, at: DateTime<Utc>) -> Vec<String> {
        let mut jobs = self.write();
        let expired: Vec<String> = jobs
            .values()
            .filter(|job| {
                job.completed_at
                    .is_some_and(|completed_at| elapsed_since(completed_at, at, ttl))
            })
            .map(|job| job.id.clone())
            .collect();
        for id in &expired {
            jobs.remove(id);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panic inside a mutation leaves the map untouched, so a poisoned lock
    // still guards consistent data.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, JobRecord>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, JobRecord>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
