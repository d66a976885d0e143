//! Registry for long-running background jobs.
//!
//! Import and export runs (and anything else that outlives a request) are
//! tracked here so clients can poll for completion. Jobs are append-only
//! records; there is no cancellation.

use crate::{TvsError, TvsResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    /// Free-form kind label, e.g. `import` or `export`.
    pub kind: String,
    pub status: JobStatus,
    /// Human-readable outcome: a summary on completion, the error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<String, Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new job in `RUNNING` state and returns it.
    pub fn start(&self, kind: &str) -> Job {
        let job = Job {
            id: uuid::Uuid::new_v4().simple().to_string(),
            kind: kind.to_owned(),
            status: JobStatus::Running,
            result: None,
            created_at: Utc::now(),
            finished_at: None,
        };
        self.lock().insert(job.id.clone(), job.clone());
        tracing::info!(job = %job.id, kind, "job started");
        job
    }

    pub fn complete(&self, id: &str, result: impl Into<String>) -> TvsResult<Job> {
        self.finish(id, JobStatus::Completed, result.into())
    }

    pub fn fail(&self, id: &str, error: impl Into<String>) -> TvsResult<Job> {
        self.finish(id, JobStatus::Failed, error.into())
    }

    pub fn get(&self, id: &str) -> TvsResult<Job> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| TvsError::JobNotFound(id.to_owned()))
    }

    fn finish(&self, id: &str, status: JobStatus, result: String) -> TvsResult<Job> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| TvsError::JobNotFound(id.to_owned()))?;
        job.status = status;
        job.result = Some(result);
        job.finished_at = Some(Utc::now());
        Ok(job.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Job>> {
        self.jobs.lock().expect("job registry lock poisoned")
    }
}
