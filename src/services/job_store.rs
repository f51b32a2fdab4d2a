//! Job lifecycle: creation, lookup, and the three terminal-bound transitions.
//!
//! Jobs are stored as JSON under `job:<id>` with a fixed retention window.
//! Every write re-persists the full record and resets the window. The
//! dispatcher is the only writer after creation, so no compare-and-swap is
//! needed.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::models::job::{Job, JobMetadata, TransitionError};
use crate::store::{KvStore, StoreError};

const JOB_PREFIX: &str = "job:";

/// Default retention for job records.
pub const DEFAULT_JOB_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
pub struct JobStore {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn new_job_id() -> String {
    format!("job_{}", uuid::Uuid::new_v4().simple())
}

fn key(job_id: &str) -> String {
    format!("{JOB_PREFIX}{job_id}")
}

impl JobStore {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let payload = serde_json::to_string(job)?;
        self.kv.set(&key(&job.id), &payload, Some(self.ttl)).await
    }

    /// Create a job in `queued` state. Fails only if the store does.
    pub async fn create_job(&self, id: &str, metadata: JobMetadata) -> Result<Job, StoreError> {
        let job = Job::new(id, metadata, now_ms());
        self.save(&job).await?;
        tracing::info!(job_id = %id, client_id = ?job.client_id, "Created job");
        Ok(job)
    }

    /// `None` for ids never created or past retention.
    pub async fn get_job(&self, id: &str) -> Result<Option<Job>, StoreError> {
        match self.kv.get(&key(id)).await? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Load, apply `transition`, and write back. Missing jobs and illegal
    /// transitions are logged and skipped.
    async fn update<F>(
        &self,
        id: &str,
        action: &str,
        transition: F,
    ) -> Result<Option<Job>, StoreError>
    where
        F: FnOnce(&mut Job) -> Result<(), TransitionError>,
    {
        let Some(mut job) = self.get_job(id).await? else {
            tracing::warn!(job_id = %id, action, "Job not found, skipping update");
            return Ok(None);
        };

        if let Err(e) = transition(&mut job) {
            tracing::warn!(job_id = %id, action, error = %e, "Rejected job transition");
            return Ok(None);
        }

        self.save(&job).await?;
        Ok(Some(job))
    }

    pub async fn mark_processing(&self, id: &str) -> Result<(), StoreError> {
        if self
            .update(id, "mark_processing", |job| job.mark_processing(now_ms()))
            .await?
            .is_some()
        {
            tracing::info!(job_id = %id, "Job -> processing");
        }
        Ok(())
    }

    pub async fn mark_done(&self, id: &str, image_url: &str) -> Result<(), StoreError> {
        let url = image_url.to_string();
        if let Some(job) = self
            .update(id, "mark_done", |job| job.mark_done(url, now_ms()))
            .await?
        {
            tracing::info!(
                job_id = %id,
                provider_ms = ?job.provider_duration_ms(),
                total_ms = ?job.total_duration_ms(),
                "Job -> done"
            );
        }
        Ok(())
    }

    pub async fn mark_error(&self, id: &str, message: &str) -> Result<(), StoreError> {
        let msg = message.to_string();
        if self
            .update(id, "mark_error", |job| job.mark_error(msg, now_ms()))
            .await?
            .is_some()
        {
            tracing::info!(job_id = %id, error = %message, "Job -> error");
        }
        Ok(())
    }
}
