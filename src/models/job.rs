use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Status of a generation job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    /// Terminal statuses never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

/// Optional provenance recorded at submission time.
#[derive(Debug, Clone, Default)]
pub struct JobMetadata {
    pub client_id: Option<String>,
    pub garments_count: Option<u32>,
}

/// A generation request tracked outside the HTTP request that created it.
/// Timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub created_at: i64,
    /// Provider call started.
    pub started_at: Option<i64>,
    /// Provider call finished (successfully or not).
    pub ended_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub image_url: Option<String>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub garments_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("illegal job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

impl Job {
    pub fn new(id: impl Into<String>, metadata: JobMetadata, now_ms: i64) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Queued,
            created_at: now_ms,
            started_at: None,
            ended_at: None,
            completed_at: None,
            image_url: None,
            error: None,
            client_id: metadata.client_id,
            garments_count: metadata.garments_count,
        }
    }

    fn check(&self, to: JobStatus, allowed_from: &[JobStatus]) -> Result<(), TransitionError> {
        if allowed_from.contains(&self.status) {
            Ok(())
        } else {
            Err(TransitionError {
                from: self.status,
                to,
            })
        }
    }

    pub fn mark_processing(&mut self, now_ms: i64) -> Result<(), TransitionError> {
        self.check(JobStatus::Processing, &[JobStatus::Queued])?;
        self.status = JobStatus::Processing;
        self.started_at = Some(now_ms);
        Ok(())
    }

    pub fn mark_done(&mut self, image_url: String, now_ms: i64) -> Result<(), TransitionError> {
        self.check(JobStatus::Done, &[JobStatus::Processing])?;
        self.status = JobStatus::Done;
        self.ended_at = Some(now_ms);
        self.completed_at = Some(now_ms);
        self.image_url = Some(image_url);
        self.error = None;
        Ok(())
    }

    /// A queued job may fail directly when its inputs are rejected before
    /// the provider is called.
    pub fn mark_error(&mut self, message: String, now_ms: i64) -> Result<(), TransitionError> {
        self.check(JobStatus::Error, &[JobStatus::Queued, JobStatus::Processing])?;
        self.status = JobStatus::Error;
        self.ended_at = Some(now_ms);
        self.completed_at = Some(now_ms);
        self.error = Some(message);
        self.image_url = None;
        Ok(())
    }

    /// Time spent inside the provider call, once it has finished.
    pub fn provider_duration_ms(&self) -> Option<i64> {
        Some(self.ended_at? - self.started_at?)
    }

    pub fn total_duration_ms(&self) -> Option<i64> {
        Some(self.completed_at? - self.created_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobTimestamps {
    pub created_at: i64,
    pub fal_start: Option<i64>,
    pub fal_end: Option<i64>,
    pub completed_at: Option<i64>,
}

/// Body of `GET /api/jobs/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusResponse {
    pub status: JobStatus,
    pub image_url: Option<String>,
    pub error: Option<String>,
    pub timestamps: JobTimestamps,
}

impl From<&Job> for JobStatusResponse {
    fn from(job: &Job) -> Self {
        Self {
            status: job.status,
            image_url: job.image_url.clone(),
            error: job.error.clone(),
            timestamps: JobTimestamps {
                created_at: job.created_at,
                fal_start: job.started_at,
                fal_end: job.ended_at,
                completed_at: job.completed_at,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn queued() -> Job {
        Job::new("job_1", JobMetadata::default(), 1_000)
    }

    #[test]
    fn new_job_is_queued_with_only_creation_timestamp() {
        let job = queued();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.created_at, 1_000);
        assert!(job.started_at.is_none());
        assert!(job.ended_at.is_none());
        assert!(job.completed_at.is_none());
        assert!(job.image_url.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn happy_path_transitions() {
        let mut job = queued();
        job.mark_processing(1_100).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.started_at, Some(1_100));

        job.mark_done("https://cdn.example/out.png".into(), 4_100).unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.image_url.as_deref(), Some("https://cdn.example/out.png"));
        assert!(job.error.is_none());
        assert_eq!(job.provider_duration_ms(), Some(3_000));
        assert_eq!(job.total_duration_ms(), Some(3_100));
    }

    #[test]
    fn error_clears_result() {
        let mut job = queued();
        job.mark_processing(1_100).unwrap();
        job.image_url = Some("stale".into());
        job.mark_error("provider exploded".into(), 2_000).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some("provider exploded"));
        assert!(job.image_url.is_none());
        assert_eq!(job.completed_at, Some(2_000));
    }

    #[test]
    fn terminal_states_are_final() {
        let mut job = queued();
        job.mark_processing(1).unwrap();
        job.mark_done("url".into(), 2).unwrap();
        let snapshot = job.clone();

        assert!(job.mark_processing(3).is_err());
        assert!(job.mark_error("late".into(), 3).is_err());
        assert!(job.mark_done("other".into(), 3).is_err());
        assert_eq!(job, snapshot);
    }

    #[test]
    fn done_requires_processing() {
        let mut job = queued();
        let err = job.mark_done("url".into(), 2).unwrap_err();
        assert_eq!(err.from, JobStatus::Queued);
        assert_eq!(err.to, JobStatus::Done);
    }

    #[test]
    fn queued_job_can_fail_directly() {
        let mut job = queued();
        job.mark_error("no garments".into(), 5).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.started_at.is_none());
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(serde_json::to_value(JobStatus::Processing).unwrap(), "processing");
        assert_eq!(JobStatus::Done.to_string(), "done");
        assert_eq!(JobStatus::from_str("error").unwrap(), JobStatus::Error);
    }

    #[test]
    fn status_response_uses_provider_timestamp_names() {
        let mut job = queued();
        job.mark_processing(1_100).unwrap();
        let body = serde_json::to_value(JobStatusResponse::from(&job)).unwrap();
        assert_eq!(body["status"], "processing");
        assert_eq!(body["timestamps"]["fal_start"], 1_100);
        assert!(body["timestamps"]["fal_end"].is_null());
        assert!(body["image_url"].is_null());
    }
}
