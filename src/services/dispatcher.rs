//! Background generation for the async job path.
//!
//! [`Dispatcher::dispatch`] returns as soon as the work is spawned. The
//! generation runs on its own task and a supervisor task watches its
//! `JoinHandle`, so a panic inside the provider client still ends with the
//! job in `error` instead of stuck in `processing`.

use garde::Validate;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

use crate::models::client::ClientRecord;
use crate::models::generation::GenerationInput;
use crate::models::metrics::EventStatus;
use crate::services::job_store::JobStore;
use crate::services::provider::ImageProvider;
use crate::services::usage::{NewEvent, UsageMetrics};

/// What a finished generation did to its job.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done(String),
    Failed(String),
}

#[derive(Clone)]
pub struct Dispatcher {
    jobs: JobStore,
    provider: Arc<dyn ImageProvider>,
    usage: UsageMetrics,
}

impl Dispatcher {
    pub fn new(jobs: JobStore, provider: Arc<dyn ImageProvider>, usage: UsageMetrics) -> Self {
        Self {
            jobs,
            provider,
            usage,
        }
    }

    /// Start generation for a queued job without waiting for it. The
    /// returned handle resolves once the job is terminal; callers may drop it.
    pub fn dispatch(
        &self,
        job_id: String,
        client: ClientRecord,
        input: GenerationInput,
    ) -> JoinHandle<Outcome> {
        let worker = {
            let this = self.clone();
            let job_id = job_id.clone();
            tokio::spawn(async move { this.run(&job_id, &client, input).await })
        };

        let jobs = self.jobs.clone();
        metrics::gauge!("tryon_jobs_in_flight").increment(1.0);
        tokio::spawn(async move {
            let outcome = match worker.await {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    let message = if join_err.is_panic() {
                        "Generation worker panicked".to_string()
                    } else {
                        "Generation worker was cancelled".to_string()
                    };
                    tracing::error!(job_id = %job_id, error = %join_err, "Generation worker died");
                    metrics::counter!("tryon_jobs_failed_total").increment(1);
                    if let Err(e) = jobs.mark_error(&job_id, &message).await {
                        tracing::error!(
                            job_id = %job_id,
                            error = %e,
                            "Failed to record worker failure"
                        );
                    }
                    Outcome::Failed(message)
                }
            };
            metrics::gauge!("tryon_jobs_in_flight").decrement(1.0);
            outcome
        })
    }

    /// Drive one job to a terminal state. Never retries.
    pub async fn run(
        &self,
        job_id: &str,
        client: &ClientRecord,
        input: GenerationInput,
    ) -> Outcome {
        if let Err(report) = input.validate() {
            let message = format!("Invalid generation input: {report}");
            return self.fail(job_id, client, message, None).await;
        }

        if let Err(e) = self.jobs.mark_processing(job_id).await {
            // The store is gone; the final write below will most likely fail too
            tracing::error!(job_id = %job_id, error = %e, "Failed to mark job processing");
        }

        tracing::info!(
            job_id = %job_id,
            client_id = %client.id,
            model = %self.provider.model(),
            garments = input.garments.len(),
            "Provider call started"
        );
        let started = Instant::now();
        let result = self.provider.generate(&input).await;
        let elapsed = started.elapsed();
        metrics::histogram!("tryon_provider_seconds").record(elapsed.as_secs_f64());

        match result {
            Ok(image_url) => {
                tracing::info!(
                    job_id = %job_id,
                    provider_ms = elapsed.as_millis() as u64,
                    "Provider call finished"
                );
                if let Err(e) = self.jobs.mark_done(job_id, &image_url).await {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to mark job done");
                }
                metrics::counter!("tryon_jobs_completed_total").increment(1);
                self.record(job_id, client, EventStatus::Success, Some(elapsed.as_millis() as u64))
                    .await;
                Outcome::Done(image_url)
            }
            Err(e) => {
                self.fail(job_id, client, e.to_string(), Some(elapsed.as_millis() as u64))
                    .await
            }
        }
    }

    async fn fail(
        &self,
        job_id: &str,
        client: &ClientRecord,
        message: String,
        duration_ms: Option<u64>,
    ) -> Outcome {
        tracing::warn!(job_id = %job_id, error = %message, "Generation failed");
        if let Err(e) = self.jobs.mark_error(job_id, &message).await {
            tracing::error!(job_id = %job_id, error = %e, "Failed to mark job error");
        }
        metrics::counter!("tryon_jobs_failed_total").increment(1);
        if duration_ms.is_some() {
            self.record(job_id, client, EventStatus::Error, duration_ms).await;
        }
        Outcome::Failed(message)
    }

    async fn record(
        &self,
        job_id: &str,
        client: &ClientRecord,
        status: EventStatus,
        duration_ms: Option<u64>,
    ) {
        let event = NewEvent {
            model: self.provider.model().to_string(),
            job_id: Some(job_id.to_string()),
            status,
            duration_ms,
        };
        if let Err(e) = self.usage.record_generation(client, event).await {
            tracing::error!(job_id = %job_id, error = %e, "Failed to record usage event");
        }
    }
}
