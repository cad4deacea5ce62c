use crate::jobs::classifier::ClassifiedError;
use crate::jobs::{attempts::AttemptsRepo, repo::JobsRepo, retry::{next_delay_ms, should_retry, RetryConfig}};
use chrono::Utc;
use rand::{rngs::StdRng, SeedableRng};
use serde_json::Value;
use uuid::Uuid;

#[derive(Clone)]
pub struct JobRunner {
    jobs: JobsRepo,
    attempts: AttemptsRepo,
    retry_cfg: RetryConfig,
}

impl JobRunner {
    pub fn new(jobs: JobsRepo, attempts: AttemptsRepo, retry_cfg: RetryConfig) -> Self {
        Self {
            jobs,
            attempts,
            retry_cfg,
        }
    }

    pub async fn on_success(
        &self,
        job_id: Uuid,
        attempt_id: Uuid,
        worker_id: &str,
        latency_ms: i32,
        result_json: Value,
    ) -> anyhow::Result<()> {
        self.attempts
            .finish_succeeded(attempt_id, latency_ms)
            .await?;

        self.jobs
            .mark_completed(job_id, worker_id, result_json)
            .await?;
        Ok(())
    }

    /// Closes out a failed attempt and decides whether to retry, marking
    /// the job `retrying` with a backed-off `run_at`, or `dlq`/`failed`.
    pub async fn on_failure(
        &self,
        job_id: Uuid,
        attempt_id: Uuid,
        worker_id: &str,
        latency_ms: i32,
        error: &ClassifiedError,
        attempts_made: i32,
        max_attempts: i32,
    ) -> anyhow::Result<()> {
        self.attempts
            .finish_failed(attempt_id, latency_ms, error.kind.as_str(), &error.technical_detail)
            .await?;

        if should_retry(attempts_made, max_attempts, error.retryable) {
            let mut rng = StdRng::from_entropy();
            let delay_ms = error
                .retry_after_seconds
                .map(|s| s * 1_000)
                .unwrap_or_else(|| next_delay_ms(attempts_made + 1, &self.retry_cfg, &mut rng));
            let next_run_at = Utc::now() + chrono::Duration::milliseconds(delay_ms);

            self.jobs
                .reschedule_for_retry(job_id, next_run_at, attempts_made + 1)
                .await?;
        } else {
            let reason_code = if error.retryable {
                "MAX_ATTEMPTS_EXCEEDED"
            } else {
                "NON_RETRYABLE"
            };

            self.jobs.mark_dlq(job_id, worker_id, reason_code).await?;
        }

        Ok(())
    }
}
