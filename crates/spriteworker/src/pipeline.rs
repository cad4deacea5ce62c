use std::time::{Duration, Instant};

use spriteflow::admission::AdmissionController;
use spriteflow::jobs::classifier::{ClassifiedError, ErrorKind};
use spriteflow::jobs::model::Job;
use spriteflow::jobs::runner::JobRunner;
use spriteflow::jobs::{AttemptsRepo, JobsRepo};
use spriteflow::remote_client::RemoteClient;
use spriteflow::status_parser::RemoteJobStatus;
use spriteflow::timeout_enforcer::{EnforcerError, TimeoutEnforcer};
use uuid::Uuid;

const POLL_RETRY_AFTER_FLOOR_S: i64 = 1;

/// The submit/poll pipeline every leased job runs through. One shared gate
/// bounds concurrency and timeout for both the initial submit and each
/// subsequent poll, since there's a single job pipeline here rather than
/// the many job-type handlers a generic queue would dispatch across.
#[derive(Clone)]
pub struct Pipeline {
    jobs: JobsRepo,
    attempts: AttemptsRepo,
    runner: JobRunner,
    remote: RemoteClient,
    enforcer: TimeoutEnforcer,
    admission: AdmissionController,
    worker_id: String,
    max_poll_attempts: i32,
    poll_retry_after_ceiling_s: i64,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        jobs: JobsRepo,
        attempts: AttemptsRepo,
        runner: JobRunner,
        remote: RemoteClient,
        enforcer: TimeoutEnforcer,
        admission: AdmissionController,
        worker_id: String,
        max_poll_attempts: i32,
        poll_retry_after_ceiling_s: i64,
    ) -> Self {
        Self {
            jobs,
            attempts,
            runner,
            remote,
            enforcer,
            admission,
            worker_id,
            max_poll_attempts,
            poll_retry_after_ceiling_s,
        }
    }

    /// Submits a freshly-leased job to the remote renderer. On success the
    /// job moves to `polling`; on failure the attempt is closed out and
    /// [`JobRunner::on_failure`] decides retry vs DLQ.
    pub async fn submit(&self, job: &Job, attempt_id: Uuid) -> anyhow::Result<()> {
        let job_timeout = Duration::from_millis(job.timeout_ms.max(0) as u64);
        let start = Instant::now();

        let result = self
            .enforcer
            .run(Some(job_timeout), self.remote.submit(&job.prompt_json))
            .await;

        match result {
            Ok(submitted) => {
                self.jobs
                    .mark_polling(job.id, &self.worker_id, &submitted.remote_job_id)
                    .await?;
                tracing::info!(job_id = %job.id, remote_job_id = %submitted.remote_job_id, "submitted to remote renderer");
                Ok(())
            }
            Err(err) => {
                let latency_ms = start.elapsed().as_millis() as i32;
                let classified = enforcer_error_to_classified(err, "remote_api");
                self.runner
                    .on_failure(
                        job.id,
                        attempt_id,
                        &self.worker_id,
                        latency_ms,
                        &classified,
                        job.attempts_made,
                        job.max_attempts,
                    )
                    .await
            }
        }
    }

    /// Polls one in-flight job. While the remote is still working, renews
    /// the lock and schedules the next poll `retry_after_s` out (clamped to
    /// `[1s, ceiling]`); once the per-job poll-attempt count exceeds the
    /// configured maximum, the job is failed with a retryable timeout.
    /// Otherwise the attempt is closed out on a terminal remote status.
    pub async fn poll(&self, job: &Job, lease_seconds: i64) -> anyhow::Result<()> {
        let Some(remote_job_id) = job.remote_job_id.as_deref() else {
            tracing::warn!(job_id = %job.id, "polling job has no remote_job_id, skipping");
            return Ok(());
        };

        let job_timeout = Duration::from_millis(job.timeout_ms.max(0) as u64);
        let start = Instant::now();

        let result = self
            .enforcer
            .run(Some(job_timeout), self.remote.poll(remote_job_id))
            .await;

        let attempt = match self.attempts.current_attempt(job.id).await? {
            Some(a) => a,
            None => {
                tracing::warn!(job_id = %job.id, "no open attempt for polling job");
                return Ok(());
            }
        };

        match result {
            Ok(RemoteJobStatus::Processing { retry_after_s, progress }) => {
                if let Some(progress) = progress {
                    tracing::debug!(job_id = %job.id, progress, "remote render in progress");
                }

                let wait_s = retry_after_s.clamp(POLL_RETRY_AFTER_FLOOR_S, self.poll_retry_after_ceiling_s);
                let attempts_so_far = self
                    .jobs
                    .schedule_next_poll(job.id, &self.worker_id, lease_seconds, wait_s)
                    .await?;

                if attempts_so_far >= self.max_poll_attempts {
                    let latency_ms = start.elapsed().as_millis() as i32;
                    let classified = ClassifiedError::new(
                        ErrorKind::Timeout,
                        format!("exceeded {} poll attempts", self.max_poll_attempts),
                        "polling_engine",
                    );
                    return self
                        .runner
                        .on_failure(
                            job.id,
                            attempt.id,
                            &self.worker_id,
                            latency_ms,
                            &classified,
                            job.attempts_made,
                            job.max_attempts,
                        )
                        .await;
                }

                Ok(())
            }
            Ok(RemoteJobStatus::Completed { artifact }) => {
                let latency_ms = start.elapsed().as_millis() as i32;
                self.admission
                    .record_completed_artifact(&job.fingerprint, &artifact)
                    .await;
                self.runner
                    .on_success(job.id, attempt.id, &self.worker_id, latency_ms, artifact)
                    .await
            }
            Ok(RemoteJobStatus::Failed { message }) => {
                let latency_ms = start.elapsed().as_millis() as i32;
                let classified = ClassifiedError::new(ErrorKind::ServerError, message, "remote_api");
                self.runner
                    .on_failure(
                        job.id,
                        attempt.id,
                        &self.worker_id,
                        latency_ms,
                        &classified,
                        job.attempts_made,
                        job.max_attempts,
                    )
                    .await
            }
            Err(err) => {
                let latency_ms = start.elapsed().as_millis() as i32;
                let classified = enforcer_error_to_classified(err, "remote_api");
                self.runner
                    .on_failure(
                        job.id,
                        attempt.id,
                        &self.worker_id,
                        latency_ms,
                        &classified,
                        job.attempts_made,
                        job.max_attempts,
                    )
                    .await
            }
        }
    }
}

fn enforcer_error_to_classified(err: EnforcerError<ClassifiedError>, origin: &str) -> ClassifiedError {
    match err {
        EnforcerError::TimedOut(dur) => ClassifiedError::new(
            ErrorKind::Timeout,
            format!("job execution timed out after {:?}", dur),
            origin,
        ),
        EnforcerError::SemaphoreClosed => {
            ClassifiedError::new(ErrorKind::Unknown, "worker shutting down", origin)
        }
        EnforcerError::Inner(classified) => classified,
    }
}
