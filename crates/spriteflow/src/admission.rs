use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::cache::{cache_get, cache_put};
use crate::config::Config;
use crate::correlation::new_correlation_id;
use crate::errors::OrchestratorError;
use crate::fingerprint::fingerprint_prompt;
use crate::jobs::enqueue_guard::EnqueueGuard;
use crate::jobs::model::{JobStatus, NewJob};
use crate::jobs::repo::JobsRepo;
use crate::kv::KvStore;
use crate::prompt::StructuredPrompt;

/// Outcome of an admission attempt. A cache hit returns a stored artifact
/// without touching the queue at all; a duplicate submission within the
/// dedup window returns the existing job id instead of enqueuing a new
/// row, so retried client requests are idempotent.
#[derive(Debug, Clone)]
pub enum AdmissionOutcome {
    CacheHit { job_id: Uuid, artifact: Value },
    Enqueued { job_id: Uuid, correlation_id: String },
    Deduplicated { job_id: Uuid, correlation_id: String },
}

/// Everything a render request has to pass before it becomes a row in
/// the jobs table: structural validation, content-addressed cache lookup,
/// fingerprint-based de-duplication, and per-user/system-wide concurrency
/// limits. Mirrors the enqueue-time checks the worker's ingest guard
/// already performs at the payload/rate level, one layer up.
#[derive(Clone)]
pub struct AdmissionController {
    jobs: JobsRepo,
    guard: EnqueueGuard,
    kv: Arc<dyn KvStore>,
    max_jobs_per_user: i64,
    system_queue_limit: i64,
    dedup_window_s: i64,
    cache_ttl: Duration,
}

impl AdmissionController {
    pub fn new(jobs: JobsRepo, guard: EnqueueGuard, kv: Arc<dyn KvStore>, cfg: &Config) -> Self {
        Self {
            jobs,
            guard,
            kv,
            max_jobs_per_user: cfg.queue_limits.max_jobs_per_user,
            system_queue_limit: cfg.queue_limits.system_queue_limit,
            dedup_window_s: cfg.dedup_window_s,
            cache_ttl: Duration::from_secs((cfg.cache.ttl_days.max(1) as u64) * 24 * 60 * 60),
        }
    }

    pub async fn admit(
        &self,
        user_id: &str,
        queue: &str,
        prompt: StructuredPrompt,
        priority: i32,
        max_attempts: i32,
        timeout_ms: i64,
    ) -> Result<AdmissionOutcome, OrchestratorError> {
        prompt
            .validate()
            .map_err(|e| OrchestratorError::Validation(e.to_string()))?;

        let prompt_json =
            serde_json::to_value(&prompt).map_err(|e| OrchestratorError::Other(e.into()))?;
        let payload_bytes = prompt_json.to_string().len();

        self.guard
            .check_payload(queue, payload_bytes)
            .await
            .map_err(|e| OrchestratorError::Validation(e.to_string()))?;
        self.guard
            .check_rate(queue)
            .await
            .map_err(|e| OrchestratorError::Validation(e.to_string()))?;

        let fingerprint = fingerprint_prompt(&prompt_json);

        if let Some(artifact) = cache_get(self.kv.as_ref(), &fingerprint).await {
            return Ok(AdmissionOutcome::CacheHit {
                job_id: Uuid::new_v4(),
                artifact,
            });
        }

        if let Some(existing) = self.find_existing(user_id, &fingerprint).await? {
            return Ok(AdmissionOutcome::Deduplicated {
                job_id: existing.0,
                correlation_id: existing.1,
            });
        }

        let active_for_user = self.jobs.count_active_for_user(user_id).await?;
        if active_for_user >= self.max_jobs_per_user {
            return Err(OrchestratorError::QuotaExceeded(format!(
                "user already has {active_for_user} active jobs"
            )));
        }

        let active_system_wide = self.jobs.count_active_system_wide().await?;
        if active_system_wide >= self.system_queue_limit {
            return Err(OrchestratorError::SystemQueueFull);
        }

        let correlation_id = new_correlation_id();

        let job_id = self
            .jobs
            .enqueue(NewJob {
                user_id: user_id.to_string(),
                queue: queue.to_string(),
                prompt_json,
                fingerprint: fingerprint.clone(),
                correlation_id: correlation_id.clone(),
                run_at: Utc::now(),
                priority,
                max_attempts,
                timeout_ms,
            })
            .await?;

        self.remember_fingerprint(user_id, &fingerprint, job_id, &correlation_id)
            .await;

        Ok(AdmissionOutcome::Enqueued {
            job_id,
            correlation_id,
        })
    }

    /// Writes a completed job's artifact into the content-addressed cache
    /// so future submissions with the same fingerprint short-circuit.
    pub async fn record_completed_artifact(&self, fingerprint: &str, artifact: &Value) {
        cache_put(self.kv.as_ref(), fingerprint, artifact, self.cache_ttl).await;
    }

    /// Checks the fast-path dedup cache first, falling back to the durable
    /// fingerprint index on a cache miss (e.g. after a restart).
    async fn find_existing(
        &self,
        user_id: &str,
        fingerprint: &str,
    ) -> Result<Option<(Uuid, String)>, OrchestratorError> {
        let cache_key = dedup_cache_key(user_id, fingerprint);
        if let Ok(Some(bytes)) = self.kv.get(&cache_key).await {
            if let Ok(cached) = serde_json::from_slice::<CachedDedup>(&bytes) {
                return Ok(Some((cached.job_id, cached.correlation_id)));
            }
        }

        let since = Utc::now() - chrono::Duration::seconds(self.dedup_window_s);
        let existing = self.jobs.find_by_fingerprint(user_id, fingerprint, since).await?;

        // A job that already failed or landed in the DLQ isn't a valid
        // dedup target; the caller should be free to try again.
        Ok(existing.and_then(|job| match JobStatus::from_str(&job.status) {
            Some(JobStatus::Failed) | Some(JobStatus::Dlq) | None => None,
            Some(_) => Some((job.id, job.correlation_id)),
        }))
    }

    async fn remember_fingerprint(
        &self,
        user_id: &str,
        fingerprint: &str,
        job_id: Uuid,
        correlation_id: &str,
    ) {
        let cache_key = dedup_cache_key(user_id, fingerprint);
        let cached = CachedDedup {
            job_id,
            correlation_id: correlation_id.to_string(),
        };
        if let Ok(bytes) = serde_json::to_vec(&cached) {
            let ttl = Duration::from_secs(self.dedup_window_s.max(1) as u64);
            let _ = self.kv.set(&cache_key, bytes, ttl).await;
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct CachedDedup {
    job_id: Uuid,
    correlation_id: String,
}

fn dedup_cache_key(user_id: &str, fingerprint: &str) -> String {
    format!("dedup:{user_id}:{fingerprint}")
}
