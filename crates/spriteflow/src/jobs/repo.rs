use crate::api::models::JobListItem;
use crate::jobs::model::{Job, JobStatus, NewJob};
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct JobsRepo {
    pool: PgPool,
}

impl JobsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ----------------------------
    // Enqueue
    // ----------------------------

    pub async fn enqueue(&self, job: NewJob) -> anyhow::Result<Uuid> {
        let rec = sqlx::query!(
            r#"
            INSERT INTO jobs (
                user_id, queue, prompt_json, fingerprint, correlation_id,
                run_at, status, priority, max_attempts, timeout_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
            job.user_id,
            job.queue,
            job.prompt_json,
            job.fingerprint,
            job.correlation_id,
            job.run_at,
            JobStatus::Queued.as_str(),
            job.priority,
            job.max_attempts,
            job.timeout_ms,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(rec.id)
    }

    // ----------------------------
    // Reads
    // ----------------------------

    pub async fn get_job(&self, job_id: Uuid) -> anyhow::Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    pub async fn find_by_fingerprint(
        &self,
        user_id: &str,
        fingerprint: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            WHERE user_id = $1 AND fingerprint = $2 AND created_at >= $3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(fingerprint)
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    pub async fn count_active_for_user(&self, user_id: &str) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM jobs
            WHERE user_id = $1
              AND status IN ('queued', 'active', 'polling', 'retrying')
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn count_active_system_wide(&self) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM jobs
            WHERE status IN ('queued', 'active', 'polling', 'retrying')
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    // ----------------------------
    // List / DLQ views (Admin API support)
    // ----------------------------

    pub async fn list_jobs(
        &self,
        queue: Option<&str>,
        status: Option<&str>,
        limit: i64,
        cursor_created_at: Option<DateTime<Utc>>,
        cursor_id: Option<Uuid>,
    ) -> anyhow::Result<Vec<JobListItem>> {
        let limit = limit.clamp(1, 500);

        let rows = match (queue, status, cursor_created_at, cursor_id) {
            (Some(q), Some(st), Some(ca), Some(cid)) => {
                sqlx::query_as::<_, JobListItem>(
                    r#"
                    SELECT id, queue, user_id, status, run_at, priority, max_attempts,
                           attempts_made, dlq_reason_code, created_at, updated_at
                    FROM jobs
                    WHERE queue = $1 AND status = $2 AND (created_at, id) < ($3, $4)
                    ORDER BY created_at DESC, id DESC
                    LIMIT $5
                    "#,
                )
                .bind(q)
                .bind(st)
                .bind(ca)
                .bind(cid)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            (Some(q), Some(st), _, _) => {
                sqlx::query_as::<_, JobListItem>(
                    r#"
                    SELECT id, queue, user_id, status, run_at, priority, max_attempts,
                           attempts_made, dlq_reason_code, created_at, updated_at
                    FROM jobs
                    WHERE queue = $1 AND status = $2
                    ORDER BY created_at DESC, id DESC
                    LIMIT $3
                    "#,
                )
                .bind(q)
                .bind(st)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            (Some(q), None, Some(ca), Some(cid)) => {
                sqlx::query_as::<_, JobListItem>(
                    r#"
                    SELECT id, queue, user_id, status, run_at, priority, max_attempts,
                           attempts_made, dlq_reason_code, created_at, updated_at
                    FROM jobs
                    WHERE queue = $1 AND (created_at, id) < ($2, $3)
                    ORDER BY created_at DESC, id DESC
                    LIMIT $4
                    "#,
                )
                .bind(q)
                .bind(ca)
                .bind(cid)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            (Some(q), None, _, _) => {
                sqlx::query_as::<_, JobListItem>(
                    r#"
                    SELECT id, queue, user_id, status, run_at, priority, max_attempts,
                           attempts_made, dlq_reason_code, created_at, updated_at
                    FROM jobs
                    WHERE queue = $1
                    ORDER BY created_at DESC, id DESC
                    LIMIT $2
                    "#,
                )
                .bind(q)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            (None, Some(st), Some(ca), Some(cid)) => {
                sqlx::query_as::<_, JobListItem>(
                    r#"
                    SELECT id, queue, user_id, status, run_at, priority, max_attempts,
                           attempts_made, dlq_reason_code, created_at, updated_at
                    FROM jobs
                    WHERE status = $1 AND (created_at, id) < ($2, $3)
                    ORDER BY created_at DESC, id DESC
                    LIMIT $4
                    "#,
                )
                .bind(st)
                .bind(ca)
                .bind(cid)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            (None, Some(st), _, _) => {
                sqlx::query_as::<_, JobListItem>(
                    r#"
                    SELECT id, queue, user_id, status, run_at, priority, max_attempts,
                           attempts_made, dlq_reason_code, created_at, updated_at
                    FROM jobs
                    WHERE status = $1
                    ORDER BY created_at DESC, id DESC
                    LIMIT $2
                    "#,
                )
                .bind(st)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            (None, None, Some(ca), Some(cid)) => {
                sqlx::query_as::<_, JobListItem>(
                    r#"
                    SELECT id, queue, user_id, status, run_at, priority, max_attempts,
                           attempts_made, dlq_reason_code, created_at, updated_at
                    FROM jobs
                    WHERE (created_at, id) < ($1, $2)
                    ORDER BY created_at DESC, id DESC
                    LIMIT $3
                    "#,
                )
                .bind(ca)
                .bind(cid)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            (None, None, _, _) => {
                sqlx::query_as::<_, JobListItem>(
                    r#"
                    SELECT id, queue, user_id, status, run_at, priority, max_attempts,
                           attempts_made, dlq_reason_code, created_at, updated_at
                    FROM jobs
                    ORDER BY created_at DESC, id DESC
                    LIMIT $1
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows)
    }

    // ----------------------------
    // Metrics snapshot (for /metrics)
    // ----------------------------

    /// Returns: (queued, active, completed_last_60s, failed_or_dlq_last_60s)
    pub async fn metrics_snapshot(&self) -> anyhow::Result<(i64, i64, i64, i64)> {
        let queued: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = 'queued'")
            .fetch_one(&self.pool)
            .await?;

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE status IN ('active', 'polling', 'retrying')",
        )
        .fetch_one(&self.pool)
        .await?;

        let completed_last_60s: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM jobs
            WHERE status = 'completed'
              AND updated_at >= now() - interval '60 seconds'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let failed_last_60s: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM jobs
            WHERE status IN ('failed', 'dlq')
              AND updated_at >= now() - interval '60 seconds'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok((queued, active, completed_last_60s, failed_last_60s))
    }

    // ----------------------------
    // Leasing + Storm Control + Policy Decisions Log
    // ----------------------------

    /// Lease exactly one runnable job for this worker.
    pub async fn lease_one_job(
        &self,
        queue: &str,
        worker_id: &str,
        lease_seconds: i64,
    ) -> anyhow::Result<Option<Job>> {
        let mut tx = self.pool.begin().await?;

        let policy = sqlx::query_as::<_, (i32, i32, i32)>(
            r#"
            SELECT max_attempts_per_minute, max_in_flight, throttle_delay_ms
            FROM queue_policies
            WHERE queue = $1
            "#,
        )
        .bind(queue)
        .fetch_optional(&mut *tx)
        .await?;

        let (max_attempts_per_minute, max_in_flight, throttle_delay_ms) =
            policy.unwrap_or((i32::MAX / 4, i32::MAX / 4, 250));

        let in_flight: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM jobs
            WHERE queue = $1 AND status IN ('active', 'polling')
            "#,
        )
        .bind(queue)
        .fetch_one(&mut *tx)
        .await?;

        let attempts_last_min: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM job_attempts a
            JOIN jobs j ON j.id = a.job_id
            WHERE j.queue = $1
              AND a.started_at >= now() - interval '60 seconds'
            "#,
        )
        .bind(queue)
        .fetch_one(&mut *tx)
        .await?;

        let candidate = sqlx::query_as::<_, Job>(
            r#"
            SELECT *
            FROM jobs
            WHERE queue = $1
              AND status IN ('queued', 'retrying')
              AND run_at <= now()
            ORDER BY priority DESC, run_at ASC, created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
            "#,
        )
        .bind(queue)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        let job_id = job.id;

        if in_flight >= max_in_flight as i64 {
            self.record_throttle(&mut tx, job_id, queue, "IN_FLIGHT_EXCEEDED", json!({
                "in_flight": in_flight,
                "max_in_flight": max_in_flight,
                "throttle_delay_ms": throttle_delay_ms
            }), throttle_delay_ms)
            .await?;
            tx.commit().await?;
            return Ok(None);
        }

        if attempts_last_min >= max_attempts_per_minute as i64 {
            self.record_throttle(&mut tx, job_id, queue, "RETRY_RATE_EXCEEDED", json!({
                "attempts_last_minute": attempts_last_min,
                "max_attempts_per_minute": max_attempts_per_minute,
                "throttle_delay_ms": throttle_delay_ms
            }), throttle_delay_ms)
            .await?;
            tx.commit().await?;
            return Ok(None);
        }

        let leased = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = 'active',
                locked_by = $2,
                locked_at = now(),
                lock_expires_at = now() + ($3::int * interval '1 second'),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(lease_seconds)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(leased))
    }

    /// Lease up to `batch_size` runnable jobs in one pass, skipping per-queue
    /// storm-control the same way [`lease_one_job`] does, one candidate at a time.
    pub async fn lease_jobs_batch(
        &self,
        queue: &str,
        worker_id: &str,
        lease_seconds: i64,
        batch_size: i64,
    ) -> anyhow::Result<Vec<Job>> {
        let mut leased = Vec::new();
        for _ in 0..batch_size {
            match self.lease_one_job(queue, worker_id, lease_seconds).await? {
                Some(job) => leased.push(job),
                None => break,
            }
        }
        Ok(leased)
    }

    async fn record_throttle(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: Uuid,
        queue: &str,
        reason_code: &str,
        mut details: serde_json::Value,
        throttle_delay_ms: i32,
    ) -> anyhow::Result<()> {
        if let Some(obj) = details.as_object_mut() {
            obj.insert("queue".into(), json!(queue));
        }

        let decision_id = Uuid::new_v4();
        sqlx::query!(
            r#"
            INSERT INTO policy_decisions (id, job_id, decision, reason_code, details_json)
            VALUES ($1, $2, 'THROTTLED', $3, $4)
            "#,
            decision_id,
            job_id,
            reason_code,
            details
        )
        .execute(&mut **tx)
        .await?;

        sqlx::query!(
            r#"
            UPDATE jobs
            SET run_at = now() + ($2::int * interval '1 millisecond'),
                updated_at = now()
            WHERE id = $1
            "#,
            job_id,
            throttle_delay_ms
        )
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    // ----------------------------
    // Maintenance
    // ----------------------------

    pub async fn reap_expired_locks(&self) -> anyhow::Result<u64> {
        let res = sqlx::query!(
            r#"
            UPDATE jobs
            SET status = 'queued',
                locked_at = NULL,
                locked_by = NULL,
                lock_expires_at = NULL,
                updated_at = now()
            WHERE status IN ('active', 'polling')
              AND lock_expires_at IS NOT NULL
              AND lock_expires_at < now()
            "#
        )
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected())
    }

    // ----------------------------
    // State transitions
    // ----------------------------

    /// Jobs this worker currently owns that are waiting on the remote
    /// renderer. Polled on a fixed interval rather than re-leased through
    /// [`lease_one_job`], since they aren't runnable candidates anymore.
    pub async fn list_polling_for_worker(&self, worker_id: &str, limit: i64) -> anyhow::Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            WHERE status = 'polling' AND locked_by = $1
                AND (next_poll_at IS NULL OR next_poll_at <= now())
            ORDER BY updated_at ASC
            LIMIT $2
            "#,
        )
        .bind(worker_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    /// Extends the lock on a job still being polled, bumps its poll-attempt
    /// counter, and schedules the next poll `retry_after_s` seconds out, per
    /// the remote renderer's advertised wait. Returns the new attempt count
    /// so the caller can compare it against `max_attempts`.
    pub async fn schedule_next_poll(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease_seconds: i64,
        retry_after_s: i64,
    ) -> anyhow::Result<i32> {
        let rec = sqlx::query!(
            r#"
            UPDATE jobs
            SET lock_expires_at = now() + ($3::int * interval '1 second'),
                next_poll_at = now() + ($4::int * interval '1 second'),
                poll_attempts = poll_attempts + 1,
                updated_at = now()
            WHERE id = $1 AND locked_by = $2
            RETURNING poll_attempts
            "#,
            job_id,
            worker_id,
            lease_seconds as i32,
            retry_after_s as i32,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(rec.poll_attempts)
    }

    pub async fn mark_polling(&self, job_id: Uuid, worker_id: &str, remote_job_id: &str) -> anyhow::Result<()> {
        sqlx::query!(
            r#"
            UPDATE jobs
            SET status = 'polling',
                remote_job_id = $3,
                updated_at = now()
            WHERE id = $1 AND locked_by = $2
            "#,
            job_id,
            worker_id,
            remote_job_id
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_completed(
        &self,
        job_id: Uuid,
        worker_id: &str,
        result_json: serde_json::Value,
    ) -> anyhow::Result<()> {
        sqlx::query!(
            r#"
            UPDATE jobs
            SET status = 'completed',
                result_json = $3,
                locked_at = NULL,
                locked_by = NULL,
                lock_expires_at = NULL,
                updated_at = now()
            WHERE id = $1 AND locked_by = $2
            "#,
            job_id,
            worker_id,
            result_json
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn reschedule_for_retry(
        &self,
        job_id: Uuid,
        next_run_at: DateTime<Utc>,
        attempts_made: i32,
    ) -> anyhow::Result<()> {
        sqlx::query!(
            r#"
            UPDATE jobs
            SET status = 'retrying',
                run_at = $2,
                attempts_made = $3,
                locked_at = NULL,
                locked_by = NULL,
                lock_expires_at = NULL,
                updated_at = now()
            WHERE id = $1
            "#,
            job_id,
            next_run_at,
            attempts_made
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn mark_failed(&self, job_id: Uuid, worker_id: &str) -> anyhow::Result<()> {
        sqlx::query!(
            r#"
            UPDATE jobs
            SET status = 'failed',
                locked_at = NULL,
                locked_by = NULL,
                lock_expires_at = NULL,
                updated_at = now()
            WHERE id = $1 AND locked_by = $2
            "#,
            job_id,
            worker_id
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn mark_dlq(&self, job_id: Uuid, worker_id: &str, reason_code: &str) -> anyhow::Result<()> {
        sqlx::query!(
            r#"
            UPDATE jobs
            SET status = 'dlq',
                dlq_reason_code = $3,
                dlq_at = now(),
                locked_at = NULL,
                locked_by = NULL,
                lock_expires_at = NULL,
                updated_at = now()
            WHERE id = $1 AND locked_by = $2
            "#,
            job_id,
            worker_id,
            reason_code
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ----------------------------
    // Replay
    // ----------------------------

    pub async fn replay_job(
        &self,
        job_id: Uuid,
        override_queue: Option<&str>,
        override_run_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<ReplayResult> {
        let mut tx = self.pool.begin().await?;

        let src = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_one(&mut *tx)
            .await?;

        let new_queue = override_queue.unwrap_or(src.queue.as_str()).to_string();
        let new_run_at = override_run_at.unwrap_or_else(Utc::now);
        let replay_token = format!("{job_id}-retry-{}", Utc::now().timestamp());

        let rec = sqlx::query!(
            r#"
            INSERT INTO jobs (
                user_id, queue, prompt_json, fingerprint, correlation_id,
                run_at, status, priority, max_attempts, timeout_ms,
                replay_token, retried_from_dlq
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'queued', $7, $8, $9, $10, true)
            RETURNING id
            "#,
            src.user_id,
            new_queue,
            src.prompt_json,
            src.fingerprint,
            src.correlation_id,
            new_run_at,
            src.priority,
            src.max_attempts,
            src.timeout_ms,
            replay_token,
        )
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ReplayResult {
            job_id: rec.id,
            replay_token,
        })
    }
}

/// Result of replaying a job (typically out of the DLQ). `job_id` is the
/// fresh row's UUID primary key; `replay_token` is the human-facing
/// `{orig}-retry-{timestamp}` lineage marker stamped on it.
#[derive(Debug, Clone)]
pub struct ReplayResult {
    pub job_id: Uuid,
    pub replay_token: String,
}
