use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

#[derive(Clone)]
pub struct MaintenanceRepo {
    pool: PgPool,
}

impl MaintenanceRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Move completed jobs older than `cutoff` into jobs_archive (idempotent).
    /// Returns number archived.
    pub async fn archive_completed_older_than(
        &self,
        cutoff: DateTime<Utc>,
        batch: i64,
    ) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await?;

        let _inserted = sqlx::query(
            r#"
            WITH candidates AS (
                SELECT
                  id, user_id, queue, prompt_json, fingerprint, correlation_id,
                  run_at, status, priority, max_attempts, attempts_made,
                  result_json, dlq_reason_code, dlq_at,
                  created_at, updated_at
                FROM jobs
                WHERE status = 'completed'
                  AND updated_at < $1
                ORDER BY updated_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT $2
            )
            INSERT INTO jobs_archive (
              id, user_id, queue, prompt_json, fingerprint, correlation_id,
              run_at, status, priority, max_attempts, attempts_made,
              result_json, dlq_reason_code, dlq_at,
              created_at, updated_at
            )
            SELECT
              c.id, c.user_id, c.queue, c.prompt_json, c.fingerprint, c.correlation_id,
              c.run_at, c.status, c.priority, c.max_attempts, c.attempts_made,
              c.result_json, c.dlq_reason_code, c.dlq_at,
              c.created_at, c.updated_at
            FROM candidates c
            WHERE NOT EXISTS (
              SELECT 1 FROM jobs_archive a WHERE a.id = c.id
            )
            "#,
        )
        .bind(cutoff)
        .bind(batch)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let deleted = sqlx::query(
            r#"
            DELETE FROM jobs j
            USING jobs_archive a
            WHERE j.id = a.id
              AND j.status = 'completed'
              AND j.updated_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        Ok(deleted)
    }

    /// Delete attempts + policy decisions for completed jobs older than `cutoff`.
    /// Returns (attempts_deleted, policy_deleted).
    pub async fn delete_history_for_completed_older_than(
        &self,
        cutoff: DateTime<Utc>,
        batch: i64,
    ) -> anyhow::Result<(u64, u64)> {
        let mut tx = self.pool.begin().await?;

        let job_ids: Vec<uuid::Uuid> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM jobs
            WHERE status = 'completed'
              AND updated_at < $1
            ORDER BY updated_at ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(batch)
        .fetch_all(&mut *tx)
        .await?;

        if job_ids.is_empty() {
            tx.commit().await?;
            return Ok((0, 0));
        }

        let attempts_deleted = sqlx::query!(
            "DELETE FROM job_attempts WHERE job_id = ANY($1)",
            &job_ids
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let policy_deleted = sqlx::query!(
            "DELETE FROM policy_decisions WHERE job_id = ANY($1)",
            &job_ids
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok((attempts_deleted, policy_deleted))
    }
}

/// Convenience: compute cutoff like "now - N days"
pub fn cutoff_days(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}
