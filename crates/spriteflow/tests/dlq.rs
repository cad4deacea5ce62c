mod common;

use common::setup_db;
use serde_json::json;
use spriteflow::jobs::classifier::{ClassifiedError, ErrorKind};
use spriteflow::jobs::retry::RetryConfig;
use spriteflow::jobs::runner::JobRunner;
use spriteflow::jobs::{AttemptsRepo, JobsRepo};

use sqlx::Row;
use std::time::Instant;
use uuid::Uuid;

async fn insert_job(pool: &sqlx::PgPool, queue: &str, max_attempts: i32) -> Uuid {
    let prompt = json!({"description": "a sprite", "width": 32, "height": 32});
    let fingerprint = format!("fp-{}", Uuid::new_v4());
    let correlation_id = Uuid::new_v4().to_string();

    let rec = sqlx::query!(
        r#"
        INSERT INTO jobs (
            user_id, queue, prompt_json, fingerprint, correlation_id,
            run_at, status, priority, max_attempts, timeout_ms
        )
        VALUES ('test-user', $1, $2, $3, $4, now(), 'queued', 0, $5, 30000)
        RETURNING id
        "#,
        queue,
        prompt,
        fingerprint,
        correlation_id,
        max_attempts
    )
    .fetch_one(pool)
    .await
    .expect("insert job failed");

    rec.id
}

#[tokio::test]
async fn exhausted_retries_moves_job_to_dlq_and_preserves_attempts() {
    let pool = setup_db().await;

    let jobs = JobsRepo::new(pool.clone());
    let attempts = AttemptsRepo::new(pool.clone());
    let runner = JobRunner::new(jobs.clone(), attempts.clone(), RetryConfig::default());

    // max_attempts = 2 -> attempt 1 retry, attempt 2 -> DLQ
    let job_id = insert_job(&pool, "default", 2).await;

    let job = jobs
        .lease_one_job("default", "worker-1", 30)
        .await
        .unwrap()
        .expect("should lease job");
    assert_eq!(job.id, job_id);

    let a1 = attempts.start_attempt(job_id, "worker-1").await.unwrap();
    let start = Instant::now();
    let err1 = ClassifiedError::new(ErrorKind::Timeout, "sim timeout", "remote_api");
    runner
        .on_failure(
            job_id,
            a1.id,
            "worker-1",
            start.elapsed().as_millis() as i32,
            &err1,
            a1.attempt_no,
            job.max_attempts,
        )
        .await
        .unwrap();

    // Re-lease after reschedule: force it runnable now for test simplicity
    sqlx::query!("UPDATE jobs SET run_at = now() WHERE id = $1", job_id)
        .execute(&pool)
        .await
        .unwrap();

    let job2 = jobs
        .lease_one_job("default", "worker-1", 30)
        .await
        .unwrap()
        .expect("should lease again");
    assert_eq!(job2.id, job_id);

    let a2 = attempts.start_attempt(job_id, "worker-1").await.unwrap();
    let start2 = Instant::now();
    let err2 = ClassifiedError::new(ErrorKind::Timeout, "sim timeout", "remote_api");
    runner
        .on_failure(
            job_id,
            a2.id,
            "worker-1",
            start2.elapsed().as_millis() as i32,
            &err2,
            a2.attempt_no,
            job2.max_attempts,
        )
        .await
        .unwrap();

    let row = sqlx::query("SELECT status, dlq_reason_code, dlq_at FROM jobs WHERE id = $1")
        .bind(job_id)
        .fetch_one(&pool)
        .await
        .unwrap();

    let status: String = row.get("status");
    let dlq_reason_code: Option<String> = row.get("dlq_reason_code");
    let dlq_at: Option<chrono::DateTime<chrono::Utc>> = row.get("dlq_at");

    assert_eq!(status, "dlq");
    assert_eq!(dlq_reason_code.as_deref(), Some("MAX_ATTEMPTS_EXCEEDED"));
    assert!(dlq_at.is_some(), "dlq_at should be set");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_attempts WHERE job_id = $1")
        .bind(job_id)
        .fetch_one(&pool)
        .await
        .unwrap();

    assert_eq!(count, 2, "attempt history must be preserved");
}

#[tokio::test]
async fn non_retryable_goes_to_dlq_immediately() {
    let pool = setup_db().await;

    let jobs = JobsRepo::new(pool.clone());
    let attempts = AttemptsRepo::new(pool.clone());
    let runner = JobRunner::new(jobs.clone(), attempts.clone(), RetryConfig::default());

    let job_id = insert_job(&pool, "default", 10).await;

    let job = jobs
        .lease_one_job("default", "worker-1", 30)
        .await
        .unwrap()
        .expect("should lease job");
    assert_eq!(job.id, job_id);

    let a1 = attempts.start_attempt(job_id, "worker-1").await.unwrap();

    let err = ClassifiedError::new(ErrorKind::ValidationError, "invalid json", "remote_api");
    runner
        .on_failure(
            job_id,
            a1.id,
            "worker-1",
            1,
            &err,
            a1.attempt_no,
            job.max_attempts,
        )
        .await
        .unwrap();

    let (status, reason): (String, Option<String>) =
        sqlx::query_as("SELECT status, dlq_reason_code FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_one(&pool)
            .await
            .unwrap();

    assert_eq!(status, "dlq");
    assert_eq!(reason.as_deref(), Some("NON_RETRYABLE"));
}
