mod common;

use common::setup_db;

use serde_json::json;
use spriteflow::jobs::timeline::build_timeline;
use spriteflow::jobs::{AttemptsRepo, JobsRepo, PolicyDecisionsRepo};

use uuid::Uuid;

async fn insert_job(pool: &sqlx::PgPool) -> Uuid {
    let prompt = json!({"description": "a sprite", "width": 32, "height": 32});
    let rec = sqlx::query!(
        r#"
        INSERT INTO jobs (
            user_id, queue, prompt_json, fingerprint, correlation_id,
            run_at, status, priority, max_attempts, timeout_ms
        )
        VALUES ('test-user', 'default', $1, 'fp-1', 'corr-1', now(), 'queued', 0, 5, 30000)
        RETURNING id
        "#,
        prompt
    )
    .fetch_one(pool)
    .await
    .unwrap();

    rec.id
}

#[tokio::test]
async fn timeline_surfaces_error_kind_from_the_last_failed_attempt() {
    let pool = setup_db().await;

    let jobs = JobsRepo::new(pool.clone());
    let attempts = AttemptsRepo::new(pool.clone());
    let policy = PolicyDecisionsRepo::new(pool.clone());

    let job_id = insert_job(&pool).await;

    let job = jobs
        .lease_one_job("default", "worker-1", 30)
        .await
        .unwrap()
        .expect("should lease job");
    assert_eq!(job.id, job_id);

    let attempt = attempts.start_attempt(job_id, "worker-1").await.unwrap();

    attempts
        .finish_failed(attempt.id, 12, "rate_limit", "429 from upstream")
        .await
        .unwrap();

    let tl = build_timeline(&jobs, &attempts, &policy, job_id)
        .await
        .unwrap()
        .expect("timeline exists");

    let a1 = tl.attempts.first().expect("has attempts");
    assert_eq!(a1.error_kind.as_deref(), Some("rate_limit"));
    assert_eq!(a1.error_message.as_deref(), Some("429 from upstream"));

    let last_error = tl.last_error.expect("last_error populated from failed attempt");
    assert_eq!(last_error.error_kind.as_deref(), Some("rate_limit"));
}
