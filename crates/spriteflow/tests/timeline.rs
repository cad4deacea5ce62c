mod common;

use common::setup_db;
use serde_json::json;

use spriteflow::jobs::timeline::build_timeline;
use spriteflow::jobs::{AttemptsRepo, JobsRepo, PolicyDecisionsRepo};

use uuid::Uuid;

#[tokio::test]
async fn timeline_shows_attempt_story() {
    let pool = setup_db().await;

    let jobs = JobsRepo::new(pool.clone());
    let attempts = AttemptsRepo::new(pool.clone());
    let policy = PolicyDecisionsRepo::new(pool.clone());

    let prompt = json!({"description": "a sprite", "width": 32, "height": 32});
    let job_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO jobs (
            user_id, queue, prompt_json, fingerprint, correlation_id,
            run_at, status, priority, max_attempts, timeout_ms
        )
        VALUES ('test-user', 'default', $1, 'fp-timeline', 'corr-timeline', now(), 'queued', 0, 5, 30000)
        RETURNING id
        "#,
    )
    .bind(prompt)
    .fetch_one(&pool)
    .await
    .unwrap();

    // Attempt 1 fails
    let leased = jobs
        .lease_one_job("default", "worker-a", 30)
        .await
        .unwrap()
        .unwrap();

    let a1 = attempts.start_attempt(leased.id, "worker-a").await.unwrap();
    attempts
        .finish_failed(a1.id, 10, "timeout", "request timed out")
        .await
        .unwrap();

    // mimic retry scheduling
    jobs.reschedule_for_retry(job_id, chrono::Utc::now(), 1)
        .await
        .unwrap();

    // Attempt 2 succeeds
    let leased2 = jobs
        .lease_one_job("default", "worker-b", 30)
        .await
        .unwrap()
        .unwrap();

    let a2 = attempts
        .start_attempt(leased2.id, "worker-b")
        .await
        .unwrap();
    attempts.finish_succeeded(a2.id, 5).await.unwrap();
    jobs.mark_completed(job_id, "worker-b", json!({"ok": true}))
        .await
        .unwrap();

    let tl = build_timeline(&jobs, &attempts, &policy, job_id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(tl.job_id, job_id);
    assert_eq!(tl.status, "completed");
    assert_eq!(tl.last_worker_id.as_deref(), Some("worker-b"));
    assert_eq!(tl.attempts.len(), 2);

    assert_eq!(tl.attempts[0].attempt_no, 1);
    assert_eq!(tl.attempts[0].status, "failed");
    assert_eq!(tl.attempts[0].error_kind.as_deref(), Some("timeout"));

    assert_eq!(tl.attempts[1].attempt_no, 2);
    assert_eq!(tl.attempts[1].status, "succeeded");
}
