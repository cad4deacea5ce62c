use spriteflow::admission::AdmissionController;
use spriteflow::api;
use spriteflow::config;
use spriteflow::db;
use spriteflow::kv::{InMemoryKvStore, KvStore, RedisKvStore};
use spriteflow::logging;
use spriteflow::ratelimit::RateLimiter;
use spriteflow::remote_client::RemoteClient;

use spriteflow::jobs::enqueue_guard::{EnqueueGuard, EnqueueGuardConfig};
use spriteflow::jobs::ingest_decisions::IngestDecisionsRepo;
use spriteflow::jobs::maintenance::{cutoff_days, MaintenanceRepo};
use spriteflow::jobs::metrics::MetricsRepo;
use spriteflow::jobs::retry::RetryConfig;
use spriteflow::jobs::runner::JobRunner;
use spriteflow::jobs::{AttemptsRepo, DlqRepo, JobsRepo, PolicyDecisionsRepo};
use spriteflow::timeout_enforcer::TimeoutEnforcer;

mod pipeline;
use pipeline::Pipeline;

use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cfg = config::Config::from_env()?;

    let queue = cfg.queue.clone();
    let lease_seconds = cfg.lease_seconds;
    let dequeue_batch_size = cfg.dequeue_batch_size;
    let reap_interval = Duration::from_millis(cfg.reap_interval_ms);
    let verbose_job_logs = cfg.verbose_job_logs;
    let api_addr = cfg.admin_addr.clone();

    let archive_after_days: i64 = std::env::var("ARCHIVE_COMPLETED_AFTER_DAYS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(7);
    let prune_history_after_days: i64 = std::env::var("PRUNE_HISTORY_AFTER_DAYS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(7);
    let maintenance_interval_secs: u64 = std::env::var("MAINTENANCE_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(60);

    tracing::info!(
        worker_id = %cfg.worker_id,
        queue = %queue,
        lease_seconds,
        dequeue_batch_size,
        reap_interval_ms = cfg.reap_interval_ms,
        verbose_job_logs,
        admin_api = %api_addr.clone().unwrap_or_else(|| "disabled".to_string()),
        migrate_on_startup = cfg.migrate_on_startup,
        archive_after_days,
        prune_history_after_days,
        maintenance_interval_secs,
        "spriteworker starting"
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let jobs_repo = JobsRepo::new(pool.clone());
    let attempts_repo = AttemptsRepo::new(pool.clone());
    let policy_decisions_repo = PolicyDecisionsRepo::new(pool.clone());
    let ingest_decisions_repo = IngestDecisionsRepo::new(pool.clone());
    let maintenance_repo = MaintenanceRepo::new(pool.clone());
    let metrics_repo = MetricsRepo::new(pool.clone());
    let dlq_repo = DlqRepo::new(jobs_repo.clone());
    let enqueue_guard = EnqueueGuard::new(
        pool.clone(),
        ingest_decisions_repo.clone(),
        EnqueueGuardConfig {
            max_payload_bytes: cfg.max_payload_bytes,
            max_enqueues_per_minute_per_queue: cfg.max_enqueues_per_minute_per_queue,
        },
    );

    let kv: Arc<dyn KvStore> = match RedisKvStore::connect(&cfg.redis_url()).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(error = %e, "could not connect to redis, falling back to in-memory dedup cache");
            Arc::new(InMemoryKvStore::new())
        }
    };
    let rate_limiter = RateLimiter::new(cfg.rate_limit.requests_per_minute, cfg.rate_limit.enabled);
    let admission = AdmissionController::new(jobs_repo.clone(), enqueue_guard.clone(), kv, &cfg);

    let runner = JobRunner::new(
        jobs_repo.clone(),
        attempts_repo.clone(),
        RetryConfig::from_env(&cfg.retry),
    );
    let remote_client = RemoteClient::new(
        cfg.remote_api_base_url.clone(),
        cfg.remote_api_key.clone(),
        rate_limiter.clone(),
    )?;
    let enforcer = TimeoutEnforcer::new(
        cfg.queue_limits.concurrency,
        Duration::from_millis(cfg.timeout.default_ms as u64),
    );
    let pipeline = Pipeline::new(
        jobs_repo.clone(),
        attempts_repo.clone(),
        runner,
        remote_client,
        enforcer,
        admission.clone(),
        cfg.worker_id.clone(),
        cfg.polling.max_attempts,
        cfg.polling.retry_after_ceiling_s,
    );

    // ---- API task ----
    let api_state = api::ApiState {
        jobs: jobs_repo.clone(),
        attempts: attempts_repo.clone(),
        policy_decisions: policy_decisions_repo.clone(),
        ingest_decisions: ingest_decisions_repo.clone(),
        metrics: metrics_repo.clone(),
        dlq: dlq_repo,
        admission,
        pool: pool.clone(),
        redis_url: cfg.redis_url(),
        remote_api_base_url: cfg.remote_api_base_url.clone(),
    };
    let app = api::router(api_state);

    let api_handle = tokio::spawn(async move {
        if let Some(addr) = api_addr {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!(%addr, "admin api listening");
            axum::serve(listener, app).await?;
        } else {
            std::future::pending::<()>().await;
        }
        Ok::<(), anyhow::Error>(())
    });

    // ---- Maintenance task ----
    let maintenance_handle = {
        let maintenance = maintenance_repo.clone();
        tokio::spawn(async move {
            loop {
                let cutoff_archive = cutoff_days(archive_after_days);
                match maintenance
                    .archive_completed_older_than(cutoff_archive, 500)
                    .await
                {
                    Ok(n) if n > 0 => tracing::info!(archived = n, "archived completed jobs"),
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "maintenance archive error"),
                }

                let cutoff_prune = cutoff_days(prune_history_after_days);
                match maintenance
                    .delete_history_for_completed_older_than(cutoff_prune, 500)
                    .await
                {
                    Ok((a, p)) if a > 0 || p > 0 => {
                        tracing::info!(attempts = a, policy_decisions = p, "pruned job history")
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "maintenance prune error"),
                }

                tokio::time::sleep(Duration::from_secs(maintenance_interval_secs)).await;
            }
            #[allow(unreachable_code)]
            Ok::<(), anyhow::Error>(())
        })
    };

    // ---- Worker loop task: lease + submit ----
    let worker_id = cfg.worker_id.clone();
    let worker_queue = queue.clone();
    let worker_batch_size = dequeue_batch_size;
    let worker_reap_interval = reap_interval;
    let worker_verbose_job_logs = verbose_job_logs;

    let worker_handle = {
        let jobs_repo = jobs_repo.clone();
        let attempts_repo = attempts_repo.clone();
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            let mut last_reap_at = Instant::now() - worker_reap_interval;

            loop {
                if last_reap_at.elapsed() >= worker_reap_interval {
                    let reaped = jobs_repo.reap_expired_locks().await?;
                    last_reap_at = Instant::now();
                    if reaped > 0 {
                        tracing::info!(worker_id = %worker_id, reaped, "reaped expired locks");
                    }
                }

                let batch = jobs_repo
                    .lease_jobs_batch(&worker_queue, &worker_id, lease_seconds, worker_batch_size)
                    .await?;

                if batch.is_empty() {
                    tokio::time::sleep(Duration::from_millis(250)).await;
                    continue;
                }

                let job_ids: Vec<uuid::Uuid> = batch.iter().map(|j| j.id).collect();
                let started_attempts = attempts_repo
                    .start_attempts_batch(&job_ids, &worker_id)
                    .await?;

                if started_attempts.len() != batch.len() {
                    anyhow::bail!(
                        "attempt insert count mismatch: inserted={} leased={}",
                        started_attempts.len(),
                        batch.len()
                    );
                }

                let mut attempts_by_job: std::collections::HashMap<uuid::Uuid, uuid::Uuid> =
                    started_attempts
                        .into_iter()
                        .map(|(job_id, attempt_id, _attempt_no)| (job_id, attempt_id))
                        .collect();

                let mut join_set = tokio::task::JoinSet::new();
                for job in batch {
                    let pipeline = pipeline.clone();
                    let attempt_id = attempts_by_job
                        .remove(&job.id)
                        .ok_or_else(|| anyhow::anyhow!("missing started attempt for job {}", job.id))?;

                    if worker_verbose_job_logs {
                        tracing::info!(worker_id = %worker_id, job_id = %job.id, "leased job, submitting");
                    }

                    join_set.spawn(async move { pipeline.submit(&job, attempt_id).await });
                }

                while let Some(joined) = join_set.join_next().await {
                    if let Err(e) = joined? {
                        tracing::error!(error = %e, "submit pipeline error");
                    }
                }
            }

            #[allow(unreachable_code)]
            Ok::<(), anyhow::Error>(())
        })
    };

    // ---- Polling loop task: check in-flight jobs against the remote renderer ----
    //
    // `list_polling_for_worker` only returns jobs whose `next_poll_at` has
    // elapsed, so the per-job wait is enforced at the query level from the
    // remote's own `retry_after_s`. This loop's sleep is just how often we
    // look for newly-due jobs, not a per-job poll interval.
    let polling_handle = {
        let jobs_repo = jobs_repo.clone();
        let pipeline = pipeline.clone();
        let worker_id = cfg.worker_id.clone();
        tokio::spawn(async move {
            loop {
                let in_flight = jobs_repo
                    .list_polling_for_worker(&worker_id, dequeue_batch_size)
                    .await?;

                if in_flight.is_empty() {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    continue;
                }

                let mut join_set = tokio::task::JoinSet::new();
                for job in in_flight {
                    let pipeline = pipeline.clone();
                    join_set.spawn(async move { pipeline.poll(&job, lease_seconds).await });
                }

                while let Some(joined) = join_set.join_next().await {
                    if let Err(e) = joined? {
                        tracing::error!(error = %e, "poll pipeline error");
                    }
                }

                tokio::time::sleep(Duration::from_millis(500)).await;
            }

            #[allow(unreachable_code)]
            Ok::<(), anyhow::Error>(())
        })
    };

    tokio::select! {
        res = api_handle => res??,
        res = worker_handle => res??,
        res = polling_handle => res??,
        res = maintenance_handle => res??,
    }

    Ok(())
}
