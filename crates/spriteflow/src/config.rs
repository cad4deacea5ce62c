// Config is a central place for runtime configuration.
// It loads values from environment variables and gives you a typed,
// validated struct instead of raw strings everywhere.

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub worker_id: String,
    pub queue: String,
    pub lease_seconds: i64,
    pub admin_addr: Option<String>,
    pub migrate_on_startup: bool,
    pub max_payload_bytes: usize,
    pub max_enqueues_per_minute_per_queue: i64,
    pub dequeue_batch_size: i64,
    pub reap_interval_ms: u64,
    pub verbose_job_logs: bool,

    pub redis: RedisConfig,
    pub queue_limits: QueueLimitsConfig,
    pub cache: CacheConfig,
    pub retry: RetryEnvConfig,
    pub dedup_window_s: i64,
    pub timeout: TimeoutConfig,
    pub rate_limit: RateLimitConfig,
    pub polling: PollingConfig,
    pub remote_api_base_url: String,
    pub remote_api_key: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

#[derive(Clone, Debug)]
pub struct QueueLimitsConfig {
    pub concurrency: usize,
    pub max_jobs_per_user: i64,
    pub system_queue_limit: i64,
    pub warning_threshold: i64,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub ttl_days: i64,
    pub strategy: String,
}

#[derive(Clone, Debug)]
pub struct RetryEnvConfig {
    pub max_retries: i32,
    pub backoff_delay_ms: i64,
    pub backoff_multiplier: f64,
}

#[derive(Clone, Debug)]
pub struct TimeoutConfig {
    pub default_ms: i64,
    pub enable_per_job_override: bool,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub requests_per_minute: i64,
    pub enabled: bool,
}

#[derive(Clone, Debug)]
pub struct PollingConfig {
    pub max_attempts: i32,
    pub retry_after_ceiling_s: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is missing"))?;

        let worker_id = env_or_fallback("SPRITEFLOW_WORKER_ID", "WORKER_ID")
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "worker-1".to_string());

        let queue =
            env_or_fallback("SPRITEFLOW_QUEUE", "QUEUE").unwrap_or_else(|| "sprites".to_string());

        let lease_seconds = env_or_fallback("SPRITEFLOW_LEASE_SECONDS", "LEASE_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let admin_addr = env_or_fallback("SPRITEFLOW_ADMIN_ADDR", "ADMIN_ADDR")
            .and_then(|s| normalize_optional_addr(&s));

        let migrate_on_startup = env_bool("SPRITEFLOW_MIGRATE_ON_STARTUP").unwrap_or(false);

        let max_payload_bytes =
            env_or_fallback("SPRITEFLOW_MAX_PAYLOAD_BYTES", "MAX_PAYLOAD_BYTES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(256 * 1024);

        let max_enqueues_per_minute_per_queue =
            env_or_fallback("SPRITEFLOW_MAX_ENQUEUE_PER_MINUTE", "MAX_ENQUEUE_PER_MINUTE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(10_000);

        let dequeue_batch_size =
            env_or_fallback("SPRITEFLOW_DEQUEUE_BATCH_SIZE", "DEQUEUE_BATCH_SIZE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(10);

        let reap_interval_ms = env_or_fallback("SPRITEFLOW_REAP_INTERVAL_MS", "REAP_INTERVAL_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(5_000);

        let verbose_job_logs = env_bool("SPRITEFLOW_VERBOSE_JOB_LOGS").unwrap_or(false);

        let redis = RedisConfig {
            host: env_or_fallback("REDIS_HOST", "REDIS_HOST")
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            port: env_or_fallback("REDIS_PORT", "REDIS_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(6379),
            password: env_or_fallback("REDIS_PASSWORD", "REDIS_PASSWORD"),
            db: env_or_fallback("REDIS_DB", "REDIS_DB")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        };

        let queue_limits = QueueLimitsConfig {
            concurrency: env_or_fallback("QUEUE_CONCURRENCY", "QUEUE_CONCURRENCY")
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            max_jobs_per_user: env_or_fallback("QUEUE_MAX_JOBS_PER_USER", "QUEUE_MAX_JOBS_PER_USER")
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            system_queue_limit: env_or_fallback(
                "QUEUE_SYSTEM_QUEUE_LIMIT",
                "QUEUE_SYSTEM_QUEUE_LIMIT",
            )
            .and_then(|s| s.parse().ok())
            .unwrap_or(500),
            warning_threshold: env_or_fallback("QUEUE_WARNING_THRESHOLD", "QUEUE_WARNING_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(400),
        };

        let cache = CacheConfig {
            ttl_days: env_or_fallback("CACHE_TTL_DAYS", "CACHE_TTL_DAYS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            strategy: env_or_fallback("CACHE_STRATEGY", "CACHE_STRATEGY")
                .unwrap_or_else(|| "fingerprint".to_string()),
        };

        let retry = RetryEnvConfig {
            max_retries: env_or_fallback("RETRY_MAX_RETRIES", "RETRY_MAX_RETRIES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            backoff_delay_ms: env_or_fallback("RETRY_BACKOFF_DELAY_MS", "RETRY_BACKOFF_DELAY_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1_000),
            backoff_multiplier: env_or_fallback(
                "RETRY_BACKOFF_MULTIPLIER",
                "RETRY_BACKOFF_MULTIPLIER",
            )
            .and_then(|s| s.parse().ok())
            .unwrap_or(2.0),
        };

        let dedup_window_s = env_or_fallback("DEDUP_WINDOW_S", "DEDUP_WINDOW_S")
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let timeout = TimeoutConfig {
            default_ms: env_or_fallback("TIMEOUT_DEFAULT_MS", "TIMEOUT_DEFAULT_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(600_000),
            enable_per_job_override: env_bool("TIMEOUT_ENABLE_PER_JOB_OVERRIDE").unwrap_or(true),
        };

        let rate_limit = RateLimitConfig {
            requests_per_minute: env_or_fallback(
                "RATE_LIMIT_REQUESTS_PER_MINUTE",
                "RATE_LIMIT_REQUESTS_PER_MINUTE",
            )
            .and_then(|s| s.parse().ok())
            .unwrap_or(60),
            enabled: env_bool("RATE_LIMIT_ENABLED").unwrap_or(true),
        };

        let polling = PollingConfig {
            max_attempts: env_or_fallback("POLLING_MAX_ATTEMPTS", "POLLING_MAX_ATTEMPTS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            retry_after_ceiling_s: env_or_fallback(
                "POLLING_RETRY_AFTER_CEILING_S",
                "POLLING_RETRY_AFTER_CEILING_S",
            )
            .and_then(|s| s.parse().ok())
            .unwrap_or(3_600),
        };

        let remote_api_base_url = env_or_fallback("REMOTE_API_BASE_URL", "REMOTE_API_BASE_URL")
            .unwrap_or_else(|| "https://api.example-sprites.invalid".to_string());
        let remote_api_key = env_or_fallback("REMOTE_API_KEY", "REMOTE_API_KEY");

        let cfg = Self {
            database_url,
            worker_id,
            queue,
            lease_seconds,
            admin_addr,
            migrate_on_startup,
            max_payload_bytes,
            max_enqueues_per_minute_per_queue,
            dequeue_batch_size,
            reap_interval_ms,
            verbose_job_logs,
            redis,
            queue_limits,
            cache,
            retry,
            dedup_window_s,
            timeout,
            rate_limit,
            polling,
            remote_api_base_url,
            remote_api_key,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.queue_limits.warning_threshold >= self.queue_limits.system_queue_limit {
            anyhow::bail!("queue.warning_threshold must be < queue.system_queue_limit");
        }
        if self.queue_limits.max_jobs_per_user <= 0 {
            anyhow::bail!("queue.max_jobs_per_user must be > 0");
        }
        if self.retry.max_retries < 0 {
            anyhow::bail!("retry.max_retries must be >= 0");
        }
        if self.retry.backoff_delay_ms <= 0 {
            anyhow::bail!("retry.backoff_delay_ms must be > 0");
        }
        if self.retry.backoff_multiplier <= 0.0 || !self.retry.backoff_multiplier.is_finite() {
            anyhow::bail!("retry.backoff_multiplier must be a positive finite number");
        }
        if self.timeout.default_ms <= 0 {
            anyhow::bail!("timeout.default_ms must be > 0");
        }
        if self.polling.max_attempts <= 0 {
            anyhow::bail!("polling.max_attempts must be > 0");
        }
        if self.polling.retry_after_ceiling_s <= 0 {
            anyhow::bail!("polling.retry_after_ceiling_s must be > 0");
        }
        Ok(())
    }

    pub fn redis_url(&self) -> String {
        match &self.redis.password {
            Some(pw) => format!(
                "redis://:{}@{}:{}/{}",
                pw, self.redis.host, self.redis.port, self.redis.db
            ),
            None => {
                format!("redis://{}:{}/{}", self.redis.host, self.redis.port, self.redis.db)
            }
        }
    }
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn normalize_optional_addr(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if matches!(v.to_lowercase().as_str(), "0" | "off" | "false" | "none") {
        return None;
    }
    Some(v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_optional_addr_treats_off_as_disabled() {
        assert_eq!(normalize_optional_addr("off"), None);
        assert_eq!(
            normalize_optional_addr("0.0.0.0:8080"),
            Some("0.0.0.0:8080".to_string())
        );
    }

    #[test]
    fn env_bool_accepts_common_truthy_spellings() {
        std::env::set_var("SPRITEFLOW_TEST_BOOL_FLAG", "yes");
        assert_eq!(env_bool("SPRITEFLOW_TEST_BOOL_FLAG"), Some(true));
        std::env::remove_var("SPRITEFLOW_TEST_BOOL_FLAG");
    }
}
