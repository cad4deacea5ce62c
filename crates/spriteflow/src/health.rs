use serde::Serialize;
use sqlx::PgPool;
use std::time::Duration;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub database: CheckResult,
    pub cache: CheckResult,
    pub remote_api: CheckResult,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub ok: bool,
    pub detail: Option<String>,
}

impl CheckResult {
    fn ok() -> Self {
        Self {
            ok: true,
            detail: None,
        }
    }

    fn failed(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: Some(detail.into()),
        }
    }
}

pub async fn check_database(pool: &PgPool) -> CheckResult {
    match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => CheckResult::ok(),
        Err(e) => CheckResult::failed(e.to_string()),
    }
}

pub async fn check_cache(redis_url: &str) -> CheckResult {
    let client = match redis::Client::open(redis_url) {
        Ok(c) => c,
        Err(e) => return CheckResult::failed(e.to_string()),
    };

    match tokio::time::timeout(Duration::from_secs(2), client.get_tokio_connection_manager()).await
    {
        Ok(Ok(_)) => CheckResult::ok(),
        Ok(Err(e)) => CheckResult::failed(e.to_string()),
        Err(_) => CheckResult::failed("timed out connecting to cache"),
    }
}

pub async fn check_remote_api(base_url: &str) -> CheckResult {
    let client = reqwest::Client::new();
    let url = format!("{base_url}/v1/health");

    match tokio::time::timeout(Duration::from_secs(2), client.get(&url).send()).await {
        Ok(Ok(resp)) if resp.status().is_success() => CheckResult::ok(),
        Ok(Ok(resp)) => CheckResult::failed(format!("remote health returned {}", resp.status())),
        Ok(Err(e)) => CheckResult::failed(e.to_string()),
        Err(_) => CheckResult::failed("timed out contacting remote API"),
    }
}

pub async fn check_all(pool: &PgPool, redis_url: &str, remote_api_base_url: &str) -> HealthReport {
    let database = check_database(pool).await;
    let cache = check_cache(redis_url).await;
    let remote_api = check_remote_api(remote_api_base_url).await;

    HealthReport {
        healthy: database.ok && cache.ok,
        database,
        cache,
        remote_api,
    }
}
