use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::jobs::classifier::{classify_http, classify_transport, ClassifiedError, ErrorKind};
use crate::ratelimit::RateLimiter;
use crate::status_parser::{parse_status, RemoteJobStatus};

const ORIGIN: &str = "remote_api";
const MIN_CREDENTIAL_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub remote_job_id: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponseBody {
    remote_job_id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BalanceResponseBody {
    credits: i64,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("invalid credential: {0}")]
pub struct InvalidCredential(String);

/// Thin wrapper over `reqwest` for the remote rendering API: submit,
/// poll, balance, and credential rotation, all routed through the rate
/// limiter and the error classifier so callers never see a raw
/// `reqwest::Error` or an unclassified HTTP status.
#[derive(Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Arc<RwLock<Option<String>>>,
    rate_limiter: Arc<RateLimiter>,
}

impl RemoteClient {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, InvalidCredential> {
        if let Some(key) = &api_key {
            validate_credential_format(key)?;
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client builds with default TLS backend");
        Ok(Self {
            http,
            base_url,
            api_key: Arc::new(RwLock::new(api_key)),
            rate_limiter,
        })
    }

    /// Rotates the stored credential after validating its format
    /// (≥32 chars, alphanumeric/hyphen, no whitespace). Only a redacted
    /// first-4/last-4 form is ever logged.
    pub async fn set_credentials(&self, key: String) -> Result<(), InvalidCredential> {
        validate_credential_format(&key)?;
        tracing::info!(credential = %redact_credential(&key), "remote api credential updated");
        *self.api_key.write().await = Some(key);
        Ok(())
    }

    async fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key.read().await.as_deref() {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    pub async fn submit(&self, prompt_json: &Value) -> Result<SubmitOutcome, ClassifiedError> {
        self.rate_limiter.acquire().await;

        let url = format!("{}/v1/characters", self.base_url);
        let req = self.authed(self.http.post(&url)).await.json(prompt_json);

        let resp = req.send().await.map_err(|e| classify_transport(&e, ORIGIN))?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp.text().await.unwrap_or_default();

        if !(200..300).contains(&status) {
            return Err(classify_http(status, &headers, &body, ORIGIN));
        }

        let parsed: SubmitResponseBody = serde_json::from_str(&body).map_err(|e| {
            ClassifiedError::new(ErrorKind::Unknown, format!("invalid submit response: {e}"), ORIGIN)
        })?;

        Ok(SubmitOutcome {
            remote_job_id: parsed.remote_job_id,
            name: parsed.name,
        })
    }

    /// Polls one in-flight remote job. A 5xx response is a server error
    /// the classifier should see directly; every other status (200, 423,
    /// or a non-5xx failure) is handed to the status parser, which already
    /// knows how to turn 423 into `Processing` rather than a failure.
    pub async fn poll(&self, remote_job_id: &str) -> Result<RemoteJobStatus, ClassifiedError> {
        self.rate_limiter.acquire().await;

        let url = format!("{}/v1/characters/{remote_job_id}", self.base_url);
        let req = self.authed(self.http.get(&url)).await;

        let resp = req.send().await.map_err(|e| classify_transport(&e, ORIGIN))?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp.text().await.unwrap_or_default();

        if status >= 500 {
            return Err(classify_http(status, &headers, &body, ORIGIN));
        }

        Ok(parse_status(status, &headers, &body))
    }

    pub async fn get_balance(&self) -> Result<i64, ClassifiedError> {
        self.rate_limiter.acquire().await;

        let url = format!("{}/balance", self.base_url);
        let req = self.authed(self.http.get(&url)).await;

        let resp = req.send().await.map_err(|e| classify_transport(&e, ORIGIN))?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp.text().await.unwrap_or_default();

        if !(200..300).contains(&status) {
            return Err(classify_http(status, &headers, &body, ORIGIN));
        }

        let parsed: BalanceResponseBody = serde_json::from_str(&body).map_err(|e| {
            ClassifiedError::new(ErrorKind::Unknown, format!("invalid balance response: {e}"), ORIGIN)
        })?;
        Ok(parsed.credits)
    }
}

fn validate_credential_format(key: &str) -> Result<(), InvalidCredential> {
    if key.len() < MIN_CREDENTIAL_LEN {
        return Err(InvalidCredential(format!(
            "must be at least {MIN_CREDENTIAL_LEN} characters"
        )));
    }
    if key.chars().any(|c| c.is_whitespace()) {
        return Err(InvalidCredential("must not contain whitespace".into()));
    }
    if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(InvalidCredential("must be alphanumeric or hyphen".into()));
    }
    Ok(())
}

fn redact_credential(key: &str) -> String {
    if key.len() <= 8 {
        return "*".repeat(key.len());
    }
    format!("{}...{}", &key[..4], &key[key.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_well_formed_credential() {
        assert!(validate_credential_format(&"a".repeat(32)).is_ok());
        assert!(validate_credential_format("abc123-def456-ghi789-jkl012-mno345").is_ok());
    }

    #[test]
    fn rejects_short_credentials() {
        assert_eq!(
            validate_credential_format("short"),
            Err(InvalidCredential("must be at least 32 characters".into()))
        );
    }

    #[test]
    fn rejects_whitespace() {
        let key = format!("{} {}", "a".repeat(20), "b".repeat(20));
        assert!(matches!(validate_credential_format(&key), Err(InvalidCredential(_))));
    }

    #[test]
    fn rejects_non_alphanumeric_characters() {
        let key = format!("{}!", "a".repeat(32));
        assert!(matches!(validate_credential_format(&key), Err(InvalidCredential(_))));
    }

    #[test]
    fn redacts_middle_of_long_credentials() {
        let key = "abcd1234efgh5678ijkl9012mnop3456";
        let redacted = redact_credential(key);
        assert!(redacted.starts_with("abcd"));
        assert!(redacted.ends_with("3456"));
        assert!(!redacted.contains("efgh"));
    }
}
