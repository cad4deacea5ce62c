// Closed taxonomy of failure kinds a job attempt can end in, plus the
// structured shape callers match on instead of sniffing error strings.

use std::fmt;

use reqwest::header::HeaderMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Authentication,
    RateLimit,
    Timeout,
    ServerError,
    ValidationError,
    NetworkError,
    QuotaExceeded,
    Database,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::RateLimit => "rate_limit",
            Self::Timeout => "timeout",
            Self::ServerError => "server_error",
            Self::ValidationError => "validation_error",
            Self::NetworkError => "network_error",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Database => "database",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "authentication" => Self::Authentication,
            "rate_limit" => Self::RateLimit,
            "timeout" => Self::Timeout,
            "server_error" => Self::ServerError,
            "validation_error" => Self::ValidationError,
            "network_error" => Self::NetworkError,
            "quota_exceeded" => Self::QuotaExceeded,
            "database" => Self::Database,
            _ => Self::Unknown,
        }
    }

    /// Whether an error of this kind is worth retrying at all. Validation
    /// errors and authentication failures are deterministic: retrying
    /// without a human fixing something upstream will fail the same way.
    /// Unclassifiable (`Unknown`) failures are non-retryable too, so a
    /// failure the classifier can't place doesn't retry forever.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ValidationError | Self::Authentication | Self::Unknown)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of classifying a failed attempt: what kind of error it was,
/// whether it's worth retrying, and messages for two different audiences.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{technical_detail}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub retryable: bool,
    pub user_message: String,
    pub technical_detail: String,
    pub retry_after_seconds: Option<i64>,
    pub origin: String,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, technical_detail: impl Into<String>, origin: impl Into<String>) -> Self {
        let technical_detail = technical_detail.into();
        let user_message = default_user_message(kind);
        Self {
            kind,
            retryable: kind.is_retryable(),
            user_message,
            technical_detail,
            retry_after_seconds: None,
            origin: origin.into(),
        }
    }

    pub fn with_retry_after(mut self, seconds: i64) -> Self {
        self.retry_after_seconds = Some(seconds);
        self
    }
}

fn default_user_message(kind: ErrorKind) -> String {
    match kind {
        ErrorKind::Authentication => {
            "Authentication with the rendering service failed. Check your API credentials.".into()
        }
        ErrorKind::RateLimit => "The rendering service is rate-limiting requests. Retrying shortly.".into(),
        ErrorKind::Timeout => "The rendering service did not respond in time. Retrying.".into(),
        ErrorKind::ServerError => "The rendering service returned an error. Retrying.".into(),
        ErrorKind::ValidationError => "The request was rejected as invalid and will not be retried.".into(),
        ErrorKind::NetworkError => "A network error occurred while contacting the rendering service.".into(),
        ErrorKind::QuotaExceeded => "Your usage quota has been exceeded.".into(),
        ErrorKind::Database => "An internal storage error occurred. Retrying.".into(),
        ErrorKind::Unknown => "An unexpected error occurred and will not be retried.".into(),
    }
}

/// Classifies an HTTP status code, headers, and response body from the
/// remote rendering API into a [`ClassifiedError`]. Status 423 ("still
/// processing") never reaches this function — the status parser handles
/// it as a normal polling state, not a failure.
pub fn classify_http(status: u16, headers: &HeaderMap, body: &str, origin: &str) -> ClassifiedError {
    let kind = match status {
        401 | 403 => ErrorKind::Authentication,
        429 => ErrorKind::RateLimit,
        408 => ErrorKind::Timeout,
        400 | 404 | 422 => ErrorKind::ValidationError,
        402 => ErrorKind::QuotaExceeded,
        500..=599 => ErrorKind::ServerError,
        _ => ErrorKind::Unknown,
    };

    let detail = format!("http {status}: {body}");
    let mut err = ClassifiedError::new(kind, detail, origin);
    if kind == ErrorKind::RateLimit {
        err = err.with_retry_after(parse_retry_after_header(headers).unwrap_or(30));
    }
    err
}

/// Reads the `Retry-After` header (case-insensitive per HTTP semantics;
/// `HeaderMap::get` already matches header names case-insensitively).
fn parse_retry_after_header(headers: &HeaderMap) -> Option<i64> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    let seconds: i64 = raw.trim().parse().ok()?;
    (seconds > 0).then_some(seconds)
}

/// Classifies a transport-level failure (connect/timeout/DNS) that never
/// reached the remote service as an HTTP response.
pub fn classify_transport(err: &reqwest::Error, origin: &str) -> ClassifiedError {
    let kind = if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_connect() {
        ErrorKind::NetworkError
    } else {
        ErrorKind::Unknown
    };
    ClassifiedError::new(kind, err.to_string(), origin)
}

pub fn classify_database(err: &sqlx::Error, origin: &str) -> ClassifiedError {
    ClassifiedError::new(ErrorKind::Database, err.to_string(), origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_retry_after(seconds: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, seconds.parse().unwrap());
        headers
    }

    #[test]
    fn classifies_common_http_statuses() {
        let empty = HeaderMap::new();
        assert_eq!(classify_http(401, &empty, "", "remote").kind, ErrorKind::Authentication);
        assert_eq!(classify_http(429, &empty, "{}", "remote").kind, ErrorKind::RateLimit);
        assert_eq!(classify_http(500, &empty, "", "remote").kind, ErrorKind::ServerError);
        assert_eq!(classify_http(422, &empty, "", "remote").kind, ErrorKind::ValidationError);
        assert_eq!(classify_http(402, &empty, "", "remote").kind, ErrorKind::QuotaExceeded);
    }

    #[test]
    fn validation_auth_and_unknown_errors_are_not_retryable() {
        assert!(!ErrorKind::ValidationError.is_retryable());
        assert!(!ErrorKind::Authentication.is_retryable());
        assert!(!ErrorKind::Unknown.is_retryable());
        assert!(ErrorKind::RateLimit.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
    }

    #[test]
    fn rate_limit_extracts_retry_after_from_header() {
        let headers = headers_with_retry_after("45");
        let err = classify_http(429, &headers, "{}", "remote");
        assert_eq!(err.retry_after_seconds, Some(45));
    }

    #[test]
    fn rate_limit_defaults_retry_after_when_header_missing() {
        let err = classify_http(429, &HeaderMap::new(), "{}", "remote");
        assert_eq!(err.retry_after_seconds, Some(30));
    }

    #[test]
    fn rate_limit_ignores_non_positive_retry_after_header() {
        let headers = headers_with_retry_after("0");
        let err = classify_http(429, &headers, "{}", "remote");
        assert_eq!(err.retry_after_seconds, Some(30));
    }

    #[test]
    fn error_kind_round_trips_through_str() {
        for kind in [
            ErrorKind::Authentication,
            ErrorKind::RateLimit,
            ErrorKind::Timeout,
            ErrorKind::ServerError,
            ErrorKind::ValidationError,
            ErrorKind::NetworkError,
            ErrorKind::QuotaExceeded,
            ErrorKind::Database,
            ErrorKind::Unknown,
        ] {
            assert_eq!(ErrorKind::from_str(kind.as_str()), kind);
        }
    }
}
