use tracing_subscriber::EnvFilter;

/// Initializes the global structured logger. Mirrors the old plain
/// println!/eprintln! call sites one-for-one, but emits a JSON object
/// per event with level and fields instead of a bare string.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(false)
        .with_current_span(false)
        .init();
}

const SENSITIVE_KEYS: [&str; 3] = ["apikey", "api_key", "authorization"];

/// Redacts a credential/token to its first 4 and last 4 characters.
/// Used anywhere a remote API key or bearer token would otherwise be logged.
pub fn redact_credential(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.len() <= 8 {
        return "****".to_string();
    }
    let head = &trimmed[..4];
    let tail = &trimmed[trimmed.len() - 4..];
    format!("{head}...{tail}")
}

/// Redacts a `Bearer <token>` value, or any field whose key looks sensitive.
pub fn redact_field(key: &str, value: &str) -> String {
    let lower = key.to_lowercase();
    if SENSITIVE_KEYS.iter().any(|k| lower.contains(k)) {
        return redact_credential(value);
    }
    if let Some(rest) = value.strip_prefix("Bearer ") {
        return format!("Bearer {}", redact_credential(rest));
    }
    value.to_string()
}
