use crate::jobs::classifier::ClassifiedError;

/// Top-level error type for library call boundaries. Call sites inside
/// the binaries still use `anyhow::Result` once an error has crossed
/// this boundary and only needs to be logged/propagated, not matched on.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("system queue is full")]
    SystemQueueFull,

    #[error(transparent)]
    Remote(#[from] ClassifiedError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OrchestratorError {
    pub fn user_message(&self) -> String {
        match self {
            OrchestratorError::Validation(msg) => msg.clone(),
            OrchestratorError::QuotaExceeded(msg) => msg.clone(),
            OrchestratorError::SystemQueueFull => "system queue is full".to_string(),
            OrchestratorError::Remote(c) => c.user_message.clone(),
            OrchestratorError::Database(_) => "internal error, try again".to_string(),
            OrchestratorError::Other(_) => "internal error, try again".to_string(),
        }
    }
}
