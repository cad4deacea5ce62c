use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub user_id: String,
    pub queue: String,
    pub prompt_json: Value,
    pub fingerprint: String,
    pub correlation_id: String,

    pub status: String,
    pub priority: i32,
    pub max_attempts: i32,
    pub attempts_made: i32,

    pub run_at: DateTime<Utc>,
    pub timeout_ms: i64,

    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub lock_expires_at: Option<DateTime<Utc>>,

    pub remote_job_id: Option<String>,

    pub poll_attempts: i32,
    pub next_poll_at: Option<DateTime<Utc>>,

    pub dlq_reason_code: Option<String>,
    pub dlq_at: Option<DateTime<Utc>>,
    pub replay_token: Option<String>,
    pub retried_from_dlq: bool,

    pub result_json: Option<Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub user_id: String,
    pub queue: String,
    pub prompt_json: Value,
    pub fingerprint: String,
    pub correlation_id: String,
    pub run_at: DateTime<Utc>,
    pub priority: i32,
    pub max_attempts: i32,
    pub timeout_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Active,
    Polling,
    Retrying,
    Completed,
    Failed,
    Dlq,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Active => "active",
            JobStatus::Polling => "polling",
            JobStatus::Retrying => "retrying",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Dlq => "dlq",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "queued" => JobStatus::Queued,
            "active" => JobStatus::Active,
            "polling" => JobStatus::Polling,
            "retrying" => JobStatus::Retrying,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "dlq" => JobStatus::Dlq,
            _ => return None,
        })
    }

    /// Whether this is one of the states that means the job will no
    /// longer be touched by the worker pool or polling engine.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Dlq)
    }
}
