use crate::api::models::JobListItem;
use crate::jobs::model::{Job, JobStatus};
use crate::jobs::repo::{JobsRepo, ReplayResult};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Thin admin-facing view over jobs in `dlq` status. The DLQ is not a
/// separate table: a dead-lettered job is simply a job whose status
/// landed on `dlq`, same as the teacher tracks `failed`/`succeeded` jobs
/// in-place rather than moving them between tables.
#[derive(Clone)]
pub struct DlqRepo {
    jobs: JobsRepo,
}

impl DlqRepo {
    pub fn new(jobs: JobsRepo) -> Self {
        Self { jobs }
    }

    pub async fn list(
        &self,
        queue: Option<&str>,
        limit: i64,
        cursor_created_at: Option<DateTime<Utc>>,
        cursor_id: Option<Uuid>,
    ) -> anyhow::Result<Vec<JobListItem>> {
        self.jobs
            .list_jobs(queue, Some(JobStatus::Dlq.as_str()), limit, cursor_created_at, cursor_id)
            .await
    }

    pub async fn get(&self, job_id: Uuid) -> anyhow::Result<Option<Job>> {
        let job = self.jobs.get_job(job_id).await?;
        Ok(job.filter(|j| j.status == JobStatus::Dlq.as_str()))
    }

    /// Re-enqueues a dead-lettered job as a fresh job, optionally onto a
    /// different queue or run time. The original job row is left as-is
    /// for audit; the new job id and its replay token are returned.
    pub async fn retry(
        &self,
        job_id: Uuid,
        override_queue: Option<&str>,
        override_run_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<ReplayResult> {
        self.jobs.replay_job(job_id, override_queue, override_run_at).await
    }
}
