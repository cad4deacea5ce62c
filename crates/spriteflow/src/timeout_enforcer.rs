use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;

/// Bounds how many job executions can run at once and how long each one
/// is allowed to take. Generalizes the per-handler semaphore+timeout
/// wrapping the worker used to apply per job type into a single gate
/// shared by every job, since every job here runs the same pipeline.
#[derive(Clone)]
pub struct TimeoutEnforcer {
    semaphore: Arc<Semaphore>,
    default_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum EnforcerError<E> {
    #[error("execution timed out after {0:?}")]
    TimedOut(Duration),
    #[error("semaphore closed")]
    SemaphoreClosed,
    #[error(transparent)]
    Inner(E),
}

impl TimeoutEnforcer {
    pub fn new(max_concurrency: usize, default_timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            default_timeout,
        }
    }

    /// Runs `fut` under the concurrency gate, bounded by `job_timeout` if
    /// given, otherwise the enforcer's default.
    pub async fn run<F, T, E>(
        &self,
        job_timeout: Option<Duration>,
        fut: F,
    ) -> Result<T, EnforcerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| EnforcerError::SemaphoreClosed)?;

        let dur = job_timeout.unwrap_or(self.default_timeout);
        match timeout(dur, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(EnforcerError::Inner(e)),
            Err(_) => Err(EnforcerError::TimedOut(dur)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn times_out_long_running_work() {
        let enforcer = TimeoutEnforcer::new(4, Duration::from_secs(10));
        let result: Result<(), EnforcerError<anyhow::Error>> = enforcer
            .run(Some(Duration::from_millis(10)), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(EnforcerError::TimedOut(_))));
    }

    #[tokio::test]
    async fn propagates_the_inner_error() {
        let enforcer = TimeoutEnforcer::new(4, Duration::from_secs(10));
        let result: Result<(), EnforcerError<&str>> = enforcer
            .run(None, async { Err("boom") })
            .await;
        assert!(matches!(result, Err(EnforcerError::Inner("boom"))));
    }
}
