//! Re-runs failing checks with a linear backoff.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::executor::{CheckExecutor, ExecutionResult};
use super::models::Monitor;
use super::shutdown::Shutdown;
use crate::db::enums::{CheckStatus, RuntimeStatus};
use crate::db::repository::MonitorRepository;

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// The n-th retry waits `n * backoff_unit`.
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        }
    }
}

pub struct RetryController {
    executor: CheckExecutor,
    repository: Arc<dyn MonitorRepository>,
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(
        executor: CheckExecutor,
        repository: Arc<dyn MonitorRepository>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            executor,
            repository,
            policy,
        }
    }

    /// Returns the last attempt's result and the number of retries spent.
    pub async fn run(
        &self,
        monitor: &Monitor,
        runtime_id: i32,
        shutdown: &Shutdown,
    ) -> (ExecutionResult, u32) {
        let mut retries_used = 0;

        loop {
            let result = self.executor.execute(monitor).await;
            if result.is_success() || retries_used >= self.policy.max_retries {
                return (result, retries_used);
            }

            retries_used += 1;
            debug!(
                monitor_id = monitor.id,
                attempt = retries_used,
                error = result.error_message.as_deref().unwrap_or_default(),
                "Check failed, retrying."
            );
            if let Err(e) = self
                .repository
                .set_runtime_status(runtime_id, RuntimeStatus::Retrying)
                .await
            {
                warn!(monitor_id = monitor.id, error = %e, "Failed to mark runtime as retrying.");
            }

            let backoff = self.policy.backoff_unit * retries_used;
            let mut stop = shutdown.clone();
            tokio::select! {
                biased;
                _ = stop.wait() => {
                    let mut stopped = result;
                    stopped.status = CheckStatus::Error;
                    stopped.error_message = Some("worker stopped".to_string());
                    return (stopped, retries_used);
                }
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::monitor_runtime;
    use crate::db::memory::MemoryRepository;
    use axum::{http::StatusCode, routing::get, Router};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    /// Serves 500 for the first `failures` requests, then a JSON body.
    async fn spawn_flaky(failures: usize) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/",
            get(move || {
                let counter = counter.clone();
                async move {
                    let hit = counter.fetch_add(1, Ordering::SeqCst);
                    if hit < failures {
                        (StatusCode::INTERNAL_SERVER_ERROR, "{}")
                    } else {
                        (StatusCode::OK, r#"{"v":1}"#)
                    }
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}/"), hits)
    }

    fn monitor(url: String) -> Monitor {
        Monitor {
            id: 9,
            label: None,
            method: "GET".into(),
            url,
            body: None,
            headers: BTreeMap::new(),
            auth: BTreeMap::new(),
            selector: None,
            expected_type: "json".into(),
            expected_response: None,
            cron: "* * * * *".into(),
            enabled: true,
            notification_channels: Vec::new(),
        }
    }

    fn controller(repo: Arc<MemoryRepository>, backoff_unit: Duration) -> RetryController {
        RetryController::new(
            CheckExecutor::new(Duration::from_secs(5), 1024).unwrap(),
            repo,
            RetryPolicy {
                max_retries: 2,
                backoff_unit,
            },
        )
    }

    #[tokio::test]
    async fn test_recovers_after_one_failure() {
        let (url, hits) = spawn_flaky(1).await;
        let repo = Arc::new(MemoryRepository::new());
        let runtime = repo.add_runtime(monitor_runtime::Model::new(9, RuntimeStatus::Pending));
        let (_trigger, shutdown) = Shutdown::new();

        let (result, retries) = controller(repo.clone(), Duration::from_millis(5))
            .run(&monitor(url), runtime.id, &shutdown)
            .await;

        assert!(result.is_success());
        assert_eq!(retries, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(repo.status_history(runtime.id), vec![RuntimeStatus::Retrying]);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_final_attempt() {
        let (url, hits) = spawn_flaky(usize::MAX).await;
        let repo = Arc::new(MemoryRepository::new());
        let runtime = repo.add_runtime(monitor_runtime::Model::new(9, RuntimeStatus::Pending));
        let (_trigger, shutdown) = Shutdown::new();

        let (result, retries) = controller(repo.clone(), Duration::from_millis(5))
            .run(&monitor(url), runtime.id, &shutdown)
            .await;

        assert_eq!(result.status, CheckStatus::Error);
        assert_eq!(result.error_message.as_deref(), Some("unexpected status code: 500"));
        assert_eq!(retries, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(repo.status_history(runtime.id).len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_during_backoff() {
        let (url, hits) = spawn_flaky(usize::MAX).await;
        let repo = Arc::new(MemoryRepository::new());
        let runtime = repo.add_runtime(monitor_runtime::Model::new(9, RuntimeStatus::Pending));
        let (trigger, shutdown) = Shutdown::new();
        let retry = controller(repo, Duration::from_secs(60));
        let target = monitor(url);

        let run = retry.run(&target, runtime.id, &shutdown);
        let stop = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.trigger();
        };
        let ((result, retries), ()) = tokio::join!(run, stop);

        assert_eq!(result.status, CheckStatus::Error);
        assert_eq!(result.error_message.as_deref(), Some("worker stopped"));
        assert_eq!(retries, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
