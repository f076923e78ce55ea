//! One `tokio::task` per LoadTest, gated by a per-queue
//! `tokio::sync::Semaphore` bounding in-flight tests — the same
//! Semaphore-per-worker-pool pattern the pack's swarm orchestrator uses,
//! adapted here to per-queue scoping instead of a single global pool.
//!
//! This module is deliberately decoupled from `kube::Api<LoadTest>` via
//! [`ControlPlane`] so the scheduling/retry/backoff logic is unit-testable
//! without a live cluster; `commands::run` supplies the real
//! implementation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::crd::{LoadTest, LoadTestState};
use crate::runner::log_saver::{save_pod_logs, LogSource};
use crate::runner::report::TestOutcome;

/// The control-plane operations the Runner needs, abstracted so tests can
/// substitute an in-memory fake instead of a real `kube::Api<LoadTest>`.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn create(&self, loadtest: &LoadTest) -> Result<(), String>;
    async fn poll(&self, name: &str) -> Result<LoadTestState, String>;
    async fn delete(&self, name: &str) -> Result<(), String>;
    /// Names of the pods currently owned by this test, for log capture.
    async fn pod_names(&self, name: &str) -> Result<Vec<String>, String>;
}

pub struct EngineConfig {
    pub polling_interval: Duration,
    pub polling_retries: u32,
    pub delete_successful_tests: bool,
    /// Directory logs are written under as `<log_dir>/<test>/<pod>.log`.
    /// `None` skips log capture entirely.
    pub log_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            polling_interval: Duration::from_secs(20),
            polling_retries: 2,
            delete_successful_tests: false,
            log_dir: None,
        }
    }
}

/// Run one LoadTest to terminal state against `control_plane`, honoring
/// the queue's concurrency limit via `semaphore` and the retry/backoff
/// rules from `spec.md` §5.
pub async fn run_one(
    loadtest: LoadTest,
    suite_name: String,
    control_plane: Arc<dyn ControlPlane>,
    log_source: Arc<dyn LogSource>,
    semaphore: Arc<Semaphore>,
    config: &EngineConfig,
) -> TestOutcome {
    let _permit = semaphore.acquire().await.expect("semaphore never closed");
    let name = loadtest
        .metadata
        .name
        .clone()
        .unwrap_or_else(|| "unnamed".to_string());

    let started = std::time::Instant::now();

    if let Err(error) = retrying(config.polling_retries, config.polling_interval, || {
        let control_plane = control_plane.clone();
        let loadtest = &loadtest;
        async move { control_plane.create(loadtest).await }
    })
    .await
    {
        return TestOutcome {
            suite_name,
            test_name: name,
            duration: started.elapsed(),
            error: Some(format!("create failed after retries: {error}")),
        };
    }

    let terminal = poll_until_terminal(control_plane.as_ref(), &name, config).await;

    if let Some(log_dir) = &config.log_dir {
        if let Ok(pod_names) = control_plane.pod_names(&name).await {
            if let Err(error) = save_pod_logs(log_source.as_ref(), log_dir, &name, &pod_names).await {
                tracing::warn!(test = %name, error = %error, "runner_log_capture_failed");
            }
        }
    }

    let error = match terminal {
        Ok(LoadTestState::Succeeded) => {
            if config.delete_successful_tests {
                let _ = control_plane.delete(&name).await;
            }
            None
        }
        Ok(state) => Some(format!("terminated in non-success state {state:?}")),
        Err(message) => Some(message),
    };

    TestOutcome {
        suite_name,
        test_name: name,
        duration: started.elapsed(),
        error,
    }
}

/// Poll `name` until it reaches a terminal [`LoadTestState`], backing off
/// to `2x` the configured interval while the test is not yet `Running`,
/// per `spec.md` §5's "reduce load while initializing" rule.
async fn poll_until_terminal(
    control_plane: &dyn ControlPlane,
    name: &str,
    config: &EngineConfig,
) -> Result<LoadTestState, String> {
    loop {
        let state = retrying(config.polling_retries, config.polling_interval, || {
            control_plane.poll(name)
        })
        .await?;

        if state.is_terminal() {
            return Ok(state);
        }

        let interval = if state == LoadTestState::Running {
            config.polling_interval
        } else {
            config.polling_interval * 2
        };
        tokio::time::sleep(interval).await;
    }
}

/// Retry `operation` up to `max_retries` additional times with
/// `backoff` delay between attempts, per `spec.md` §7's "create or poll
/// failure ... retries up to maxRetries with the polling interval as
/// backoff" rule.
async fn retrying<T, F, Fut>(max_retries: u32, backoff: Duration, mut operation: F) -> Result<T, String>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, String>>,
{
    let mut last_error = String::new();
    for attempt in 0..=max_retries {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                last_error = error;
                if attempt < max_retries {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
    Err(last_error)
}

/// Build one `Semaphore` per queue from the parsed `-c` configuration.
pub fn build_semaphores(queue_concurrency: &HashMap<String, usize>) -> HashMap<String, Arc<Semaphore>> {
    queue_concurrency
        .iter()
        .map(|(queue, concurrency)| (queue.clone(), Arc::new(Semaphore::new(*concurrency))))
        .collect()
}
