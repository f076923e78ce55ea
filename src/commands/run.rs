//! `loadtest-operator run`: the Runner CLI entrypoint. Reads a batch of
//! LoadTest configs, drives them through the control plane in parallel
//! under per-queue concurrency limits, and writes the XML report.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, LogParams, PostParams};
use kube::Client;
use serde::Deserialize;
use tracing::info;

use loadtest_operator::crd::LoadTest;
use loadtest_operator::identity::{owned_by, LABEL_LOADTEST};
use loadtest_operator::runner::engine::{build_semaphores, run_one, ControlPlane, EngineConfig};
use loadtest_operator::runner::log_saver::LogSource;
use loadtest_operator::runner::queue::{parse_queue_concurrency, queue_for};
use loadtest_operator::runner::report::{write_report, Reporter, TestOutcome};

pub struct RunArgs {
    pub input_files: Vec<PathBuf>,
    pub concurrency: Vec<String>,
    pub annotation_key: String,
    pub polling_interval_seconds: u64,
    pub polling_retries: u32,
    pub output_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub delete_successful_tests: bool,
}

/// The real `ControlPlane`/`LogSource` against a live cluster: one `Api<LoadTest>`
/// plus the `Api<Pod>` needed to list and fetch logs of a test's owned pods.
struct KubeControlPlane {
    api: Api<LoadTest>,
    pods_api: Api<Pod>,
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn create(&self, loadtest: &LoadTest) -> Result<(), String> {
        self.api
            .create(&PostParams::default(), loadtest)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn poll(&self, name: &str) -> Result<loadtest_operator::crd::LoadTestState, String> {
        let observed = self.api.get(name).await.map_err(|e| e.to_string())?;
        Ok(observed.status.unwrap_or_default().state)
    }

    async fn delete(&self, name: &str) -> Result<(), String> {
        self.api.delete(name, &Default::default()).await.map(|_| ()).map_err(|e| e.to_string())
    }

    async fn pod_names(&self, name: &str) -> Result<Vec<String>, String> {
        let loadtest = self.api.get(name).await.map_err(|e| e.to_string())?;
        let list_params = ListParams::default().labels(&format!("{LABEL_LOADTEST}={name}"));
        let pods = self.pods_api.list(&list_params).await.map_err(|e| e.to_string())?;
        Ok(pods
            .items
            .into_iter()
            .filter(|pod| owned_by(pod, &loadtest))
            .filter_map(|pod| pod.metadata.name)
            .collect())
    }
}

#[async_trait]
impl LogSource for KubeControlPlane {
    async fn fetch_logs(&self, pod_name: &str) -> Result<String, String> {
        self.pods_api
            .logs(pod_name, &LogParams::default())
            .await
            .map_err(|e| e.to_string())
    }
}

pub async fn run(args: RunArgs) -> Result<i32> {
    let queue_concurrency = parse_queue_concurrency(&args.concurrency)
        .map_err(|e| anyhow::anyhow!("invalid -c flag: {e}"))?;
    let queue_concurrency = if queue_concurrency.is_empty() {
        HashMap::from([(loadtest_operator::runner::queue::GLOBAL_QUEUE.to_string(), 1)])
    } else {
        queue_concurrency
    };
    let semaphores = build_semaphores(&queue_concurrency);

    let mut loadtests = Vec::new();
    for path in &args.input_files {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input file {}", path.display()))?;
        for document in serde_yaml::Deserializer::from_str(&contents) {
            let loadtest = LoadTest::deserialize(document)
                .with_context(|| format!("failed to parse LoadTest document in {}", path.display()))?;
            loadtests.push(loadtest);
        }
    }

    info!(count = loadtests.len(), "runner_loaded_loadtests");

    let client = Client::try_default().await.context("runner: failed to load kubeconfig")?;
    let config = EngineConfig {
        polling_interval: Duration::from_secs(args.polling_interval_seconds),
        polling_retries: args.polling_retries,
        delete_successful_tests: args.delete_successful_tests,
        log_dir: args.log_dir.clone(),
    };

    let mut tasks = Vec::new();
    for loadtest in loadtests {
        let namespace = loadtest.metadata.namespace.clone().unwrap_or_else(|| "default".to_string());
        let annotations = loadtest
            .metadata
            .annotations
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect::<std::collections::BTreeMap<_, _>>();
        let queue_name = queue_for(&annotations, &args.annotation_key);
        let semaphore = semaphores
            .get(&queue_name)
            .cloned()
            .unwrap_or_else(|| semaphores.values().next().expect("at least one queue").clone());

        let kube_plane = Arc::new(KubeControlPlane {
            api: Api::namespaced(client.clone(), &namespace),
            pods_api: Api::namespaced(client.clone(), &namespace),
        });
        let control_plane: Arc<dyn ControlPlane> = kube_plane.clone();
        let log_source: Arc<dyn LogSource> = kube_plane;
        let suite_name = queue_name.clone();
        let config = EngineConfig {
            polling_interval: config.polling_interval,
            polling_retries: config.polling_retries,
            delete_successful_tests: config.delete_successful_tests,
            log_dir: config.log_dir.clone(),
        };
        tasks.push(tokio::spawn(async move {
            run_one(loadtest, suite_name, control_plane, log_source, semaphore, &config).await
        }));
    }

    let mut reporter = Reporter::new();
    for task in tasks {
        let outcome: TestOutcome = task.await.context("runner task panicked")?;
        reporter.record(outcome);
    }

    let has_errors = reporter.has_errors();
    let report = reporter.finalize("loadtest-run");

    if let Some(output_path) = &args.output_path {
        write_report(&report, output_path, false).context("failed to write XML report")?;
    }

    Ok(if has_errors { 1 } else { 0 })
}
