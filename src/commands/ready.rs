//! `loadtest-operator ready`: the driver pod's `ready` init container.
//! Polls the Kubernetes API for sibling pods sharing the `loadtest` label
//! until every required worker is reachable or `READY_TIMEOUT` elapses.

use std::net::ToSocketAddrs;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{info, warn};

use loadtest_operator::crd::LoadTest;
use loadtest_operator::identity::{component_name_of, role_of, LABEL_LOADTEST};
use loadtest_operator::ready::{
    render_address_file, render_metadata_json, render_node_info_json, required_workers, PodNodeInfo,
    WorkerAddress, DEFAULT_READY_OUTPUT_FILE,
};

fn env_duration(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|s| humantime_duration(&s))
        .unwrap_or(default)
}

fn humantime_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (number, unit) = raw.split_at(raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len()));
    let number: u64 = number.parse().ok()?;
    match unit {
        "s" | "" => Some(Duration::from_secs(number)),
        "m" => Some(Duration::from_secs(number * 60)),
        "h" => Some(Duration::from_secs(number * 3600)),
        _ => None,
    }
}

/// Builds the Kubernetes client the Ready sidecar talks to. Honors
/// `KUBE_CONFIG` (an explicit kubeconfig file path) the same way the rest
/// of the cluster tooling falls back to in-cluster/default discovery when
/// it isn't set.
async fn build_client() -> Result<Client> {
    match std::env::var("KUBE_CONFIG") {
        Ok(path) => {
            let kubeconfig = Kubeconfig::read_from(&path)
                .with_context(|| format!("ready sidecar: failed to read KUBE_CONFIG at {path}"))?;
            let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("ready sidecar: failed to build client config from KUBE_CONFIG")?;
            Client::try_from(config).context("ready sidecar: failed to build client from KUBE_CONFIG")
        }
        Err(_) => Client::try_default().await.context("ready sidecar: failed to load kubeconfig"),
    }
}

pub async fn run(loadtest_name: String, namespace: Option<String>) -> Result<()> {
    let timeout = env_duration("READY_TIMEOUT", loadtest_operator::ready::DEFAULT_READY_TIMEOUT);
    let output_file = std::env::var("READY_OUTPUT_FILE")
        .unwrap_or_else(|_| DEFAULT_READY_OUTPUT_FILE.to_string());
    let metadata_output_file = std::env::var("METADATA_OUTPUT_FILE").ok();
    let node_info_output_file = std::env::var("NODE_INFO_OUTPUT_FILE").ok();

    let client = build_client().await?;

    let loadtests: Api<LoadTest> = match &namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::default_namespaced(client.clone()),
    };
    let loadtest = loadtests
        .get(&loadtest_name)
        .await
        .context("ready sidecar: failed to fetch owning LoadTest")?;

    let pods_api: Api<Pod> = match &namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::default_namespaced(client),
    };

    let required = required_workers(&loadtest);
    let deadline = Instant::now() + timeout;

    loop {
        let list_params = ListParams::default().labels(&format!("{LABEL_LOADTEST}={loadtest_name}"));
        let pods = pods_api
            .list(&list_params)
            .await
            .context("ready sidecar: failed to list sibling pods")?;

        let (resolved, node_info) = resolve_addresses(&pods.items).await;

        match render_address_file(&loadtest, &resolved) {
            Ok(rendered) => {
                tokio::fs::write(&output_file, rendered)
                    .await
                    .context("ready sidecar: failed to write address file")?;
                if let Some(path) = &metadata_output_file {
                    let json = render_metadata_json(&loadtest, &resolved)
                        .context("ready sidecar: failed to render metadata JSON")?;
                    tokio::fs::write(path, json)
                        .await
                        .context("ready sidecar: failed to write metadata file")?;
                }
                if let Some(path) = &node_info_output_file {
                    let json = render_node_info_json(&node_info)
                        .context("ready sidecar: failed to render node info JSON")?;
                    tokio::fs::write(path, json)
                        .await
                        .context("ready sidecar: failed to write node info file")?;
                }
                info!(loadtest = %loadtest_name, workers = required.len(), "ready_workers_resolved");
                return Ok(());
            }
            Err(_) if Instant::now() < deadline => {
                warn!(loadtest = %loadtest_name, have = resolved.len(), want = required.len(), "ready_waiting_for_workers");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            Err(error) => {
                anyhow::bail!("ready sidecar timed out waiting for workers: {error}");
            }
        }
    }
}

async fn resolve_addresses(pods: &[Pod]) -> (Vec<WorkerAddress>, Vec<PodNodeInfo>) {
    let mut resolved = Vec::new();
    let mut node_info = Vec::new();
    for pod in pods {
        let Some(role) = role_of(pod) else { continue };
        let Some(component_name) = component_name_of(pod) else { continue };
        let Some(pod_ip) = pod.status.as_ref().and_then(|s| s.pod_ip.as_deref()) else {
            continue;
        };
        let port = pod
            .spec
            .as_ref()
            .into_iter()
            .flat_map(|s| s.containers.iter())
            .find_map(|c| c.ports.as_ref())
            .and_then(|ports| ports.iter().find(|p| p.name.as_deref() == Some("driver")))
            .map(|p| p.container_port as u16)
            .unwrap_or(loadtest_operator::pod_builder::DEFAULT_DRIVER_PORT as u16);

        if tcp_reachable(pod_ip, port).await {
            resolved.push(WorkerAddress {
                role,
                component_name: component_name.to_string(),
                host: pod_ip.to_string(),
                port,
            });
            node_info.push(PodNodeInfo {
                pod_name: pod.metadata.name.clone().unwrap_or_default(),
                component_name: component_name.to_string(),
                role: role.label(),
                node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
                pod_ip: Some(pod_ip.to_string()),
            });
        }
    }
    (resolved, node_info)
}

async fn tcp_reachable(host: &str, port: u16) -> bool {
    let Ok(mut addrs) = (host, port).to_socket_addrs() else {
        return false;
    };
    let Some(addr) = addrs.next() else {
        return false;
    };
    tokio::time::timeout(Duration::from_millis(500), tokio::net::TcpStream::connect(addr))
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false)
}
