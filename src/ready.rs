//! The driver's `ready` init container: blocks until every required worker
//! pod is reachable, then writes the address file the driver's main
//! container reads to find its peers.
//!
//! Pure logic lives here so it is testable without a live cluster; the
//! polling/API glue lives in `commands::ready`.

use std::time::Duration;

use serde::Serialize;

use crate::crd::{LoadTest, Role};
use crate::error::LoadTestError;

pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(25 * 60);
pub const DEFAULT_READY_OUTPUT_FILE: &str = "/tmp/loadtest_workers";

/// One worker's resolved address, as known to the Ready sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerAddress {
    pub role: Role,
    pub component_name: String,
    pub host: String,
    pub port: u16,
}

impl WorkerAddress {
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One resolved worker as it appears in the `METADATA_OUTPUT_FILE` JSON.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResolvedWorker {
    pub role: &'static str,
    pub component_name: String,
    pub host: String,
    pub port: u16,
}

impl From<&WorkerAddress> for ResolvedWorker {
    fn from(address: &WorkerAddress) -> Self {
        ResolvedWorker {
            role: address.role.label(),
            component_name: address.component_name.clone(),
            host: address.host.clone(),
            port: address.port,
        }
    }
}

/// `METADATA_OUTPUT_FILE` contents: which LoadTest this is, and the worker
/// set the address file was built from.
#[derive(Debug, Clone, Serialize)]
pub struct ReadyMetadata {
    pub loadtest_name: String,
    pub namespace: Option<String>,
    pub workers: Vec<ResolvedWorker>,
}

/// Render `METADATA_OUTPUT_FILE`'s JSON body.
pub fn render_metadata_json(loadtest: &LoadTest, resolved: &[WorkerAddress]) -> serde_json::Result<String> {
    let metadata = ReadyMetadata {
        loadtest_name: loadtest.metadata.name.clone().unwrap_or_default(),
        namespace: loadtest.metadata.namespace.clone(),
        workers: resolved.iter().map(ResolvedWorker::from).collect(),
    };
    serde_json::to_string_pretty(&metadata)
}

/// One worker pod's node placement, as it appears in `NODE_INFO_OUTPUT_FILE`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PodNodeInfo {
    pub pod_name: String,
    pub component_name: String,
    pub role: &'static str,
    pub node_name: Option<String>,
    pub pod_ip: Option<String>,
}

/// Render `NODE_INFO_OUTPUT_FILE`'s JSON body.
pub fn render_node_info_json(entries: &[PodNodeInfo]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(entries)
}

/// The full set of required workers for a LoadTest, in the order the
/// address file must list them: servers first, then clients, in spec order.
pub fn required_workers(loadtest: &LoadTest) -> Vec<(Role, String)> {
    loadtest
        .spec
        .workers()
        .map(|(role, component)| {
            let name = component
                .name
                .clone()
                .unwrap_or_else(|| format!("{}-0", role.label()));
            (role, name)
        })
        .collect()
}

/// Render the comma-separated `host:port` list in spec order. Fails with
/// `PodsMissing` if `resolved` does not cover every required worker.
pub fn render_address_file(
    loadtest: &LoadTest,
    resolved: &[WorkerAddress],
) -> Result<String, LoadTestError> {
    let required = required_workers(loadtest);
    let mut lines = Vec::with_capacity(required.len());
    for (role, name) in &required {
        let address = resolved
            .iter()
            .find(|w| w.role == *role && &w.component_name == name)
            .ok_or_else(|| LoadTestError::PodsMissing {
                have: resolved.len(),
                want: required.len(),
            })?;
        lines.push(address.host_port());
    }
    Ok(lines.join(","))
}
