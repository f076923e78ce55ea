use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/* ============================= ROLE ============================= */

/// The three pod roles a LoadTest can produce.
///
/// Modeled as a sum type rather than three near-identical structs: per-role
/// behavior (label value, pool default key, cardinality constraint) is a
/// pure function of the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Driver,
    Server,
    Client,
}

impl Role {
    /// The value stored in the `role` pod label.
    pub fn label(&self) -> &'static str {
        match self {
            Role::Driver => "driver",
            Role::Server => "server",
            Role::Client => "client",
        }
    }

    /// The reserved pool key used when a component omits `pool`.
    pub fn default_pool_key(&self) -> &'static str {
        match self {
            Role::Driver => "__default_pool (drivers)",
            Role::Server => "__default_pool (servers)",
            Role::Client => "__default_pool (clients)",
        }
    }
}

/* ============================= COMPONENT ============================= */

/// One runnable unit of a LoadTest: a driver, server, or client.
///
/// `name` is defaulted by the Pod Builder when empty; `language` selects the
/// default build/run images when `build`/`run` don't override them.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub language: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone: Option<CloneSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSpec>,

    pub run: RunSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CloneSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BuildSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVarSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RunSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVarSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMountSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMountSpec {
    pub name: String,
    pub mount_path: String,
}

/* ============================= RESULTS ============================= */

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResultsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub big_query_table: Option<String>,
}

/* ============================= SPEC ============================= */

/// LoadTest declares one benchmark run: an optional driver, N servers, M
/// clients, plus the scenario payload and timing bounds.
///
/// Both `scenariosJSON` (legacy) and `scenarios` (structured) are accepted;
/// see [`LoadTestSpec::scenarios_payload`] for the precedence rule.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "loadtest.devops.io",
    version = "v1",
    kind = "LoadTest",
    plural = "loadtests",
    status = "LoadTestStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct LoadTestSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<Component>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Component>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clients: Vec<Component>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenarios_json: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenarios: Option<serde_json::Value>,

    pub timeout_seconds: u32,

    pub ttl_seconds: u32,
}

impl LoadTestSpec {
    /// Normalize the two historical scenario fields into one opaque payload.
    ///
    /// `scenariosJSON` wins when both are set — it is the older, more
    /// universally supported field — per the explicit Open Question in the
    /// distilled spec: the core must accept the union, never guess which is
    /// canonical.
    pub fn scenarios_payload(&self) -> Option<String> {
        if let Some(json) = &self.scenarios_json {
            return Some(json.clone());
        }
        self.scenarios.as_ref().map(|v| v.to_string())
    }

    /// All server and client components, in spec order (servers first).
    pub fn workers(&self) -> impl Iterator<Item = (Role, &Component)> {
        self.servers
            .iter()
            .map(|c| (Role::Server, c))
            .chain(self.clients.iter().map(|c| (Role::Client, c)))
    }

    /// All components (driver, then servers, then clients) tagged with role.
    pub fn all_components(&self) -> Vec<(Role, &Component)> {
        let mut out = Vec::new();
        if let Some(driver) = &self.driver {
            out.push((Role::Driver, driver));
        }
        out.extend(self.workers());
        out
    }
}

/* ============================= STATUS ============================= */

/// Terminal precedence: Errored > Failed > Succeeded > Running > Initializing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum LoadTestState {
    #[default]
    Initializing,
    Running,
    Succeeded,
    Failed,
    Errored,
}

impl LoadTestState {
    /// A state is terminal once reached; it must never change afterward.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoadTestState::Succeeded | LoadTestState::Failed | LoadTestState::Errored
        )
    }
}

/// LoadTestStatus reports reconciler-observed convergence state.
///
/// Updated only by the Reconciler via a status-only patch; `state` is
/// monotone toward a terminal value, and `startTime`/`stopTime` are set-once.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoadTestStatus {
    #[serde(default)]
    pub state: LoadTestState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_time: Option<String>,
}

/* ============================= REASON TOKENS ============================= */

/// camelCase reason tokens written to `status.reason`.
pub mod reason {
    pub const BAD_SPEC: &str = "BadSpec";
    pub const PODS_MISSING: &str = "PodsMissing";
    pub const INIT_CONTAINER_ERROR: &str = "InitContainerError";
    pub const CONTAINER_ERROR: &str = "ContainerError";
    pub const API_TRANSIENT: &str = "ApiTransient";
    pub const TIMEOUT: &str = "Timeout";
}

/* ============================= TESTS ============================= */
