//! Deterministic translation of a [`LoadTest`] into the pod manifests
//! needed to run it. Exactly `spec.md` §4.1: given identical spec and
//! defaults, the produced manifests are byte-identical modulo timestamps
//! and UID.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, EnvVar, Pod, PodSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::crd::{Component, LoadTest, Role};
use crate::defaults::{resolve_pool, PodDefaults};
use crate::error::LoadTestError;
use crate::identity::{owner_reference, pod_labels};

pub const DEFAULT_DRIVER_PORT: i32 = 10000;
pub const DRIVER_PORT_NAME: &str = "driver";
pub const CLEANUP_PORT: i32 = 9091;
pub const CLEANUP_PORT_NAME: &str = "cleanup";
const WORKSPACE_VOLUME: &str = "workspace";
const WORKSPACE_MOUNT: &str = "/src/workspace";
const READY_INFO_VOLUME: &str = "ready-info";
const READY_INFO_MOUNT: &str = "/var/run/loadtest-ready";
const READY_OUTPUT_FILE: &str = "/var/run/loadtest-ready/workers";
const METADATA_OUTPUT_FILE: &str = "/var/run/loadtest-ready/metadata.json";
const NODE_INFO_OUTPUT_FILE: &str = "/var/run/loadtest-ready/node-info.json";

/// Build every pod manifest a LoadTest requires, in spec order (driver,
/// then servers, then clients). Names are disambiguated by role + index so
/// `component-name` labels are always unique within the LoadTest.
pub fn build_pods(
    loadtest: &LoadTest,
    defaults: &PodDefaults,
) -> Result<Vec<Pod>, LoadTestError> {
    let spec = &loadtest.spec;
    let mut pods = Vec::new();

    if let Some(driver) = &spec.driver {
        pods.push(build_pod(loadtest, defaults, Role::Driver, 0, driver)?);
    }
    for (index, component) in spec.servers.iter().enumerate() {
        pods.push(build_pod(loadtest, defaults, Role::Server, index, component)?);
    }
    for (index, component) in spec.clients.iter().enumerate() {
        pods.push(build_pod(loadtest, defaults, Role::Client, index, component)?);
    }
    Ok(pods)
}

fn component_name(role: Role, index: usize, component: &Component) -> String {
    component
        .name
        .clone()
        .unwrap_or_else(|| format!("{}-{index}", role.label()))
}

fn build_pod(
    loadtest: &LoadTest,
    defaults: &PodDefaults,
    role: Role,
    index: usize,
    component: &Component,
) -> Result<Pod, LoadTestError> {
    let name = component_name(role, index, component);
    let pool = resolve_pool(role, component.pool.as_deref());

    let run_image = component
        .run
        .image
        .clone()
        .or_else(|| defaults.run_image(&component.language).map(str::to_string))
        .ok_or_else(|| {
            LoadTestError::bad_spec(format!(
                "component `{name}`: no run image override and no default for language `{}`",
                component.language
            ))
        })?;

    let mut init_containers = Vec::new();
    if let Some(clone) = &component.clone {
        let image = clone.image.clone().ok_or_else(|| {
            LoadTestError::bad_spec(format!("component `{name}`: clone step requires an image"))
        })?;
        init_containers.push(Container {
            name: "clone".to_string(),
            image: Some(image),
            volume_mounts: Some(vec![workspace_mount()]),
            ..Default::default()
        });
    }
    if let Some(build) = &component.build {
        let image = build
            .image
            .clone()
            .or_else(|| defaults.build_image(&component.language).map(str::to_string))
            .ok_or_else(|| {
                LoadTestError::bad_spec(format!(
                    "component `{name}`: no build image override and no default for language `{}`",
                    component.language
                ))
            })?;
        init_containers.push(Container {
            name: "build".to_string(),
            image: Some(image),
            command: non_empty(build.command.clone()),
            args: non_empty(build.args.clone()),
            env: non_empty_env(&build.env),
            volume_mounts: Some(vec![workspace_mount()]),
            ..Default::default()
        });
    }
    if role == Role::Driver {
        init_containers.push(Container {
            name: "ready".to_string(),
            image: Some(run_image.clone()),
            command: Some(vec![
                "loadtest-operator".to_string(),
                "ready".to_string(),
            ]),
            env: Some(ready_info_env()),
            volume_mounts: Some(vec![ready_info_mount()]),
            ..Default::default()
        });
    }

    let mut env = env_vars(&component.run.env);
    if role == Role::Driver {
        env.extend(ready_info_env());
        if let Some(payload) = loadtest.spec.scenarios_payload() {
            env.push(EnvVar {
                name: "LOADTEST_SCENARIOS".to_string(),
                value: Some(payload),
                ..Default::default()
            });
        }
        if let Some(results) = &loadtest.spec.results {
            if let Some(table) = &results.big_query_table {
                env.push(EnvVar {
                    name: "LOADTEST_BIGQUERY_TABLE".to_string(),
                    value: Some(table.clone()),
                    ..Default::default()
                });
            }
        }
    }

    let mut volume_mounts: Vec<VolumeMount> = component
        .run
        .volume_mounts
        .iter()
        .map(|vm| VolumeMount {
            name: vm.name.clone(),
            mount_path: vm.mount_path.clone(),
            ..Default::default()
        })
        .collect();
    if !init_containers.is_empty() {
        volume_mounts.push(workspace_mount());
    }
    if role == Role::Driver {
        volume_mounts.push(ready_info_mount());
    }

    let ports = if role != Role::Driver {
        Some(vec![ContainerPort {
            name: Some(DRIVER_PORT_NAME.to_string()),
            container_port: DEFAULT_DRIVER_PORT,
            ..Default::default()
        }])
    } else {
        None
    };

    let main_container = Container {
        name: "main".to_string(),
        image: Some(run_image.clone()),
        command: non_empty(component.run.command.clone()),
        args: non_empty(component.run.args.clone()),
        env: non_empty_env(&env.clone()),
        ports,
        volume_mounts: non_empty_vec(volume_mounts),
        ..Default::default()
    };

    let mut containers = vec![main_container];
    if role != Role::Driver {
        containers.push(Container {
            name: "cleanup".to_string(),
            image: Some(run_image),
            command: Some(vec![
                "loadtest-operator".to_string(),
                "cleanup".to_string(),
                "--port".to_string(),
                CLEANUP_PORT.to_string(),
            ]),
            ports: Some(vec![ContainerPort {
                name: Some(CLEANUP_PORT_NAME.to_string()),
                container_port: CLEANUP_PORT,
                ..Default::default()
            }]),
            ..Default::default()
        });
    }

    let mut volumes = Vec::new();
    if !init_containers.is_empty() {
        volumes.push(Volume {
            name: WORKSPACE_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
    }
    if role == Role::Driver {
        volumes.push(Volume {
            name: READY_INFO_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
    }
    let volumes = non_empty_vec(volumes);

    let mut node_selector = BTreeMap::new();
    node_selector.insert("pool".to_string(), pool.clone());

    Ok(Pod {
        metadata: ObjectMeta {
            name: Some(format!("{}-{name}", loadtest.metadata.name.as_deref().unwrap_or("loadtest"))),
            namespace: loadtest.metadata.namespace.clone(),
            labels: Some(pod_labels(
                loadtest.metadata.name.as_deref().unwrap_or_default(),
                role,
                &name,
                &pool,
            )),
            owner_references: Some(vec![owner_reference(loadtest)]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            init_containers: non_empty_vec(init_containers),
            containers,
            volumes,
            node_selector: Some(node_selector),
            restart_policy: Some("Never".to_string()),
            ..Default::default()
        }),
        status: None,
    })
}

fn workspace_mount() -> VolumeMount {
    VolumeMount {
        name: WORKSPACE_VOLUME.to_string(),
        mount_path: WORKSPACE_MOUNT.to_string(),
        ..Default::default()
    }
}

/// The volume the `ready` init container and the driver's main container
/// share so the address/metadata/node-info files the Ready sidecar writes
/// are actually visible to the driver process that reads them.
fn ready_info_mount() -> VolumeMount {
    VolumeMount {
        name: READY_INFO_VOLUME.to_string(),
        mount_path: READY_INFO_MOUNT.to_string(),
        ..Default::default()
    }
}

/// Env vars pointing the Ready sidecar (and the driver) at the shared
/// `ready-info` volume instead of the package defaults, which would land
/// in throwaway per-container storage.
fn ready_info_env() -> Vec<EnvVar> {
    vec![
        EnvVar {
            name: "READY_OUTPUT_FILE".to_string(),
            value: Some(READY_OUTPUT_FILE.to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "METADATA_OUTPUT_FILE".to_string(),
            value: Some(METADATA_OUTPUT_FILE.to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "NODE_INFO_OUTPUT_FILE".to_string(),
            value: Some(NODE_INFO_OUTPUT_FILE.to_string()),
            ..Default::default()
        },
    ]
}

fn env_vars(specs: &[crate::crd::EnvVarSpec]) -> Vec<EnvVar> {
    specs
        .iter()
        .map(|e| EnvVar {
            name: e.name.clone(),
            value: e.value.clone(),
            ..Default::default()
        })
        .collect()
}

fn non_empty_env(specs: &[crate::crd::EnvVarSpec]) -> Option<Vec<EnvVar>> {
    non_empty_vec(env_vars(specs))
}

fn non_empty(v: Vec<String>) -> Option<Vec<String>> {
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

fn non_empty_vec<T>(v: Vec<T>) -> Option<Vec<T>> {
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}
