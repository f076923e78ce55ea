//! Pure status computation: `spec.md` §4.3. Kept free of any Kubernetes API
//! client so it is testable against hand-built `Pod` fixtures, and so the
//! Reconciler can diff "would the new status differ" without side effects.

use k8s_openapi::api::core::v1::Pod;

use crate::crd::{reason, LoadTest, LoadTestState, LoadTestStatus, Role};
use crate::identity::{owned_by, role_of};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerVerdict {
    Pending,
    Succeeded,
    Errored { exit_code: i32 },
}

fn container_verdict(status: &k8s_openapi::api::core::v1::ContainerStatus) -> ContainerVerdict {
    if let Some(state) = &status.state {
        if let Some(terminated) = &state.terminated {
            return if terminated.exit_code == 0 {
                ContainerVerdict::Succeeded
            } else {
                ContainerVerdict::Errored { exit_code: terminated.exit_code }
            };
        }
        if let Some(waiting) = &state.waiting {
            if waiting.reason.as_deref() == Some("CrashLoopBackOff") {
                return ContainerVerdict::Errored { exit_code: -1 };
            }
        }
    }
    ContainerVerdict::Pending
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PodVerdict {
    Pending,
    Succeeded,
    InitContainerErrored { container: String, exit_code: i32 },
    ContainerErrored { container: String, exit_code: i32 },
}

/// Per-pod rule: scan init containers first (first error wins with
/// `InitContainerError`), then main containers (first error wins with
/// `ContainerError`); otherwise `Succeeded` iff every main container
/// succeeded, else `Pending`.
fn pod_verdict(pod: &Pod) -> PodVerdict {
    let status = pod.status.as_ref();
    if let Some(inits) = status.and_then(|s| s.init_container_statuses.as_ref()) {
        for init in inits {
            if let ContainerVerdict::Errored { exit_code } = container_verdict(init) {
                return PodVerdict::InitContainerErrored { container: init.name.clone(), exit_code };
            }
        }
    }
    let containers = status
        .and_then(|s| s.container_statuses.as_ref())
        .map(|v| v.as_slice())
        .unwrap_or(&[]);
    for container in containers {
        if let ContainerVerdict::Errored { exit_code } = container_verdict(container) {
            return PodVerdict::ContainerErrored { container: container.name.clone(), exit_code };
        }
    }
    if !containers.is_empty()
        && containers
            .iter()
            .all(|c| container_verdict(c) == ContainerVerdict::Succeeded)
    {
        return PodVerdict::Succeeded;
    }
    PodVerdict::Pending
}

/// Result of recomputing status: the new value, and whether it differs
/// from what was already observed (so the Reconciler can skip a no-op
/// status patch).
pub struct StatusUpdate {
    pub status: LoadTestStatus,
    pub changed: bool,
}

/// Recompute `status` for `loadtest` given its currently owned `pods`.
/// `now` is supplied by the caller (never read from the system clock here)
/// so the function stays pure and deterministic under test.
pub fn compute_status(loadtest: &LoadTest, pods: &[Pod], now: &str) -> StatusUpdate {
    let previous = loadtest.status.clone().unwrap_or_default();
    let mut next = previous.clone();

    if next.start_time.is_none() {
        next.start_time = Some(now.to_string());
    }

    let owned: Vec<&Pod> = pods.iter().filter(|p| owned_by(p, loadtest)).collect();

    let driver_verdict = owned
        .iter()
        .find(|p| role_of(p) == Some(Role::Driver))
        .map(|p| pod_verdict(p));

    let worker_errored = owned.iter().find_map(|p| {
        if role_of(p) == Some(Role::Driver) {
            return None;
        }
        match pod_verdict(p) {
            PodVerdict::InitContainerErrored { container, exit_code } => {
                Some((true, container, exit_code))
            }
            PodVerdict::ContainerErrored { container, exit_code } => {
                Some((false, container, exit_code))
            }
            _ => None,
        }
    });

    let (state, reason_token, message) = match driver_verdict {
        Some(PodVerdict::InitContainerErrored { container, exit_code }) => (
            LoadTestState::Errored,
            Some(reason::INIT_CONTAINER_ERROR),
            Some(format!(
                "init container \"{container}\" terminated with exit code {exit_code}"
            )),
        ),
        Some(PodVerdict::ContainerErrored { container, exit_code }) => (
            LoadTestState::Failed,
            Some(reason::CONTAINER_ERROR),
            Some(format!(
                "container \"{container}\" terminated with exit code {exit_code}"
            )),
        ),
        Some(PodVerdict::Succeeded) => {
            (LoadTestState::Succeeded, None, None)
        }
        _ if worker_errored.is_some() => {
            let (is_init, container, exit_code) = worker_errored.unwrap();
            if is_init {
                (
                    LoadTestState::Errored,
                    Some(reason::INIT_CONTAINER_ERROR),
                    Some(format!(
                        "init container \"{container}\" terminated with exit code {exit_code} on a worker pod"
                    )),
                )
            } else {
                (
                    LoadTestState::Errored,
                    Some(reason::CONTAINER_ERROR),
                    Some(format!(
                        "container \"{container}\" terminated with exit code {exit_code} on a worker pod"
                    )),
                )
            }
        }
        _ => {
            let required = required_pod_count(loadtest);
            let observed = owned.len();
            if observed < required {
                (
                    LoadTestState::Initializing,
                    Some(reason::PODS_MISSING),
                    Some(format!("created {observed}/{required} required pods")),
                )
            } else {
                (LoadTestState::Running, None, None)
            }
        }
    };

    // Monotone precedence: never move away from a terminal state already
    // recorded, even if an unexpected later observation would disagree.
    if previous.state.is_terminal() {
        return StatusUpdate {
            changed: false,
            status: previous,
        };
    }

    next.state = state;
    next.reason = reason_token.map(str::to_string);
    next.message = message;

    if next.state.is_terminal() && next.stop_time.is_none() {
        next.stop_time = Some(now.to_string());
    }

    let changed = next.state != previous.state
        || next.reason != previous.reason
        || next.message != previous.message
        || next.start_time != previous.start_time
        || next.stop_time != previous.stop_time;

    StatusUpdate {
        status: next,
        changed,
    }
}

fn required_pod_count(loadtest: &LoadTest) -> usize {
    let spec = &loadtest.spec;
    spec.driver.is_some() as usize + spec.servers.len() + spec.clients.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Component, LoadTestSpec, RunSpec};
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateTerminated, ContainerStatus, PodStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn base_loadtest() -> LoadTest {
        LoadTest {
            metadata: ObjectMeta {
                name: Some("lt1".to_string()),
                uid: Some("uid-1".to_string()),
                ..Default::default()
            },
            spec: LoadTestSpec {
                driver: Some(Component {
                    name: None,
                    language: "go".to_string(),
                    pool: None,
                    clone: None,
                    build: None,
                    run: RunSpec::default(),
                }),
                timeout_seconds: 60,
                ttl_seconds: 3600,
                ..Default::default()
            },
            status: None,
        }
    }

    fn owned_pod(loadtest: &LoadTest, role: Role) -> Pod {
        let mut pod = Pod {
            metadata: ObjectMeta {
                owner_references: Some(vec![crate::identity::owner_reference(loadtest)]),
                labels: Some(crate::identity::pod_labels(
                    loadtest.metadata.name.as_deref().unwrap(),
                    role,
                    "driver",
                    "pool",
                )),
                ..Default::default()
            },
            ..Default::default()
        };
        pod.status = Some(PodStatus::default());
        pod
    }

    fn with_container_exit(pod: Pod, exit_code: i32) -> Pod {
        with_named_container_exit(pod, "driver", exit_code)
    }

    fn with_named_container_exit(mut pod: Pod, container: &str, exit_code: i32) -> Pod {
        pod.status.as_mut().unwrap().container_statuses = Some(vec![ContainerStatus {
            name: container.to_string(),
            state: Some(ContainerState {
                terminated: Some(ContainerStateTerminated {
                    exit_code,
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);
        pod
    }

    fn with_named_init_container_exit(mut pod: Pod, container: &str, exit_code: i32) -> Pod {
        pod.status.as_mut().unwrap().init_container_statuses = Some(vec![ContainerStatus {
            name: container.to_string(),
            state: Some(ContainerState {
                terminated: Some(ContainerStateTerminated {
                    exit_code,
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);
        pod
    }

    #[test]
    fn test_no_pods_yet_is_initializing_pods_missing() {
        let lt = base_loadtest();
        let update = compute_status(&lt, &[], "t0");
        assert_eq!(update.status.state, LoadTestState::Initializing);
        assert_eq!(update.status.reason.as_deref(), Some(reason::PODS_MISSING));
        assert!(update.changed);
    }

    #[test]
    fn test_driver_running_with_no_verdict_yet_is_running() {
        let lt = base_loadtest();
        let pod = owned_pod(&lt, Role::Driver);
        let update = compute_status(&lt, &[pod], "t0");
        assert_eq!(update.status.state, LoadTestState::Running);
    }

    #[test]
    fn test_driver_succeeded_zero_exit() {
        let lt = base_loadtest();
        let pod = with_container_exit(owned_pod(&lt, Role::Driver), 0);
        let update = compute_status(&lt, &[pod], "t0");
        assert_eq!(update.status.state, LoadTestState::Succeeded);
        assert!(update.status.stop_time.is_some());
    }

    #[test]
    fn test_driver_container_error_is_failed() {
        let lt = base_loadtest();
        let pod = with_container_exit(owned_pod(&lt, Role::Driver), 1);
        let update = compute_status(&lt, &[pod], "t0");
        assert_eq!(update.status.state, LoadTestState::Failed);
        assert_eq!(update.status.reason.as_deref(), Some(reason::CONTAINER_ERROR));
    }

    #[test]
    fn test_driver_container_exit_127_message_names_container_and_code() {
        let lt = base_loadtest();
        let pod = with_named_container_exit(owned_pod(&lt, Role::Driver), "driver", 127);
        let update = compute_status(&lt, &[pod], "t0");
        assert_eq!(update.status.state, LoadTestState::Failed);
        assert_eq!(update.status.reason.as_deref(), Some(reason::CONTAINER_ERROR));
        assert_eq!(
            update.status.message.as_deref(),
            Some("container \"driver\" terminated with exit code 127")
        );
    }

    #[test]
    fn test_driver_init_container_error_message_names_container_and_code() {
        let lt = base_loadtest();
        let pod = with_named_init_container_exit(owned_pod(&lt, Role::Driver), "clone", 1);
        let update = compute_status(&lt, &[pod], "t0");
        assert_eq!(update.status.state, LoadTestState::Errored);
        assert_eq!(update.status.reason.as_deref(), Some(reason::INIT_CONTAINER_ERROR));
        assert_eq!(
            update.status.message.as_deref(),
            Some("init container \"clone\" terminated with exit code 1")
        );
    }

    #[test]
    fn test_worker_init_container_error_while_driver_running_is_errored_with_init_reason() {
        let lt = base_loadtest();
        let driver = owned_pod(&lt, Role::Driver);
        let worker = with_named_init_container_exit(owned_pod(&lt, Role::Server), "clone", 1);
        let update = compute_status(&lt, &[driver, worker], "t0");
        assert_eq!(update.status.state, LoadTestState::Errored);
        assert_eq!(update.status.reason.as_deref(), Some(reason::INIT_CONTAINER_ERROR));
        assert_eq!(
            update.status.message.as_deref(),
            Some("init container \"clone\" terminated with exit code 1 on a worker pod")
        );
    }

    #[test]
    fn test_worker_container_error_while_driver_running_is_errored_with_container_reason() {
        let lt = base_loadtest();
        let driver = owned_pod(&lt, Role::Driver);
        let worker = with_named_container_exit(owned_pod(&lt, Role::Server), "main", 2);
        let update = compute_status(&lt, &[driver, worker], "t0");
        assert_eq!(update.status.state, LoadTestState::Errored);
        assert_eq!(update.status.reason.as_deref(), Some(reason::CONTAINER_ERROR));
        assert_eq!(
            update.status.message.as_deref(),
            Some("container \"main\" terminated with exit code 2 on a worker pod")
        );
    }

    #[test]
    fn test_terminal_state_never_changes_on_subsequent_reconcile() {
        let mut lt = base_loadtest();
        let pod = with_container_exit(owned_pod(&lt, Role::Driver), 0);
        let first = compute_status(&lt, &[pod.clone()], "t0");
        lt.status = Some(first.status.clone());
        let failing_pod = with_container_exit(owned_pod(&lt, Role::Driver), 1);
        let second = compute_status(&lt, &[failing_pod], "t1");
        assert_eq!(second.status.state, LoadTestState::Succeeded);
        assert!(!second.changed);
    }

    #[test]
    fn test_start_time_set_once() {
        let mut lt = base_loadtest();
        let pod = owned_pod(&lt, Role::Driver);
        let first = compute_status(&lt, &[pod.clone()], "t0");
        lt.status = Some(first.status.clone());
        let second = compute_status(&lt, &[pod], "t1");
        assert_eq!(second.status.start_time, first.status.start_time);
    }

    #[test]
    fn test_unowned_pods_are_ignored() {
        let lt = base_loadtest();
        let mut other = base_loadtest();
        other.metadata.uid = Some("other-uid".to_string());
        let stray = owned_pod(&other, Role::Driver);
        let update = compute_status(&lt, &[stray], "t0");
        assert_eq!(update.status.state, LoadTestState::Initializing);
    }
}
