mod common;

use common::make_owned_pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use loadtest_operator::crd::{Component, LoadTest, LoadTestSpec, LoadTestState, Role, RunSpec};
use loadtest_operator::defaults::PodDefaults;
use loadtest_operator::pod_builder::build_pods;
use loadtest_operator::reconciler::missing_by_pool;
use loadtest_operator::status::compute_status;

// ══════════════════════════════════════════════════════════════════
// End-to-end pipeline: spec → pod manifests → missing-pod diff →
// observed pods → status, without touching a live cluster.
// ══════════════════════════════════════════════════════════════════

fn component(name: &str, language: &str) -> Component {
    Component {
        name: Some(name.to_string()),
        language: language.to_string(),
        pool: None,
        clone: None,
        build: None,
        run: RunSpec::default(),
    }
}

fn loadtest(uid: &str) -> LoadTest {
    LoadTest {
        metadata: ObjectMeta {
            name: Some("bench-1".to_string()),
            namespace: Some("default".to_string()),
            uid: Some(uid.to_string()),
            ..Default::default()
        },
        spec: LoadTestSpec {
            driver: Some(component("driver", "go")),
            servers: vec![component("server-0", "go"), component("server-1", "go")],
            clients: vec![component("client-0", "python")],
            timeout_seconds: 600,
            ttl_seconds: 3600,
            ..Default::default()
        },
        status: None,
    }
}

#[test]
fn test_build_pods_covers_every_missing_component() {
    let lt = loadtest("uid-1");
    let defaults = PodDefaults::built_in();

    let pods = build_pods(&lt, &defaults).expect("spec with known languages should build");
    assert_eq!(pods.len(), 4); // driver + 2 servers + 1 client

    // Before any pod exists, everything the builder would produce is missing.
    let missing = missing_by_pool(&lt, &[]);
    let total_missing: usize = missing.values().sum();
    assert_eq!(total_missing, 4);
}

#[test]
fn test_missing_shrinks_as_pods_are_observed() {
    let lt = loadtest("uid-2");

    let observed = vec![
        make_owned_pod(&lt, Role::Driver, "driver", "__default_pool (drivers)", "Running", None),
        make_owned_pod(&lt, Role::Server, "server-0", "__default_pool (servers)", "Running", None),
    ];

    let missing = missing_by_pool(&lt, &observed);
    let total_missing: usize = missing.values().sum();
    assert_eq!(total_missing, 2); // server-1 and client-0 still missing
}

#[test]
fn test_status_progresses_from_initializing_to_running_to_succeeded() {
    let lt = loadtest("uid-3");

    let initializing = compute_status(&lt, &[], "t0");
    assert_eq!(initializing.status.state, LoadTestState::Initializing);

    let all_pods = vec![
        make_owned_pod(&lt, Role::Driver, "driver", "__default_pool (drivers)", "Running", None),
        make_owned_pod(&lt, Role::Server, "server-0", "__default_pool (servers)", "Running", None),
        make_owned_pod(&lt, Role::Server, "server-1", "__default_pool (servers)", "Running", None),
        make_owned_pod(&lt, Role::Client, "client-0", "__default_pool (clients)", "Running", None),
    ];
    let running = compute_status(&lt, &all_pods, "t1");
    assert_eq!(running.status.state, LoadTestState::Running);

    let mut finished = all_pods;
    finished[0] = make_owned_pod(&lt, Role::Driver, "driver", "__default_pool (drivers)", "Succeeded", Some(0));
    let succeeded = compute_status(&lt, &finished, "t2");
    assert_eq!(succeeded.status.state, LoadTestState::Succeeded);
    assert!(succeeded.status.stop_time.is_some());
}

#[test]
fn test_worker_failure_while_driver_running_is_errored() {
    let lt = loadtest("uid-4");

    let pods = vec![
        make_owned_pod(&lt, Role::Driver, "driver", "__default_pool (drivers)", "Running", None),
        make_owned_pod(&lt, Role::Server, "server-0", "__default_pool (servers)", "Running", None),
        make_owned_pod(&lt, Role::Server, "server-1", "__default_pool (servers)", "Failed", Some(1)),
        make_owned_pod(&lt, Role::Client, "client-0", "__default_pool (clients)", "Running", None),
    ];

    let update = compute_status(&lt, &pods, "t0");
    assert_eq!(update.status.state, LoadTestState::Errored);
}

#[test]
fn test_unknown_language_is_rejected_before_reaching_the_cluster() {
    let mut lt = loadtest("uid-5");
    lt.spec.clients[0].language = "cobol".to_string();
    let defaults = PodDefaults::built_in();

    let result = build_pods(&lt, &defaults);
    assert!(result.is_err());
}
