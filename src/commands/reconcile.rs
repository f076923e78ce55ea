use std::net::SocketAddr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::{Action, Controller};
use kube::{Client, ResourceExt};
use prometheus::{Encoder, Histogram, IntCounter, IntCounterVec, IntGaugeVec, Registry, TextEncoder};
use tokio::signal;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use loadtest_operator::cleanup::notify_quit;
use loadtest_operator::crd::{LoadTest, Role};
use loadtest_operator::defaults::PodDefaults;
use loadtest_operator::error::LoadTestError;
use loadtest_operator::identity::{owned_by, role_of, FINALIZER};
use loadtest_operator::pod_builder::{build_pods, CLEANUP_PORT};
use loadtest_operator::reconciler::{missing_by_pool, ttl_expired};
use loadtest_operator::status::compute_status;

/* ============================= CONFIG ============================= */

const REQUEUE_INTERVAL: Duration = Duration::from_secs(30);
const PODS_MISSING_REQUEUE: Duration = Duration::from_secs(10);

/* ============================= PROMETHEUS ============================= */

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILE_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new("loadtest_reconcile_total", "Total LoadTest reconciliation cycles")
        .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static RECONCILE_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new("loadtest_reconcile_errors_total", "Total LoadTest reconciliation errors")
        .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static ACTIVE_BY_STATE: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    let g = IntGaugeVec::new(
        prometheus::Opts::new("loadtest_active", "LoadTests currently observed per state"),
        &["state"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(g.clone())).expect("metric not yet registered");
    g
});

static PODS_CREATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new("loadtest_pods_created_total", "Total pods created by the reconciler")
        .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static RECONCILE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    let h = Histogram::with_opts(prometheus::HistogramOpts::new(
        "loadtest_reconcile_duration_seconds",
        "Duration of each reconciliation cycle in seconds",
    ))
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(h.clone())).expect("metric not yet registered");
    h
});

static TTL_DELETIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new("loadtest_ttl_deletions_total", "Total LoadTests deleted for exceeding their TTL")
        .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static BAD_SPEC_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let c = IntCounterVec::new(
        prometheus::Opts::new("loadtest_bad_spec_total", "LoadTests rejected as BadSpec, by namespace"),
        &["namespace"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

/* ============================= STATE ============================= */

pub(crate) struct ReconcileState {
    pub(crate) ready: bool,
}

/* ============================= CONTEXT ============================= */

struct ReconcileContext {
    client: Client,
    defaults: PodDefaults,
    http_client: reqwest::Client,
}

/* ============================= ENTRY ============================= */

pub async fn run() -> Result<()> {
    println!("Starting LoadTest operator...\n");

    let client = Client::try_default().await.context("Failed to load kubeconfig")?;

    print!("  Cluster connection .......... ");
    match client.apiserver_version().await {
        Ok(v) => println!("OK (v{}.{})", v.major, v.minor),
        Err(e) => {
            println!("FAIL");
            anyhow::bail!("Cannot reach cluster: {}. Is the cluster running?", e);
        }
    }

    let loadtests: Api<LoadTest> = Api::all(client.clone());
    let pods: Api<Pod> = Api::all(client.clone());

    let ctx = Arc::new(ReconcileContext {
        client: client.clone(),
        defaults: PodDefaults::built_in(),
        http_client: reqwest::Client::new(),
    });

    LazyLock::force(&RECONCILE_TOTAL);
    LazyLock::force(&RECONCILE_ERRORS);
    LazyLock::force(&ACTIVE_BY_STATE);
    LazyLock::force(&PODS_CREATED_TOTAL);
    LazyLock::force(&RECONCILE_DURATION);
    LazyLock::force(&TTL_DELETIONS_TOTAL);
    LazyLock::force(&BAD_SPEC_TOTAL);

    let addr = SocketAddr::from(([0, 0, 0, 0], 9090));

    println!("  CRD watch ................... LoadTest.loadtest.devops.io/v1");
    println!("  Requeue interval ............ {}s", REQUEUE_INTERVAL.as_secs());
    println!("  Metrics server .............. http://{addr}");
    println!();
    println!("  Available endpoints:");
    println!("    GET /healthz .............. Liveness probe (always 200 OK)");
    println!("    GET /readyz ............... Readiness probe (503 until first reconcile, then 200)");
    println!("    GET /metrics .............. Prometheus metrics scrape endpoint");
    println!();
    println!("Operator running. Press Ctrl+C to stop.\n");
    println!("{}", "=".repeat(70));

    info!("operator_controller_started");

    let reconcile_state = Arc::new(Mutex::new(ReconcileState { ready: false }));
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let http_state = reconcile_state.clone();
    let http_shutdown = shutdown_tx.subscribe();
    let http_handle = tokio::spawn(async move { start_metrics_server(http_state, http_shutdown, addr).await });

    let controller_state = reconcile_state.clone();
    let controller = Controller::new(loadtests, Default::default())
        .owns(pods, Default::default())
        .run(reconcile, error_policy, ctx)
        .for_each(move |result| {
            let state = controller_state.clone();
            async move {
                {
                    let mut s = state.lock().await;
                    if !s.ready {
                        s.ready = true;
                    }
                }
                if let Err(e) = result {
                    warn!(error = %e, "reconcile_dispatch_error");
                    eprintln!("[ERROR] Reconcile dispatch: {e}");
                }
            }
        });

    tokio::select! {
        _ = controller => {
            info!("operator_controller_stream_ended");
            println!("\nController stream ended unexpectedly.");
        }
        _ = signal::ctrl_c() => {
            info!("shutdown_signal_received");
            println!("\n{}", "=".repeat(70));
            println!("Shutdown signal received. Stopping operator...");
            println!("{}", "=".repeat(70));
        }
    }

    let _ = shutdown_tx.send(());
    let _ = http_handle.await?;

    info!("operator_stopped");
    println!("Operator stopped.");

    Ok(())
}

/* ============================= RECONCILE ============================= */

async fn reconcile(loadtest: Arc<LoadTest>, ctx: Arc<ReconcileContext>) -> std::result::Result<Action, kube::Error> {
    let name = loadtest.name_any();
    let namespace = loadtest.namespace().unwrap_or_default();

    RECONCILE_TOTAL.inc();
    let _timer = RECONCILE_DURATION.start_timer();

    info!(loadtest = %name, namespace = %namespace, "reconcile_start");

    if loadtest.metadata.deletion_timestamp.is_some() {
        return handle_deletion(&loadtest, &ctx.client, &ctx.http_client).await;
    }

    if !has_finalizer(&loadtest) {
        add_finalizer(&loadtest, &ctx.client).await?;
    }

    let pods_api: Api<Pod> = Api::namespaced(ctx.client.clone(), &namespace);
    let pod_list = pods_api.list(&Default::default()).await?;

    if let Some(created_at) = loadtest.metadata.creation_timestamp.as_ref() {
        let now = chrono::Utc::now().timestamp();
        if ttl_expired(created_at.0.timestamp(), loadtest.spec.ttl_seconds, now) {
            let loadtests_api: Api<LoadTest> = Api::namespaced(ctx.client.clone(), &namespace);
            loadtests_api.delete(&name, &Default::default()).await?;
            TTL_DELETIONS_TOTAL.inc();
            info!(loadtest = %name, namespace = %namespace, "ttl_expired_deleted");
            return Ok(Action::await_change());
        }
    }

    match build_pods(&loadtest, &ctx.defaults) {
        Ok(desired) => {
            let missing = missing_by_pool(&loadtest, &pod_list.items);
            if missing.is_empty() {
                let status_update = compute_status(&loadtest, &pod_list.items, &chrono::Utc::now().to_rfc3339());
                let became_terminal = status_update.changed
                    && status_update.status.state.is_terminal()
                    && !loadtest.status.as_ref().is_some_and(|s| s.state.is_terminal());
                if status_update.changed {
                    patch_status(&ctx.client, &namespace, &name, &status_update.status).await?;
                }
                update_active_gauge(&status_update.status.state);
                if became_terminal {
                    notify_workers(&ctx.http_client, &loadtest, &pod_list.items).await;
                }
            } else {
                for pod in desired {
                    let exists = pod_list
                        .items
                        .iter()
                        .any(|observed| observed.metadata.name == pod.metadata.name);
                    if exists {
                        continue;
                    }
                    pods_api.create(&Default::default(), &pod).await?;
                    PODS_CREATED_TOTAL.inc();
                    info!(loadtest = %name, pod = ?pod.metadata.name, "pod_created");
                }
                let status_update = compute_status(&loadtest, &pod_list.items, &chrono::Utc::now().to_rfc3339());
                if status_update.changed {
                    patch_status(&ctx.client, &namespace, &name, &status_update.status).await?;
                }
                update_active_gauge(&status_update.status.state);
                return Ok(Action::requeue(PODS_MISSING_REQUEUE));
            }
        }
        Err(LoadTestError::BadSpec(message)) => {
            BAD_SPEC_TOTAL.with_label_values(&[&namespace]).inc();
            let mut status = loadtest.status.clone().unwrap_or_default();
            status.state = loadtest_operator::crd::LoadTestState::Errored;
            status.reason = Some(loadtest_operator::crd::reason::BAD_SPEC.to_string());
            status.message = Some(message);
            patch_status(&ctx.client, &namespace, &name, &status).await?;
            return Ok(Action::await_change());
        }
        Err(other) => {
            warn!(loadtest = %name, error = %other, "unexpected_pod_builder_error");
        }
    }

    Ok(Action::requeue(REQUEUE_INTERVAL))
}

/// Tell every still-running non-driver pod's Cleanup Agent sidecar to quit,
/// now that the driver has reached a terminal state. Best-effort: a pod
/// that already exited or is unreachable is not an error, just a skip.
async fn notify_workers(http_client: &reqwest::Client, loadtest: &LoadTest, pods: &[Pod]) {
    for pod in pods {
        if !owned_by(pod, loadtest) || role_of(pod) == Some(Role::Driver) {
            continue;
        }
        let Some(pod_ip) = pod.status.as_ref().and_then(|s| s.pod_ip.as_deref()) else {
            continue;
        };
        let pod_name = pod.metadata.name.clone().unwrap_or_default();
        if let Err(error) = notify_quit(http_client, &format!("{pod_ip}:{CLEANUP_PORT}")).await {
            warn!(pod = %pod_name, error = %error, "cleanup_notify_failed");
        }
    }
}

fn update_active_gauge(state: &loadtest_operator::crd::LoadTestState) {
    for candidate in [
        loadtest_operator::crd::LoadTestState::Initializing,
        loadtest_operator::crd::LoadTestState::Running,
        loadtest_operator::crd::LoadTestState::Succeeded,
        loadtest_operator::crd::LoadTestState::Failed,
        loadtest_operator::crd::LoadTestState::Errored,
    ] {
        let label = format!("{candidate:?}").to_lowercase();
        let value = if candidate == *state { 1 } else { 0 };
        ACTIVE_BY_STATE.with_label_values(&[&label]).set(value);
    }
}

async fn patch_status(
    client: &Client,
    namespace: &str,
    name: &str,
    status: &loadtest_operator::crd::LoadTestStatus,
) -> std::result::Result<(), kube::Error> {
    let loadtests_api: Api<LoadTest> = Api::namespaced(client.clone(), namespace);
    let status_patch = serde_json::json!({ "status": status });
    loadtests_api
        .patch_status(name, &PatchParams::apply("loadtest-operator"), &Patch::Merge(&status_patch))
        .await?;
    info!(loadtest = %name, namespace = %namespace, "status_updated");
    Ok(())
}

/* ============================= ERROR POLICY ============================= */

fn error_policy(_loadtest: Arc<LoadTest>, error: &kube::Error, _ctx: Arc<ReconcileContext>) -> Action {
    RECONCILE_ERRORS.inc();
    warn!(error = %error, "reconcile_error");
    Action::requeue(Duration::from_secs(60))
}

/* ============================= FINALIZER ============================= */

fn has_finalizer(loadtest: &LoadTest) -> bool {
    loadtest
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|s| s == FINALIZER))
}

async fn add_finalizer(loadtest: &LoadTest, client: &Client) -> std::result::Result<(), kube::Error> {
    let name = loadtest.name_any();
    let namespace = loadtest.namespace().unwrap_or_default();
    let api: Api<LoadTest> = Api::namespaced(client.clone(), &namespace);

    let patch = serde_json::json!({ "metadata": { "finalizers": [FINALIZER] } });
    api.patch(&name, &PatchParams::apply("loadtest-operator"), &Patch::Merge(&patch)).await?;

    info!(loadtest = %name, "finalizer_added");
    Ok(())
}

async fn remove_finalizer(loadtest: &LoadTest, client: &Client) -> std::result::Result<(), kube::Error> {
    let name = loadtest.name_any();
    let namespace = loadtest.namespace().unwrap_or_default();
    let api: Api<LoadTest> = Api::namespaced(client.clone(), &namespace);

    let patch = serde_json::json!({ "metadata": { "finalizers": [] } });
    api.patch(&name, &PatchParams::apply("loadtest-operator"), &Patch::Merge(&patch)).await?;

    info!(loadtest = %name, "finalizer_removed");
    Ok(())
}

async fn handle_deletion(
    loadtest: &LoadTest,
    client: &Client,
    http_client: &reqwest::Client,
) -> std::result::Result<Action, kube::Error> {
    let name = loadtest.name_any();
    let namespace = loadtest.namespace().unwrap_or_default();

    info!(loadtest = %name, namespace = %namespace, "handling_deletion");

    if has_finalizer(loadtest) {
        let pods_api: Api<Pod> = Api::namespaced(client.clone(), &namespace);
        let pod_list = pods_api.list(&Default::default()).await?;
        notify_workers(http_client, loadtest, &pod_list.items).await;
        remove_finalizer(loadtest, client).await?;
    }

    Ok(Action::await_change())
}

/* ============================= HTTP SERVER ============================= */

pub(crate) fn build_reconcile_router(state: Arc<Mutex<ReconcileState>>) -> Router {
    Router::new()
        .route("/metrics", get(reconcile_metrics_handler))
        .route("/healthz", get(|| async { (StatusCode::OK, "OK") }))
        .route(
            "/readyz",
            get({
                let state = state.clone();
                move || reconcile_ready_handler(state.clone())
            }),
        )
}

async fn start_metrics_server(
    state: Arc<Mutex<ReconcileState>>,
    mut shutdown: broadcast::Receiver<()>,
    addr: SocketAddr,
) -> Result<()> {
    let app = build_reconcile_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind metrics server on :9090")?;

    info!(addr = %addr, "reconcile_metrics_server_started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}

async fn reconcile_ready_handler(state: Arc<Mutex<ReconcileState>>) -> impl IntoResponse {
    let state = state.lock().await;
    if state.ready {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn reconcile_metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => match String::from_utf8(buffer) {
            Ok(body) => (StatusCode::OK, body),
            Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding error".to_string()),
        },
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding error".to_string()),
    }
}

/* ============================= TESTS ============================= */
