//! `loadtest-operator cleanup`: the Cleanup Agent sidecar. Serves
//! `POST /quitquitquit` inside a worker pod and exits 0 once called.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use tokio::sync::oneshot;
use tracing::info;

use loadtest_operator::cleanup::QUIT_PATH;

pub async fn run(port: u16) -> Result<()> {
    let (quit_tx, quit_rx) = oneshot::channel::<()>();
    let quit_tx = std::sync::Mutex::new(Some(quit_tx));
    let quit_tx = std::sync::Arc::new(quit_tx);

    let app = Router::new().route(
        QUIT_PATH,
        post(move || {
            let quit_tx = quit_tx.clone();
            async move {
                if let Some(sender) = quit_tx.lock().unwrap().take() {
                    let _ = sender.send(());
                }
                StatusCode::OK
            }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("cleanup agent: failed to bind quit endpoint")?;

    info!(addr = %addr, "cleanup_agent_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = quit_rx.await;
        })
        .await?;

    info!("cleanup_agent_quit_received");
    Ok(())
}
