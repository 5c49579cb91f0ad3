pub mod dashboard;
pub mod spin;

use crate::core::stage::ControlMessage;

use anyhow::Context;
use axum::Router;
use tokio::sync::broadcast;

/// Serves `router` on `bind` until a control message arrives.
pub async fn serve(
    bind: &str,
    router: Router,
    mut shutdown: broadcast::Receiver<ControlMessage>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!("HTTP server listening on {}", bind);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down");
        })
        .await
        .context("HTTP server failed")
}
