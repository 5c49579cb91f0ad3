use crate::core::hub::FanoutHub;
use crate::processors::reader::{ReaderSet, Snapshot};

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use futures::{Stream, StreamExt, stream};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

const DASHBOARD_HTML: &str = include_str!("dashboard.html");

pub struct DashboardState {
    pub readers: Arc<ReaderSet>,
    pub hub: Arc<FanoutHub<String>>,
}

pub fn router(state: Arc<DashboardState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/metrics", get(metrics))
        .route("/sse", get(sse))
        .with_state(state)
}

async fn index() -> impl IntoResponse {
    Html(DASHBOARD_HTML)
}

/// Polling fallback; the same payload the SSE frames carry.
async fn metrics(State(state): State<Arc<DashboardState>>) -> Json<BTreeMap<String, Snapshot>> {
    Json(state.readers.snapshot())
}

/// One `data:` frame per snapshot broadcast, starting with the current one.
async fn sse(
    State(state): State<Arc<DashboardState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.hub.subscribe();
    tracing::info!("SSE client {} connected", subscription.id());

    let initial = state.readers.snapshot_json();
    let updates = stream::unfold(subscription, |mut subscription| async move {
        subscription
            .recv()
            .await
            .map(|payload| (payload, subscription))
    });

    let events = stream::once(async move { initial })
        .chain(updates)
        .map(|payload| Ok(Event::default().data(payload)));

    Sse::new(events).keep_alive(KeepAlive::default())
}
