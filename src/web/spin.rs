use crate::core::hub::FanoutHub;
use crate::processors::relay::{SpinMessage, SpinSelection};
use crate::queue::QueueService;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// A viewer that cannot take a frame within this long is disconnected.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SpinState {
    pub service: Arc<dyn QueueService>,
    pub queue: String,
    pub hub: Arc<FanoutHub<String>>,
}

pub fn router(state: Arc<SpinState>) -> Router {
    Router::new()
        .route("/spin", post(spin))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Puts the selection on the spin queue, stamped with its send time.
async fn spin(
    State(state): State<Arc<SpinState>>,
    Json(selection): Json<SpinSelection>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let message = SpinMessage::stamped(selection);
    let payload = serde_json::to_vec(&message).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "error": e.to_string() })),
        )
    })?;

    if let Err(e) = state.service.put(&state.queue, payload).await {
        tracing::error!("Failed to queue selection: {}", e);
        return Err((
            StatusCode::BAD_GATEWAY,
            Json(json!({ "status": "error", "error": e.to_string() })),
        ));
    }

    tracing::info!("Queued '{}' on {}", message.category, state.queue);
    Ok(Json(json!({ "status": "queued" })))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<SpinState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<SpinState>) {
    let mut subscription = state.hub.subscribe();
    let client_id = subscription.id();
    tracing::info!("Viewer {} connected", client_id);

    loop {
        tokio::select! {
            // Incoming frames only keep the connection open
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            payload = subscription.recv() => {
                let Some(payload) = payload else {
                    break; // hub closed
                };
                match tokio::time::timeout(SEND_TIMEOUT, socket.send(Message::Text(payload.into()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => break,
                    Err(_) => {
                        tracing::warn!("Viewer {} too slow, disconnecting", client_id);
                        break;
                    }
                }
            }
        }
    }

    state.hub.unsubscribe(client_id);
    tracing::info!("Viewer {} disconnected", client_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{MemoryQueueService, QueuePoll};
    use axum::body::Body;
    use crate::processors::relay::RelayedSpin;
    use axum::http::{Request, header};
    use futures::StreamExt;
    use std::net::SocketAddr;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tower::ServiceExt;

    async fn serve_spin(state: Arc<SpinState>) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(state)).await });
        addr
    }

    async fn wait_for_viewers(hub: &FanoutHub<String>, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while hub.len() != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("hub never reached {expected} viewer(s)"));
    }

    fn post_spin(body: &str) -> Request<Body> {
        Request::post("/spin")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_spin_puts_one_message() {
        let service = Arc::new(MemoryQueueService::new());
        let state = Arc::new(SpinState {
            service: service.clone(),
            queue: "VIDEO.STREAM".to_string(),
            hub: Arc::new(FanoutHub::new(4)),
        });

        let response = router(state)
            .oneshot(post_spin(r#"{"category":"music","url":"https://example.org/v/9"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, json!({"status": "queued"}));

        assert_eq!(service.depth("VIDEO.STREAM"), 1);
        match service.get("VIDEO.STREAM", Duration::from_millis(1)).await {
            QueuePoll::Delivered(bytes) => {
                let message: SpinMessage = serde_json::from_slice(&bytes).unwrap();
                assert_eq!(message.category, "music");
                assert_eq!(message.url, "https://example.org/v/9");
                assert!(message.sent_at.is_some());
            }
            other => panic!("expected a message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_spin_reports_queue_failure() {
        let service = Arc::new(MemoryQueueService::new());
        service.disconnect();
        let state = Arc::new(SpinState {
            service,
            queue: "VIDEO.STREAM".to_string(),
            hub: Arc::new(FanoutHub::new(4)),
        });

        let response = router(state)
            .oneshot(post_spin(r#"{"category":"music","url":"u"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_spin_rejects_incomplete_selection() {
        let state = Arc::new(SpinState {
            service: Arc::new(MemoryQueueService::new()),
            queue: "VIDEO.STREAM".to_string(),
            hub: Arc::new(FanoutHub::new(4)),
        });

        let response = router(state)
            .oneshot(post_spin(r#"{"category":"music"}"#))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_websocket_viewer_receives_relayed_spin() {
        let hub = Arc::new(FanoutHub::new(4));
        let addr = serve_spin(Arc::new(SpinState {
            service: Arc::new(MemoryQueueService::new()),
            queue: "VIDEO.STREAM".to_string(),
            hub: hub.clone(),
        }))
        .await;

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();
        wait_for_viewers(&hub, 1).await;

        let relayed = RelayedSpin::from_message(
            SpinMessage {
                category: "music".to_string(),
                url: "https://example.org/v/9".to_string(),
                sent_at: Some(10.0),
            },
            10.25,
        );
        let report = hub.broadcast(serde_json::to_string(&relayed).unwrap());
        assert_eq!(report.delivered, 1);

        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = frame.into_text().unwrap();
        let json: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["category"], json!("music"));
        assert_eq!(json["url"], json!("https://example.org/v/9"));
        assert_eq!(json["sent_at"], json!(10.0));
        assert_eq!(json["received_at"], json!(10.25));
        assert_eq!(json["latency"], json!(0.25));

        socket.close(None).await.unwrap();
        wait_for_viewers(&hub, 0).await;
    }

    #[tokio::test]
    async fn test_closing_hub_disconnects_viewers() {
        let hub = Arc::new(FanoutHub::new(4));
        let addr = serve_spin(Arc::new(SpinState {
            service: Arc::new(MemoryQueueService::new()),
            queue: "VIDEO.STREAM".to_string(),
            hub: hub.clone(),
        }))
        .await;

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();
        wait_for_viewers(&hub, 1).await;

        hub.close_all();
        assert!(hub.is_empty());

        let next = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap();
        assert!(matches!(
            next,
            None | Some(Err(_)) | Some(Ok(WsMessage::Close(_)))
        ));
    }
}
