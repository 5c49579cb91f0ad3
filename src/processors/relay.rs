use crate::core::hub::FanoutHub;
use crate::core::time::now_secs_f64;
use crate::processors::Processor;
use crate::queue::{QueuePoll, QueueService};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// A viewer's pick, as submitted to the ingestion endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SpinSelection {
    pub category: String,
    pub url: String,
}

/// What goes on the queue: the selection plus its send time.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SpinMessage {
    pub category: String,
    pub url: String,
    pub sent_at: Option<f64>,
}

impl SpinMessage {
    pub fn stamped(selection: SpinSelection) -> Self {
        Self {
            category: selection.category,
            url: selection.url,
            sent_at: Some(now_secs_f64()),
        }
    }
}

/// What viewers receive: the message with receive time and end-to-end
/// latency in seconds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RelayedSpin {
    pub category: String,
    pub url: String,
    pub sent_at: Option<f64>,
    pub received_at: f64,
    pub latency: f64,
}

impl RelayedSpin {
    pub fn from_message(message: SpinMessage, received_at: f64) -> Self {
        let latency = received_at - message.sent_at.unwrap_or(received_at);
        Self {
            category: message.category,
            url: message.url,
            sent_at: message.sent_at,
            received_at,
            latency,
        }
    }
}

/// Polls the spin queue and forwards every decoded selection to all
/// connected viewers. Payloads that are not spin messages are skipped.
pub struct SpinRelay {
    queue: String,
    wait: Duration,
    service: Arc<dyn QueueService>,
    hub: Arc<FanoutHub<String>>,
}

impl SpinRelay {
    pub fn new(
        queue: &str,
        wait: Duration,
        service: Arc<dyn QueueService>,
        hub: Arc<FanoutHub<String>>,
    ) -> Self {
        Self {
            queue: queue.to_string(),
            wait,
            service,
            hub,
        }
    }

    fn relay(&self, bytes: &[u8]) {
        let message: SpinMessage = match serde_json::from_slice(bytes) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Skipping malformed message on '{}': {}", self.queue, e);
                return;
            }
        };

        let relayed = RelayedSpin::from_message(message, now_secs_f64());
        match serde_json::to_string(&relayed) {
            Ok(payload) => {
                let report = self.hub.broadcast(payload);
                tracing::info!(
                    "Relayed '{}' to {} viewer(s) (latency: {:.3}s)",
                    relayed.category,
                    report.delivered,
                    relayed.latency
                );
            }
            Err(e) => tracing::error!("Failed to serialize relayed message: {}", e),
        }
    }
}

#[async_trait]
impl Processor for SpinRelay {
    async fn init(&mut self) -> anyhow::Result<()> {
        tracing::info!("Spin relay for '{}' initialised", self.queue);
        Ok(())
    }

    async fn process(&mut self) -> anyhow::Result<()> {
        match self.service.get(&self.queue, self.wait).await {
            QueuePoll::Delivered(bytes) => self.relay(&bytes),
            QueuePoll::Empty => {}
            QueuePoll::Failed(e) => {
                tracing::warn!("Poll on '{}' failed: {}", self.queue, e);
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.hub.close_all();
    }
}
