//! Queue service boundary.
//!
//! The queue service is an external collaborator offering point-to-point
//! `put` and bounded-wait `get`. A bounded wait that expires without a
//! message is reported as [`QueuePoll::Empty`], never as an error, so callers
//! branch on it instead of inspecting error codes.

pub mod memory;
pub mod mqtt;

use crate::config::{BackendType, QueueServiceConfig};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use memory::MemoryQueueService;
pub use mqtt::MqttQueueService;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to connect to queue service: {0}")]
    Connect(String),

    #[error("connection to queue service lost")]
    Disconnected,

    #[error("put to '{queue}' failed: {reason}")]
    Put { queue: String, reason: String },

    #[error("get from '{queue}' failed: {reason}")]
    Get { queue: String, reason: String },
}

/// Result of a bounded-wait `get`.
#[derive(Debug)]
pub enum QueuePoll {
    Delivered(Vec<u8>),
    Empty,
    Failed(QueueError),
}

#[async_trait]
pub trait QueueService: Send + Sync {
    async fn put(&self, queue: &str, payload: Vec<u8>) -> Result<(), QueueError>;

    /// Waits up to `wait` for the next message on `queue`.
    async fn get(&self, queue: &str, wait: Duration) -> QueuePoll;
}

/// Connects to the configured backend.
pub async fn connect(config: &QueueServiceConfig) -> anyhow::Result<Arc<dyn QueueService>> {
    let service: Arc<dyn QueueService> = match config.r#type {
        BackendType::Memory => {
            tracing::info!(
                "Using in-memory queue service with {} stream mapping(s)",
                config.streams.len()
            );
            Arc::new(MemoryQueueService::with_streams(config.streams.clone()))
        }
        BackendType::Mqtt => Arc::new(MqttQueueService::connect(config).await?),
    };

    Ok(service)
}
