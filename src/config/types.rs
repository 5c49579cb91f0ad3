//! Configuration Type Definitions
//!
//! Core configuration structures for mqrelay. These types are deserialised
//! from a TOML file and used by the composition root to connect to the queue
//! service and to start producers, stream readers and the web surfaces.
//!
//! Every section carries defaults, so an empty file (or no file at all) still
//! describes a working local setup on the in-memory backend.

use serde::Deserialize;
use std::collections::HashMap;

use crate::processors::use_case::UseCase;

/// Queue service backend.
#[derive(Clone, Debug, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// In-process broker. Puts on a source queue are mirrored to the stream
    /// queues listed in `streams`, emulating streaming queue duplication.
    #[default]
    Memory,

    /// MQTT broker bridge. Queue names are used as topic names.
    Mqtt,
}

/// Connection settings for the queue service.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueServiceConfig {
    /// The backend to connect to
    #[serde(rename = "type")]
    pub r#type: BackendType,

    pub host: String,
    pub port: u16,

    /// Queue manager name, also used as the client identifier prefix
    pub manager: String,

    /// Server connection channel name
    pub channel: String,

    pub user: Option<String>,
    pub password: Option<String>,

    /// Delivery QoS for the MQTT bridge (0, 1 or 2)
    pub qos: u8,

    /// Source queue -> stream queue duplication (memory backend only)
    pub streams: HashMap<String, String>,
}

impl Default for QueueServiceConfig {
    fn default() -> Self {
        Self {
            r#type: BackendType::default(),
            host: "127.0.0.1".to_string(),
            port: 1414,
            manager: "QM1".to_string(),
            channel: "DEV.APP.SVRCONN".to_string(),
            user: Some("app".to_string()),
            password: Some("passw0rd".to_string()),
            qos: 1,
            streams: default_streams(),
        }
    }
}

fn default_streams() -> HashMap<String, String> {
    UseCase::all()
        .iter()
        .map(|uc| (uc.source_queue().to_string(), uc.stream_queue().to_string()))
        .collect()
}

/// Producer settings.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProducerConfig {
    /// Approximate messages per second
    pub rate: f64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self { rate: 5.0 }
    }
}

/// Dashboard settings: which stream queues to read and how to publish them.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct DashboardConfig {
    /// Socket address the HTTP server binds to
    pub bind: String,

    /// Stream queues to consume, one reader each
    pub streams: Vec<String>,

    /// Number of decoded payloads each reader retains
    pub ring_size: usize,

    /// Bounded wait for each poll, in milliseconds
    pub wait_ms: u64,

    /// Cadence of the snapshot broadcast, in milliseconds
    pub snapshot_interval_ms: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            streams: UseCase::all()
                .iter()
                .map(|uc| uc.stream_queue().to_string())
                .collect(),
            ring_size: 50,
            wait_ms: 500,
            snapshot_interval_ms: 1000,
        }
    }
}

/// Spin demo settings: one queue used both for ingestion and relay.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpinConfig {
    pub bind: String,
    pub queue: String,
    pub wait_ms: u64,
}

impl Default for SpinConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8001".to_string(),
            queue: "VIDEO.STREAM".to_string(),
            wait_ms: 5000,
        }
    }
}

/// Root configuration.
///
/// # Example Structure
///
/// ```toml
/// [queue_service]
/// type = "mqtt"
/// host = "broker.local"
/// port = 1883
///
/// [producer]
/// rate = 20.0
///
/// [dashboard]
/// streams = ["AUDIT.TXN"]
/// ```
#[derive(Clone, Debug, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub queue_service: QueueServiceConfig,
    pub producer: ProducerConfig,
    pub dashboard: DashboardConfig,
    pub spin: SpinConfig,
}
