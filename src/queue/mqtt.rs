use super::{QueueError, QueuePoll, QueueService};
use crate::config::QueueServiceConfig;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_DELAY: Duration = Duration::from_millis(1000);

type Inboxes = Arc<Mutex<HashMap<String, flume::Receiver<Vec<u8>>>>>;
type Routes = Arc<Mutex<HashMap<String, flume::Sender<Vec<u8>>>>>;

/// Queue service bridged onto an MQTT broker, one topic per queue name.
///
/// A queue is subscribed on its first `get`; publishes that reach the broker
/// before that subscription are not seen by this client unless the broker
/// keeps a persistent session for it. Subscriptions are renewed on every
/// reconnect.
pub struct MqttQueueService {
    client: AsyncClient,
    qos: QoS,
    inboxes: Inboxes,
    routes: Routes,
    connected: Arc<AtomicBool>,
    event_loop: JoinHandle<()>,
}

/// Convert u8 QoS to rumqttc QoS enum
fn qos(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

/// Create MqttOptions from the connection settings
fn mqtt_options(config: &QueueServiceConfig) -> MqttOptions {
    let client_id = format!("{}_{}", config.manager, uuid::Uuid::new_v4());

    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    options.set_clean_session(true);
    options.set_keep_alive(Duration::from_secs(30));

    if let (Some(user), Some(password)) = (&config.user, &config.password) {
        options.set_credentials(user, password);
    }

    options
}

impl MqttQueueService {
    /// Connects and waits for the broker to acknowledge the session.
    pub async fn connect(config: &QueueServiceConfig) -> Result<Self, QueueError> {
        let (client, mut eventloop) = AsyncClient::new(mqtt_options(config), 64);

        let connected = tokio::time::timeout(CONNECT_TIMEOUT, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                    Ok(_) => {}
                    Err(e) => return Err(QueueError::Connect(e.to_string())),
                }
            }
        })
        .await
        .map_err(|_| {
            QueueError::Connect(format!(
                "no answer from {}:{} within {:?}",
                config.host, config.port, CONNECT_TIMEOUT
            ))
        })?;
        connected?;

        tracing::info!(
            "Connected to MQTT broker {}:{} (manager: {}, channel: {})",
            config.host,
            config.port,
            config.manager,
            config.channel
        );

        let qos = qos(config.qos);
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let event_loop = tokio::spawn(drive_event_loop(
            eventloop,
            client.clone(),
            qos,
            routes.clone(),
            connected.clone(),
        ));

        Ok(Self {
            client,
            qos,
            inboxes: Arc::new(Mutex::new(HashMap::new())),
            routes,
            connected,
            event_loop,
        })
    }

    /// Returns the inbox for `queue`, subscribing to its topic the first time.
    async fn inbox(&self, queue: &str) -> Result<flume::Receiver<Vec<u8>>, QueueError> {
        let existing = self
            .inboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(queue)
            .cloned();
        if let Some(receiver) = existing {
            return Ok(receiver);
        }

        let (sender, receiver) = flume::unbounded();
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(queue.to_string(), sender);

        if let Err(e) = self.client.subscribe(queue, self.qos).await {
            self.routes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(queue);
            return Err(QueueError::Get {
                queue: queue.to_string(),
                reason: format!("subscribe failed: {e}"),
            });
        }

        tracing::info!("Subscribed to MQTT topic: {} (QoS: {:?})", queue, self.qos);
        self.inboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(queue.to_string(), receiver.clone());
        Ok(receiver)
    }
}

impl Drop for MqttQueueService {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}

/// Topics this client has routed so far, sorted.
fn routed_topics(routes: &Routes) -> Vec<String> {
    let mut topics: Vec<String> = routes
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .keys()
        .cloned()
        .collect();
    topics.sort();
    topics
}

/// Queues a subscribe request for every routed topic and returns how many
/// were accepted. Sessions are clean, so the broker has forgotten them after
/// a reconnect. `try_subscribe` is used because this runs on the event loop
/// task, which is the one draining the request channel.
fn resubscribe(client: &AsyncClient, qos: QoS, routes: &Routes) -> usize {
    let mut accepted = 0;
    for topic in routed_topics(routes) {
        match client.try_subscribe(topic.as_str(), qos) {
            Ok(()) => accepted += 1,
            Err(e) => tracing::error!("Failed to resubscribe to {}: {}", topic, e),
        }
    }
    accepted
}

async fn drive_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    qos: QoS,
    routes: Routes,
    connected: Arc<AtomicBool>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let route = routes
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&publish.topic)
                    .cloned();
                match route {
                    Some(sender) => {
                        let _ = sender.send(publish.payload.to_vec());
                    }
                    None => tracing::debug!("Dropping message for unrouted topic {}", publish.topic),
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                // Resubscribe before reporting the connection usable.
                let topics = resubscribe(&client, qos, &routes);
                if !connected.swap(true, Ordering::SeqCst) {
                    tracing::info!("MQTT connection re-established, resubscribed {} topic(s)", topics);
                }
            }
            Ok(_) => {}
            Err(e) => {
                if connected.swap(false, Ordering::SeqCst) {
                    tracing::error!("MQTT connection error: {}", e);
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[async_trait]
impl QueueService for MqttQueueService {
    async fn put(&self, queue: &str, payload: Vec<u8>) -> Result<(), QueueError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(QueueError::Disconnected);
        }

        self.client
            .publish(queue, self.qos, false, payload)
            .await
            .map_err(|e| QueueError::Put {
                queue: queue.to_string(),
                reason: e.to_string(),
            })
    }

    async fn get(&self, queue: &str, wait: Duration) -> QueuePoll {
        if !self.connected.load(Ordering::SeqCst) {
            // Keep the bounded-wait contract so callers do not spin.
            tokio::time::sleep(wait.min(RECONNECT_DELAY)).await;
            return QueuePoll::Failed(QueueError::Disconnected);
        }

        let receiver = match self.inbox(queue).await {
            Ok(receiver) => receiver,
            Err(e) => return QueuePoll::Failed(e),
        };

        match tokio::time::timeout(wait, receiver.recv_async()).await {
            Ok(Ok(payload)) => QueuePoll::Delivered(payload),
            Ok(Err(e)) => QueuePoll::Failed(QueueError::Get {
                queue: queue.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => QueuePoll::Empty,
        }
    }
}
