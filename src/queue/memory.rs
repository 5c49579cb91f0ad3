use super::{QueueError, QueuePoll, QueueService};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

type Queue = (flume::Sender<Vec<u8>>, flume::Receiver<Vec<u8>>);

/// In-process queue service.
///
/// Queues are created on first use. A put on a source queue that has a
/// stream mapping is also delivered to the stream queue, so readers of the
/// stream see the same traffic as consumers of the source.
pub struct MemoryQueueService {
    queues: Mutex<HashMap<String, Queue>>,
    streams: HashMap<String, String>,
    connected: AtomicBool,
}

impl MemoryQueueService {
    pub fn new() -> Self {
        Self::with_streams(HashMap::new())
    }

    pub fn with_streams(streams: HashMap<String, String>) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            streams,
            connected: AtomicBool::new(true),
        }
    }

    fn queue(&self, name: &str) -> Queue {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues
            .entry(name.to_string())
            .or_insert_with(flume::unbounded)
            .clone()
    }

    /// Number of messages waiting on `name`.
    #[cfg(test)]
    pub fn depth(&self, name: &str) -> usize {
        self.queue(name).1.len()
    }

    /// Simulates losing the connection: every later call fails.
    #[cfg(test)]
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn enqueue(&self, queue: &str, payload: Vec<u8>) -> Result<(), QueueError> {
        let (sender, _) = self.queue(queue);
        sender.send(payload).map_err(|e| QueueError::Put {
            queue: queue.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Default for MemoryQueueService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueService for MemoryQueueService {
    async fn put(&self, queue: &str, payload: Vec<u8>) -> Result<(), QueueError> {
        if !self.is_connected() {
            return Err(QueueError::Disconnected);
        }

        if let Some(stream) = self.streams.get(queue) {
            self.enqueue(stream, payload.clone())?;
        }
        self.enqueue(queue, payload)
    }

    async fn get(&self, queue: &str, wait: Duration) -> QueuePoll {
        if !self.is_connected() {
            return QueuePoll::Failed(QueueError::Disconnected);
        }

        let (_, receiver) = self.queue(queue);
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
