//! Stream reader: drains one stream queue into rolling statistics.
//!
//! Each reader owns its statistics and is the only writer; any number of
//! [`ReaderHandle`]s read them through `stats()`. Undecodable payloads are
//! kept as a hex preview so a bad message never stops the reader.

use crate::config::DashboardConfig;
use crate::core::time::now_millis;
use crate::processors::Processor;
use crate::queue::{QueuePoll, QueueService};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Window the reported rate is computed over.
pub const RATE_WINDOW_MS: u64 = 10_000;
/// Arrival timestamps older than this are discarded.
pub const HISTORY_WINDOW_MS: u64 = 30_000;
/// Number of recent payloads included in a snapshot.
pub const DISPLAY_RECENT: usize = 10;
/// Bytes of an undecodable payload kept in its placeholder.
pub const RAW_PREVIEW_BYTES: usize = 128;

const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Per-queue aggregate exposed to dashboards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub total: u64,
    pub rate: f64,
    pub recent: Vec<Value>,
}

/// Coarse lifecycle of a reader. Whether a poll delivered, came back empty
/// or failed is handled inside `process` and not kept as state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Idle,
    Polling,
    Stopped,
}

/// Decodes a payload as JSON, or substitutes `{"raw": "<hex>"}` built from
/// its first bytes.
pub fn decode_payload(bytes: &[u8]) -> Value {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!("Payload is not JSON ({}), keeping raw preview", e);
            let preview = &bytes[..bytes.len().min(RAW_PREVIEW_BYTES)];
            json!({ "raw": hex::encode(preview) })
        }
    }
}

#[derive(Debug)]
struct StreamStats {
    total: u64,
    timestamps: VecDeque<u64>,
    recent: VecDeque<Value>,
    ring_size: usize,
    state: ReaderState,
}

impl StreamStats {
    fn new(ring_size: usize) -> Self {
        Self {
            total: 0,
            timestamps: VecDeque::new(),
            recent: VecDeque::with_capacity(ring_size),
            ring_size: ring_size.max(1),
            state: ReaderState::Idle,
        }
    }

    fn record(&mut self, payload: Value, now: u64) {
        self.total += 1;
        self.timestamps.push_back(now);

        self.recent.push_back(payload);
        while self.recent.len() > self.ring_size {
            self.recent.pop_front();
        }

        let cutoff = now.saturating_sub(HISTORY_WINDOW_MS);
        while self.timestamps.front().is_some_and(|&t| t < cutoff) {
            self.timestamps.pop_front();
        }
    }

    fn snapshot(&self, now: u64) -> Snapshot {
        let cutoff = now.saturating_sub(RATE_WINDOW_MS);
        let in_window = self.timestamps.iter().filter(|&&t| t >= cutoff).count();
        let skip = self.recent.len().saturating_sub(DISPLAY_RECENT);

        Snapshot {
            total: self.total,
            rate: in_window as f64 / (RATE_WINDOW_MS as f64 / 1000.0),
            recent: self.recent.iter().skip(skip).cloned().collect(),
        }
    }
}

/// Read-only view of a reader's statistics.
#[derive(Debug, Clone)]
pub struct ReaderHandle {
    queue: String,
    stats: Arc<Mutex<StreamStats>>,
}

impl ReaderHandle {
    fn lock(&self) -> MutexGuard<'_, StreamStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn state(&self) -> ReaderState {
        self.lock().state
    }

    pub fn stats(&self) -> Snapshot {
        self.stats_at(now_millis())
    }

    pub fn stats_at(&self, now: u64) -> Snapshot {
        self.lock().snapshot(now)
    }

    /// Every payload still held in the ring, oldest first.
    #[cfg(test)]
    pub fn recent(&self) -> Vec<Value> {
        self.lock().recent.iter().cloned().collect()
    }
}

pub struct StreamReader {
    handle: ReaderHandle,
    service: Arc<dyn QueueService>,
    wait: Duration,
}

impl StreamReader {
    pub fn new(queue: &str, service: Arc<dyn QueueService>, ring_size: usize, wait: Duration) -> Self {
        Self {
            handle: ReaderHandle {
                queue: queue.to_string(),
                stats: Arc::new(Mutex::new(StreamStats::new(ring_size))),
            },
            service,
            wait,
        }
    }

    pub fn from_config(queue: &str, service: Arc<dyn QueueService>, config: &DashboardConfig) -> Self {
        Self::new(
            queue,
            service,
            config.ring_size,
            Duration::from_millis(config.wait_ms),
        )
    }

    pub fn handle(&self) -> ReaderHandle {
        self.handle.clone()
    }

    fn set_state(&self, state: ReaderState) {
        self.handle.lock().state = state;
    }

    /// Records one delivered payload at `now`.
    pub fn record_at(&self, bytes: &[u8], now: u64) {
        let payload = decode_payload(bytes);
        self.handle.lock().record(payload, now);
    }
}

#[async_trait]
impl Processor for StreamReader {
    async fn init(&mut self) -> anyhow::Result<()> {
        self.set_state(ReaderState::Polling);
        tracing::info!(
            "Stream reader for '{}' initialised (wait: {:?})",
            self.handle.queue,
            self.wait
        );
        Ok(())
    }

    async fn process(&mut self) -> anyhow::Result<()> {
        match self.service.get(&self.handle.queue, self.wait).await {
            QueuePoll::Delivered(bytes) => {
                self.record_at(&bytes, now_millis());
                tracing::debug!("Received {} bytes from {}", bytes.len(), self.handle.queue);
            }
            QueuePoll::Empty => {}
            QueuePoll::Failed(e) => {
                tracing::warn!("Poll on '{}' failed: {}", self.handle.queue, e);
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.set_state(ReaderState::Stopped);
        tracing::info!("Stream reader for '{}' stopped", self.handle.queue);
    }
}

/// Replaces `.` with `_` so queue names can be used as JSON/JS keys.
pub fn queue_key(queue: &str) -> String {
    queue.replace('.', "_")
}

/// The readers behind one dashboard, keyed by stream queue.
#[derive(Debug, Default)]
pub struct ReaderSet {
    streams: Vec<String>,
    handles: HashMap<String, ReaderHandle>,
}

impl ReaderSet {
    pub fn new(streams: Vec<String>) -> Self {
        Self {
            streams,
            handles: HashMap::new(),
        }
    }

    pub fn insert(&mut self, handle: ReaderHandle) {
        self.handles.insert(handle.queue().to_string(), handle);
    }

    /// Combined snapshot across all configured streams. A stream without a
    /// running reader reports zeros.
    pub fn snapshot(&self) -> BTreeMap<String, Snapshot> {
        let now = now_millis();
        self.streams
            .iter()
            .map(|queue| {
                let snapshot = self
                    .handles
                    .get(queue)
                    .map(|handle| handle.stats_at(now))
                    .unwrap_or_default();
                (queue_key(queue), snapshot)
            })
            .collect()
    }

    pub fn snapshot_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|e| {
            tracing::error!("Failed to serialize snapshot: {}", e);
            "{}".to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{MemoryQueueService, QueueError};
    use std::sync::Mutex as StdMutex;

    /// Replays a fixed sequence of poll results, then reports empty.
    struct ScriptedQueue {
        script: StdMutex<VecDeque<QueuePoll>>,
        gets: StdMutex<usize>,
    }

    impl ScriptedQueue {
        fn new(script: Vec<QueuePoll>) -> Self {
            Self {
                script: StdMutex::new(script.into()),
                gets: StdMutex::new(0),
            }
        }

        fn push(&self, poll: QueuePoll) {
            self.script.lock().unwrap().push_back(poll);
        }

        fn gets(&self) -> usize {
            *self.gets.lock().unwrap()
        }
    }

    #[async_trait]
    impl QueueService for ScriptedQueue {
        async fn put(&self, _queue: &str, _payload: Vec<u8>) -> Result<(), QueueError> {
            Ok(())
        }

        async fn get(&self, _queue: &str, _wait: Duration) -> QueuePoll {
            *self.gets.lock().unwrap() += 1;
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or(QueuePoll::Empty)
        }
    }

    fn reader_on(service: Arc<ScriptedQueue>, ring_size: usize) -> StreamReader {
        StreamReader::new("AUDIT.TXN", service, ring_size, Duration::from_millis(500))
    }

    #[test]
    fn test_total_and_ring_follow_arrivals() {
        let service = Arc::new(ScriptedQueue::new(vec![]));
        let ring_size = 5;

        for n in [0usize, 1, 4, 5, 6, 23] {
            let reader = reader_on(service.clone(), ring_size);
            for i in 0..n {
                reader.record_at(format!("{{\"seq\":{i}}}").as_bytes(), 1_000 + i as u64);
            }

            let handle = reader.handle();
            assert_eq!(handle.stats_at(1_000 + n as u64).total, n as u64);

            let recent = handle.recent();
            assert_eq!(recent.len(), n.min(ring_size));
            let first = n.saturating_sub(ring_size);
            let expected: Vec<Value> = (first..n).map(|i| json!({ "seq": i })).collect();
            assert_eq!(recent, expected);
        }
    }

    #[test]
    fn test_snapshot_shows_last_ten() {
        let service = Arc::new(ScriptedQueue::new(vec![]));
        let reader = reader_on(service, 50);
        for i in 0..30u64 {
            reader.record_at(format!("{i}").as_bytes(), 5_000 + i);
        }

        let snapshot = reader.handle().stats_at(5_030);
        assert_eq!(snapshot.recent.len(), DISPLAY_RECENT);
        assert_eq!(snapshot.recent.first(), Some(&json!(20)));
        assert_eq!(snapshot.recent.last(), Some(&json!(29)));
    }

    #[test]
    fn test_rate_counts_trailing_window() {
        let mut stats = StreamStats::new(10);
        let now = 100_000;
        let k = 37u64;
        for i in 0..k {
            // Spread over [now - 10s, now]
            stats.record(json!(i), now - RATE_WINDOW_MS + i * (RATE_WINDOW_MS / (k - 1)));
        }
        assert_eq!(stats.snapshot(now).rate, k as f64 / 10.0);

        // Arrivals older than the window are excluded from the rate
        let mut stats = StreamStats::new(10);
        stats.record(json!(0), now - 20_000);
        stats.record(json!(1), now - 5_000);
        assert_eq!(stats.snapshot(now).rate, 0.1);
        assert_eq!(stats.snapshot(now).total, 2);
    }

    #[test]
    fn test_history_is_pruned() {
        let mut stats = StreamStats::new(10);
        stats.record(json!(0), 1_000);
        stats.record(json!(1), 2_000);
        stats.record(json!(2), 1_000 + HISTORY_WINDOW_MS + 500);

        assert_eq!(stats.timestamps.len(), 2);
        assert_eq!(stats.total, 3);
    }

    #[test]
    fn test_undecodable_payload_becomes_placeholder() {
        let service = Arc::new(ScriptedQueue::new(vec![]));
        let reader = reader_on(service, 10);

        let garbage: Vec<u8> = (0..=255u8).rev().collect();
        reader.record_at(&garbage, 1_000);

        let recent = reader.handle().recent();
        assert_eq!(recent.len(), 1);
        let raw = recent[0]["raw"].as_str().unwrap();
        assert_eq!(raw.len(), RAW_PREVIEW_BYTES * 2);
        assert!(raw.starts_with("fffefd"));
    }

    #[test]
    fn test_decode_payload() {
        assert_eq!(decode_payload(br#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(decode_payload(b"\x01\x02"), json!({"raw": "0102"}));
        assert_eq!(decode_payload(b""), json!({"raw": ""}));
    }

    #[test]
    fn test_stats_is_idempotent() {
        let service = Arc::new(ScriptedQueue::new(vec![]));
        let reader = reader_on(service, 10);
        reader.record_at(b"{\"n\":1}", 1_000);
        reader.record_at(b"{\"n\":2}", 2_000);

        let handle = reader.handle();
        let first = handle.stats_at(3_000);
        let second = handle.stats_at(3_000);
        assert_eq!(first, second);

        // Only the rate moves when the window boundary passes arrivals.
        let later = handle.stats_at(11_500);
        assert_eq!(later.total, first.total);
        assert_eq!(later.recent, first.recent);
        assert_eq!(later.rate, 0.1);
    }

    #[tokio::test]
    async fn test_errors_do_not_stop_the_reader() {
        let service = Arc::new(ScriptedQueue::new(vec![
            QueuePoll::Failed(QueueError::Disconnected),
            QueuePoll::Delivered(b"{\"ok\":true}".to_vec()),
        ]));
        let mut reader = reader_on(service.clone(), 10);
        reader.init().await.unwrap();

        reader.process().await.unwrap();
        reader.process().await.unwrap();

        let snapshot = reader.handle().stats();
        assert_eq!(snapshot.total, 1);
        assert_eq!(snapshot.recent, vec![json!({"ok": true})]);
        assert_eq!(service.gets(), 2);
    }

    #[tokio::test]
    async fn test_empty_queue_then_one_transaction() {
        let service = Arc::new(ScriptedQueue::new(vec![
            QueuePoll::Empty,
            QueuePoll::Empty,
            QueuePoll::Empty,
        ]));
        let mut reader = reader_on(service.clone(), 50);
        let handle = reader.handle();
        assert_eq!(handle.state(), ReaderState::Idle);

        reader.init().await.unwrap();
        assert_eq!(handle.state(), ReaderState::Polling);
        for _ in 0..3 {
            reader.process().await.unwrap();
        }
        assert_eq!(handle.stats(), Snapshot { total: 0, rate: 0.0, recent: vec![] });

        let txn = json!({
            "type": "txn",
            "txn_id": "ABC12345",
            "amount": 10.5,
            "ts": "2024-01-01T00:00:00Z"
        });
        service.push(QueuePoll::Delivered(serde_json::to_vec(&txn).unwrap()));
        reader.process().await.unwrap();

        let snapshot = handle.stats();
        assert_eq!(snapshot.total, 1);
        assert_eq!(snapshot.recent, vec![txn]);

        reader.shutdown().await;
        assert_eq!(handle.state(), ReaderState::Stopped);
    }

    #[tokio::test]
    async fn test_reader_stage_on_memory_queue() {
        use crate::core::stage::{ControlMessage, Stage};

        let service = Arc::new(MemoryQueueService::new());
        let reader = StreamReader::new("PROMO.FEED", service.clone(), 50, Duration::from_millis(20));
        let handle = reader.handle();

        let (tx, rx) = tokio::sync::broadcast::channel(1);
        let mut stage = Stage::new("reader", Box::new(reader));
        stage.attach_control_channel(rx);
        stage.init().await.unwrap();
        let task = tokio::spawn(async move { stage.run().await });

        for i in 0..3 {
            service.put("PROMO.FEED", format!("{i}").into_bytes()).await.unwrap();
        }

        for _ in 0..100 {
            if handle.stats().total == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handle.stats().recent, vec![json!(0), json!(1), json!(2)]);

        tx.send(ControlMessage::Terminate).unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(handle.state(), ReaderState::Stopped);
    }

    #[test]
    fn test_reader_set_fills_missing_streams_with_zeros() {
        let service = Arc::new(ScriptedQueue::new(vec![]));
        let reader = reader_on(service, 10);
        reader.record_at(b"{}", now_millis());

        let mut set = ReaderSet::new(vec!["AUDIT.TXN".to_string(), "PROMO.FEED".to_string()]);
        set.insert(reader.handle());

        let snapshot = set.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["AUDIT_TXN"].total, 1);
        assert_eq!(snapshot["PROMO_FEED"], Snapshot::default());

        let json: Value = serde_json::from_str(&set.snapshot_json()).unwrap();
        assert_eq!(json["PROMO_FEED"], json!({"total": 0, "rate": 0.0, "recent": []}));
    }
}
