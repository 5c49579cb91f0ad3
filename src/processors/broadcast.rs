use crate::core::hub::FanoutHub;
use crate::processors::Processor;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{Duration, Interval, MissedTickBehavior};

/// Pushes a freshly computed snapshot to every hub subscriber at a fixed
/// cadence. Releases all subscribers when the stage stops.
pub struct SnapshotBroadcaster<F> {
    hub: Arc<FanoutHub<String>>,
    period: Duration,
    ticker: Option<Interval>,
    snapshot: F,
}

impl<F> SnapshotBroadcaster<F>
where
    F: Fn() -> String + Send + Sync,
{
    pub fn new(hub: Arc<FanoutHub<String>>, period: Duration, snapshot: F) -> Self {
        Self {
            hub,
            period,
            ticker: None,
            snapshot,
        }
    }
}

#[async_trait]
impl<F> Processor for SnapshotBroadcaster<F>
where
    F: Fn() -> String + Send + Sync,
{
    async fn init(&mut self) -> anyhow::Result<()> {
        tracing::info!("Snapshot broadcaster initialised (period: {:?})", self.period);
        Ok(())
    }

    async fn process(&mut self) -> anyhow::Result<()> {
        let period = self.period;
        self.ticker
            .get_or_insert_with(|| {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker
            })
            .tick()
            .await;

        if self.hub.is_empty() {
            return Ok(());
        }

        let report = self.hub.broadcast((self.snapshot)());
        tracing::trace!(
            "Snapshot delivered to {} subscriber(s), {} lagging, {} pruned",
            report.delivered,
            report.lagged,
            report.pruned
        );
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.hub.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_every_period() {
        let hub = Arc::new(FanoutHub::new(16));
        let mut sub = hub.subscribe();
        let counter = Arc::new(AtomicUsize::new(0));
        let source = counter.clone();

        let mut broadcaster = SnapshotBroadcaster::new(hub.clone(), Duration::from_secs(1), move || {
            format!("{{\"n\":{}}}", source.fetch_add(1, Ordering::SeqCst))
        });
        broadcaster.init().await.unwrap();

        let started = tokio::time::Instant::now();
        for _ in 0..3 {
            broadcaster.process().await.unwrap();
        }
        assert_eq!(started.elapsed(), Duration::from_secs(2));

        assert_eq!(sub.try_recv().as_deref(), Some("{\"n\":0}"));
        assert_eq!(sub.try_recv().as_deref(), Some("{\"n\":1}"));
        assert_eq!(sub.try_recv().as_deref(), Some("{\"n\":2}"));

        broadcaster.shutdown().await;
        assert!(hub.is_empty());
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_snapshot_without_subscribers() {
        let hub = Arc::new(FanoutHub::new(4));
        let counter = Arc::new(AtomicUsize::new(0));
        let source = counter.clone();
        let mut broadcaster = SnapshotBroadcaster::new(hub, Duration::from_millis(10), move || {
            source.fetch_add(1, Ordering::SeqCst);
            String::new()
        });

        broadcaster.process().await.unwrap();
        broadcaster.process().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
