use crate::core::message::MessageKind;
use crate::core::stage::Stage;
use crate::processors::Processor;
use crate::processors::simulated;
use crate::processors::use_case::UseCase;
use crate::queue::QueueService;

use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{Duration, Interval, MissedTickBehavior};

/// Rates at or below zero (and NaN) are raised to this.
pub const MIN_RATE: f64 = 0.01;
pub const MAX_RATE: f64 = 10_000.0;

/// Period between puts for an approximate rate in messages per second.
pub fn interval_for_rate(rate: f64) -> Duration {
    let rate = if rate.is_nan() { MIN_RATE } else { rate.clamp(MIN_RATE, MAX_RATE) };
    Duration::from_secs_f64(1.0 / rate)
}

/// Puts one generated message per tick on a source queue.
///
/// Ticks are spaced on a fixed schedule, so time spent inside `put` is taken
/// out of the wait rather than added to it. A failed `put` ends the stage.
pub struct ProducerProcessor {
    name: String,
    queue: String,
    kind: MessageKind,
    period: Duration,
    ticker: Option<Interval>,
    service: Arc<dyn QueueService>,
    sent: u64,
}

impl ProducerProcessor {
    pub fn new(
        name: &str,
        queue: &str,
        kind: MessageKind,
        rate: f64,
        service: Arc<dyn QueueService>,
    ) -> Self {
        Self {
            name: name.to_string(),
            queue: queue.to_string(),
            kind,
            period: interval_for_rate(rate),
            ticker: None,
            service,
            sent: 0,
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

/// Stage producing the use case's messages onto its source queue.
pub fn create_producer(use_case: UseCase, rate: f64, service: Arc<dyn QueueService>) -> Stage {
    let name = format!("producer:{}", use_case.name());
    let processor = ProducerProcessor::new(
        &name,
        use_case.source_queue(),
        use_case.kind(),
        rate,
        service,
    );
    Stage::new(name, Box::new(processor))
}

#[async_trait]
impl Processor for ProducerProcessor {
    async fn init(&mut self) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);

        tracing::info!(
            "Producer '{}' initialised (queue: {}, kind: {:?}, period: {:?})",
            self.name,
            self.queue,
            self.kind,
            self.period
        );
        Ok(())
    }

    async fn process(&mut self) -> anyhow::Result<()> {
        let period = self.period;
        self.ticker
            .get_or_insert_with(|| tokio::time::interval(period))
            .tick()
            .await;

        let message = simulated::generate(self.kind);
        let payload = message.to_bytes().context("failed to serialize message")?;
        let preview = String::from_utf8_lossy(&payload).into_owned();

        self.service
            .put(&self.queue, payload)
            .await
            .with_context(|| format!("producer '{}' could not put to '{}'", self.name, self.queue))?;

        self.sent += 1;
        tracing::info!("Put -> {}: {}", self.queue, preview);
        Ok(())
    }

    async fn shutdown(&mut self) {
        tracing::info!("Producer '{}' stopped after {} message(s)", self.name, self.sent());
    }
}
