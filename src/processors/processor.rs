use async_trait::async_trait;

/// This trait defines the interface for the work a stage performs. The stage
/// calls `init` once, then `process` repeatedly until it is terminated or
/// `process` returns an error, then `shutdown` once.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Initializes the processor.
    /// This method is guaranteed to be called before any processing occurs.
    async fn init(&mut self) -> anyhow::Result<()>;

    /// Performs one unit of work (one poll, one put, one tick).
    ///
    /// The future may be dropped at any await point when the stage is
    /// terminated, so state must be consistent between awaits.
    async fn process(&mut self) -> anyhow::Result<()>;

    /// Releases resources after the last `process` call.
    async fn shutdown(&mut self) {}
}
