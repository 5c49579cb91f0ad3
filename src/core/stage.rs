use crate::processors::processor::Processor;

use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Terminate,
}

/// A named long-running task driving one processor until it fails or a
/// `Terminate` control message arrives.
pub struct Stage {
    name: String,
    processor: Box<dyn Processor>,
    control_channel: Option<broadcast::Receiver<ControlMessage>>,
}

impl Stage {
    pub fn new(name: impl Into<String>, processor: Box<dyn Processor>) -> Self {
        Self {
            name: name.into(),
            processor,
            control_channel: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attach_control_channel(&mut self, control_channel: broadcast::Receiver<ControlMessage>) {
        self.control_channel = Some(control_channel);
        tracing::debug!("Stage [{}] control channel attached", self.name);
    }

    pub async fn init(&mut self) -> anyhow::Result<()> {
        self.processor.init().await
    }

    /// Runs the processor until terminated. An in-flight `process` call is
    /// dropped when the terminate signal wins the race.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        tracing::info!("Stage [{}] is running", self.name);

        let Self {
            name,
            processor,
            control_channel,
        } = self;

        let result = loop {
            tokio::select! {
                biased;

                // Handle control messages
                Some(message) = async {
                    match control_channel.as_mut() {
                        Some(rx) => rx.recv().await.ok(),
                        None => None,
                    }
                } => {
                    match message {
                        ControlMessage::Terminate => {
                            tracing::info!("Stage [{}] received terminate signal", name);
                            break Ok(());
                        }
                    }
                }

                // Process messages
                result = processor.process() => {
                    if let Err(e) = result {
                        tracing::error!("Error in processor for stage [{}]: {:#}", name, e);
                        break Err(e);
                    }
                }
            }
        };

        processor.shutdown().await;
        result
    }
}
