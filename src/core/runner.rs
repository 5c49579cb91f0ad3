use super::stage::{ControlMessage, Stage};

use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Owns the running stages of one program and the control channel that
/// terminates them.
pub struct StageRunner {
    control: broadcast::Sender<ControlMessage>,
    tasks: JoinSet<(String, anyhow::Result<()>)>,
}

impl StageRunner {
    pub fn new() -> Self {
        let (control, _) = broadcast::channel(16);
        Self {
            control,
            tasks: JoinSet::new(),
        }
    }

    /// A sender on the control channel, for shutdown hooks outside the runner.
    pub fn control(&self) -> broadcast::Sender<ControlMessage> {
        self.control.clone()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Initialises and runs the stage on its own task.
    pub fn spawn(&mut self, mut stage: Stage) {
        stage.attach_control_channel(self.control.subscribe());

        let name = stage.name().to_string();
        tracing::info!("Starting stage [{}]", name);

        self.tasks.spawn(async move {
            let result = async {
                stage.init().await?;
                stage.run().await
            }
            .await;
            (name, result)
        });
    }

    pub fn terminate(&self) {
        // No receivers simply means nothing is left to stop.
        let _ = self.control.send(ControlMessage::Terminate);
    }

    /// Waits for every stage to finish. The first failing stage terminates
    /// the others, and its error is returned once all have stopped.
    pub async fn wait_for_all(&mut self) -> anyhow::Result<()> {
        let mut first_error = None;

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => tracing::info!("Stage [{}] stopped", name),
                Ok((name, Err(e))) => {
                    tracing::error!("Stage [{}] failed: {:#}", name, e);
                    self.terminate();
                    first_error.get_or_insert(e.context(format!("stage '{name}' failed")));
                }
                Err(e) => {
                    tracing::error!("Stage task aborted: {}", e);
                    self.terminate();
                    first_error.get_or_insert(anyhow::anyhow!(e));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for StageRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Sends `Terminate` on the control channel when Ctrl-C is received.
pub fn terminate_on_ctrl_c(control: broadcast::Sender<ControlMessage>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Ctrl-C received, shutting down");
                let _ = control.send(ControlMessage::Terminate);
            }
            Err(e) => tracing::error!("Unable to listen for Ctrl-C: {}", e),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::processor::Processor;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Idle;

    #[async_trait]
    impl Processor for Idle {
        async fn init(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn process(&mut self) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(())
        }
    }

    struct FailsOnInit;

    #[async_trait]
    impl Processor for FailsOnInit {
        async fn init(&mut self) -> anyhow::Result<()> {
            anyhow::bail!("no connection")
        }

        async fn process(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_terminate_stops_all_stages() {
        let mut runner = StageRunner::new();
        runner.spawn(Stage::new("a", Box::new(Idle)));
        runner.spawn(Stage::new("b", Box::new(Idle)));
        assert_eq!(runner.len(), 2);

        let control = runner.control();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            control.send(ControlMessage::Terminate).unwrap();
        });

        runner.wait_for_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_stage_terminates_the_rest() {
        let mut runner = StageRunner::new();
        runner.spawn(Stage::new("idle", Box::new(Idle)));
        runner.spawn(Stage::new("broken", Box::new(FailsOnInit)));

        let err = runner.wait_for_all().await.unwrap_err();
        assert!(format!("{err:#}").contains("stage 'broken' failed"));
        assert!(format!("{err:#}").contains("no connection"));
    }
}
