//! Composition root: wires configuration, the queue service, stages and the
//! web surface for each program, and owns their lifecycle.

use crate::config::Config;
use crate::core::hub::FanoutHub;
use crate::core::runner::{StageRunner, terminate_on_ctrl_c};
use crate::core::stage::{ControlMessage, Stage};
use crate::processors::broadcast::SnapshotBroadcaster;
use crate::processors::producer::create_producer;
use crate::processors::reader::{ReaderSet, StreamReader};
use crate::processors::relay::SpinRelay;
use crate::processors::use_case::UseCase;
use crate::queue::{self, QueueService};
use crate::web;

use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Per-subscriber buffer of the live-update hubs.
const HUB_CAPACITY: usize = 32;

pub async fn run_producer(config: Config, use_case: UseCase, rate: Option<f64>) -> anyhow::Result<()> {
    let rate = rate.unwrap_or(config.producer.rate);
    let service = queue::connect(&config.queue_service).await?;

    tracing::info!(
        "Producing {} messages to {} at ~{} msg/s",
        use_case.name(),
        use_case.source_queue(),
        rate
    );

    let mut runner = StageRunner::new();
    runner.spawn(create_producer(use_case, rate, service));
    terminate_on_ctrl_c(runner.control());
    runner.wait_for_all().await
}

/// Starts one reader per configured stream queue and returns their handles.
pub fn start_readers(
    config: &Config,
    service: &Arc<dyn QueueService>,
    runner: &mut StageRunner,
) -> ReaderSet {
    let mut readers = ReaderSet::new(config.dashboard.streams.clone());
    for stream in &config.dashboard.streams {
        let reader = StreamReader::from_config(stream, service.clone(), &config.dashboard);
        readers.insert(reader.handle());
        runner.spawn(Stage::new(format!("reader:{stream}"), Box::new(reader)));
    }
    readers
}

pub async fn run_dashboard(config: Config, simulate: bool) -> anyhow::Result<()> {
    let service = queue::connect(&config.queue_service).await?;
    let mut runner = StageRunner::new();
    let shutdown = runner.control().subscribe();

    let readers = Arc::new(start_readers(&config, &service, &mut runner));

    if simulate {
        for use_case in UseCase::all() {
            runner.spawn(create_producer(use_case, config.producer.rate, service.clone()));
        }
    }

    let hub = Arc::new(FanoutHub::new(HUB_CAPACITY));
    let source = readers.clone();
    runner.spawn(Stage::new(
        "snapshots",
        Box::new(SnapshotBroadcaster::new(
            hub.clone(),
            Duration::from_millis(config.dashboard.snapshot_interval_ms),
            move || source.snapshot_json(),
        )),
    ));

    let state = Arc::new(web::dashboard::DashboardState { readers, hub });
    let router = web::dashboard::router(state);
    serve_with_stages(&config.dashboard.bind, router, runner, shutdown).await
}

pub async fn run_spin(config: Config) -> anyhow::Result<()> {
    let service = queue::connect(&config.queue_service).await?;
    let mut runner = StageRunner::new();
    let shutdown = runner.control().subscribe();
    let hub = Arc::new(FanoutHub::new(HUB_CAPACITY));

    runner.spawn(Stage::new(
        "relay",
        Box::new(SpinRelay::new(
            &config.spin.queue,
            Duration::from_millis(config.spin.wait_ms),
            service.clone(),
            hub.clone(),
        )),
    ));

    let state = Arc::new(web::spin::SpinState {
        service,
        queue: config.spin.queue.clone(),
        hub,
    });
    let router = web::spin::router(state);
    serve_with_stages(&config.spin.bind, router, runner, shutdown).await
}

/// Runs the HTTP server alongside the stages. Ctrl-C, a server failure or a
/// failing stage stops everything.
///
/// `shutdown` must be subscribed before the first stage is spawned, so that
/// a `Terminate` sent while stages start up still reaches the server.
async fn serve_with_stages(
    bind: &str,
    router: Router,
    mut runner: StageRunner,
    shutdown: broadcast::Receiver<ControlMessage>,
) -> anyhow::Result<()> {
    let control = runner.control();
    terminate_on_ctrl_c(control.clone());

    let server = async {
        let result = web::serve(bind, router, shutdown).await;
        if result.is_err() {
            let _ = control.send(ControlMessage::Terminate);
        }
        result
    };

    let (served, stages) = tokio::join!(server, runner.wait_for_all());
    served?;
    stages
}
