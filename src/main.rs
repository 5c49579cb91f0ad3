use clap::{Parser, Subcommand};

mod app;
mod config;
mod core;
mod logging;
mod processors;
mod queue;
mod web;

use processors::use_case::UseCase;

/// mqrelay - relay queue traffic to live browser dashboards
#[derive(Parser)]
#[command(name = "mqrelay")]
#[command(version = "0.1.0")]
#[command(about = "mqrelay: produce to, read from and live-relay message queues")]
#[command(long_about = "
------------------------------------------------------------
    Produce synthetic traffic onto source queues, consume
    the mirrored stream queues and push live rates and
    payloads to browsers over SSE and WebSocket.
------------------------------------------------------------")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "./config/mqrelay.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Continuously put generated messages on a use case's source queue
    Produce {
        /// Which demo stream to drive
        #[arg(short, long, value_enum)]
        use_case: UseCase,

        /// Messages per second (approx), overrides the config file
        #[arg(short, long)]
        rate: Option<f64>,
    },

    /// Read the stream queues and serve the live dashboard
    Dashboard {
        /// Also run one producer per use case in this process
        #[arg(long)]
        simulate: bool,
    },

    /// Accept selections over HTTP and relay them to WebSocket viewers
    Spin,

    /// List available use cases
    ListUseCases,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging with specified level
    logging::init_logging(&cli.log_level);

    if let Command::ListUseCases = cli.command {
        println!("Available use cases:");
        for use_case in UseCase::all() {
            println!(
                "  - {:<7} {} ({} -> {})",
                use_case.name(),
                use_case.description(),
                use_case.source_queue(),
                use_case.stream_queue()
            );
        }
        return;
    }

    // Load configuration from specified file
    let config = match config::load_config_or_default(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Failed to load config from '{}': {:#}", cli.config, e);
            std::process::exit(1);
        }
    };

    // Validate configuration
    if let Err(e) = config::validate_config(&config) {
        tracing::error!("Configuration error: {e}");
        std::process::exit(1);
    }

    tracing::info!("Configuration loaded and validated successfully.");

    let result = match cli.command {
        Command::Produce { use_case, rate } => app::run_producer(config, use_case, rate).await,
        Command::Dashboard { simulate } => app::run_dashboard(config, simulate).await,
        Command::Spin => app::run_spin(config).await,
        Command::ListUseCases => Ok(()),
    };

    if let Err(e) = result {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }

    tracing::info!("Shut down cleanly.");
}
