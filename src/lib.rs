//! Webcam Recorder - live background blur and WebM capture for a webcam.
//!
//! This is the main library crate. It provides stream acquisition, the frame
//! compositors, segmentation, the recording pipeline and the CLI commands.

pub mod capture;
pub mod commands;
pub mod compositor;
pub mod config;
pub mod recorder;
pub mod segmentation;
pub mod utils;

use commands::{Cli, Commands};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utils::error::AppResult;

/// Install the tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webcam_recorder_lib=debug,webcam_recorder=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Run a parsed command line
pub async fn run(cli: Cli) -> AppResult<()> {
    tracing::info!("Starting Webcam Recorder v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Devices { json } => commands::devices::list_devices(json),
        Commands::Record(args) => commands::record::run_record(args).await,
        Commands::Composite(args) => commands::composite::composite_file(&args),
    }
}
