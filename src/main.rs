use anyhow::Context;
use clap::Parser;
use webcam_recorder_lib::commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    webcam_recorder_lib::init_logging();

    let cli = Cli::parse();
    webcam_recorder_lib::run(cli)
        .await
        .context("webcam-recorder failed")?;

    Ok(())
}
