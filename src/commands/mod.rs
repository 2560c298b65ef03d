//! Command-line commands
//!
//! Each subcommand of the `webcam-recorder` binary is handled here.

pub mod composite;
pub mod devices;
pub mod record;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "webcam-recorder")]
#[command(about = "Webcam recorder with live background blur and WebM capture")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List available cameras and microphones
    Devices {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Preview and record interactively
    Record(record::RecordArgs),

    /// Apply the face window blur to an image file
    Composite(composite::CompositeArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompositorVariant;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_record_flags() {
        let cli = Cli::try_parse_from([
            "webcam-recorder",
            "record",
            "--variant",
            "segmentation",
            "--fps",
            "24",
            "--blur",
        ])
        .unwrap();

        match cli.command {
            Commands::Record(args) => {
                assert_eq!(args.variant, Some(CompositorVariant::Segmentation));
                assert_eq!(args.fps, Some(24));
                assert!(args.blur);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
