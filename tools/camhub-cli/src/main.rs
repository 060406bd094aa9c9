//! CamHub CLI — drive a synthetic camera through the session lifecycle.
//!
//! Usage:
//!   camhub record [OPTIONS]     Record a clip from the synthetic camera
//!   camhub preview [OPTIONS]    Stream preview frames and report stats

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "camhub",
    about = "Multiplex one camera to preview, recording, and listeners",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a clip from the synthetic camera
    Record {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Recording duration in seconds (0 = until Ctrl+C)
        #[arg(short, long, default_value = "5")]
        duration: u64,

        /// Synthetic camera frame rate
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Skip the audio encoder
        #[arg(long)]
        no_audio: bool,
    },

    /// Stream preview frames and print delivery statistics
    Preview {
        /// Preview duration in seconds (0 = until Ctrl+C)
        #[arg(short, long, default_value = "3")]
        duration: u64,

        /// Synthetic camera frame rate
        #[arg(long, default_value = "30")]
        fps: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    camhub_common::logging::init_logging(&camhub_common::config::LoggingConfig {
        level: log_level.to_string(),
        json: false,
        file: None,
    });

    match cli.command {
        Commands::Record {
            output,
            duration,
            fps,
            no_audio,
        } => commands::record::run(output, duration, fps, no_audio).await,
        Commands::Preview { duration, fps } => commands::preview::run(duration, fps).await,
    }
}
