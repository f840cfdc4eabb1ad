// SPDX-License-Identifier: GPL-3.0-only

use camkit::backends::camera::types::VideoFilter;
use camkit::constants::BitratePreset;
use camkit::pipelines::video::VideoCodec;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cli;

#[derive(Parser)]
#[command(name = "camkit")]
#[command(about = "Camera capture and recording pipeline")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a video from the test pattern source
    Video {
        /// Recording duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Output file path (default: ~/Videos/Camera/VID_TIMESTAMP.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Video codec (h264, hevc, av1)
        #[arg(short, long)]
        codec: Option<VideoCodec>,

        /// Bitrate preset
        #[arg(short, long, value_enum)]
        bitrate: Option<BitrateArg>,

        /// Filter applied to every frame
        #[arg(short, long, value_enum, default_value = "none")]
        filter: FilterArg,
    },

    /// Take a photo from the test pattern source
    Photo {
        /// Output file or directory (default: ~/Pictures/Camera/IMG_TIMESTAMP.png)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Filter applied to the frame
        #[arg(short, long, value_enum, default_value = "none")]
        filter: FilterArg,
    },

    /// List available video encoders
    Encoders,
}

#[derive(Clone, Copy, ValueEnum)]
enum FilterArg {
    None,
    RemoveBackground,
}

impl From<FilterArg> for VideoFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::None => VideoFilter::None,
            FilterArg::RemoveBackground => VideoFilter::RemoveBackground,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum BitrateArg {
    Low,
    Medium,
    High,
}

impl From<BitrateArg> for BitratePreset {
    fn from(arg: BitrateArg) -> Self {
        match arg {
            BitrateArg::Low => BitratePreset::Low,
            BitrateArg::Medium => BitratePreset::Medium,
            BitrateArg::High => BitratePreset::High,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG controls the level, e.g. RUST_LOG=camkit=debug
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(true)
        .with_level(true)
        .init();

    let args = Cli::parse();

    match args.command {
        Commands::Video {
            duration,
            output,
            codec,
            bitrate,
            filter,
        } => cli::record_video(cli::VideoArgs {
            duration,
            output,
            codec,
            bitrate: bitrate.map(Into::into),
            filter: filter.into(),
        }),
        Commands::Photo { output, filter } => cli::take_photo(output, filter.into()),
        Commands::Encoders => cli::list_encoders(),
    }
}
