use clap::{Parser, Subcommand};

use crate::capture::SourceKind;
use crate::config::{StreamConfig, CAMERA_JPEG_QUALITY, SCREEN_JPEG_QUALITY};

#[derive(Parser)]
#[command(name = "webcamstream")]
#[command(about = "Stream a camera or the screen as JPEG frames over WebSocket", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Capture options shared by every command
#[derive(clap::Args, Debug, Clone)]
pub struct CaptureArgs {
    /// Camera device index (/dev/video<N>)
    #[arg(long, default_value_t = 0)]
    pub camera_index: usize,

    /// JPEG quality for camera frames (1-100)
    #[arg(long, default_value_t = CAMERA_JPEG_QUALITY)]
    pub camera_quality: u8,

    /// JPEG quality for screen frames (1-100)
    #[arg(long, default_value_t = SCREEN_JPEG_QUALITY)]
    pub screen_quality: u8,

    /// Send camera frames as captured instead of mirrored
    #[arg(long)]
    pub no_mirror: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the streaming server
    Serve {
        /// Address to bind to
        #[arg(short, long, default_value = "127.0.0.1:8000")]
        addr: String,

        #[command(flatten)]
        capture: CaptureArgs,
    },

    /// Grab a single frame and save it as JPEG
    Snapshot {
        /// Source to grab from
        #[arg(value_enum)]
        source: SourceKind,

        /// Output file
        #[arg(short, long, default_value = "snapshot.jpg")]
        output: String,

        #[command(flatten)]
        capture: CaptureArgs,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl CaptureArgs {
    pub fn into_config(self, addr: Option<String>) -> StreamConfig {
        let defaults = StreamConfig::default();
        StreamConfig {
            addr: addr.unwrap_or(defaults.addr),
            camera_index: self.camera_index,
            camera_quality: self.camera_quality,
            screen_quality: self.screen_quality,
            mirror_camera: !self.no_mirror,
            ..defaults
        }
    }
}
