//! Vidcap CLI: inspect capture geometry and exercise the capture engine.
//!
//! Usage:
//!   vidcap orientation                     Print orientation hint tables
//!   vidcap transform [OPTIONS]             Print a preview display transform
//!   vidcap devices                         List camera devices
//!   vidcap simulate [OPTIONS]              Run a full capture cycle

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "vidcap",
    about = "Camera capture session and recording toolkit",
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
    /// Print the orientation hint for every sensor mounting and display rotation
    Orientation,

    /// Print the transform fitting the capture buffer onto a preview view
    Transform {
        /// Preview view width
        #[arg(long, default_value = "1920")]
        width: u32,

        /// Preview view height
        #[arg(long, default_value = "1080")]
        height: u32,

        /// Display rotation in degrees (0, 90, 180, 270)
        #[arg(long, default_value = "90")]
        rotation: u32,

        /// Capture buffer width (defaults to the configured preview size)
        #[arg(long)]
        buffer_width: Option<u32>,

        /// Capture buffer height (defaults to the configured preview size)
        #[arg(long)]
        buffer_height: Option<u32>,
    },

    /// List camera devices
    Devices {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Open, preview, record, stop, and close against the virtual camera
    Simulate {
        /// How long to keep recording (seconds)
        #[arg(long, default_value = "1.0")]
        seconds: f64,

        /// Display rotation in degrees while recording
        #[arg(long, default_value = "0")]
        rotation: u32,

        /// Output directory for the recording
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Camera to open: back, front, or a device id
        #[arg(long)]
        camera: Option<String>,

        /// Encode through GStreamer instead of the virtual encoder
        #[arg(long)]
        gst: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logging = vidcap_common::config::AppConfig::load().logging;
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    vidcap_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Orientation => commands::orientation::run(),
        Commands::Transform {
            width,
            height,
            rotation,
            buffer_width,
            buffer_height,
        } => commands::transform::run(width, height, rotation, buffer_width, buffer_height),
        Commands::Devices { json } => commands::devices::run(json),
        Commands::Simulate {
            seconds,
            rotation,
            output,
            camera,
            gst,
        } => commands::simulate::run(seconds, rotation, output, camera, gst).await,
    }
}
