//! Autolight binary: set the backlight once, or keep following the room.

use std::path::PathBuf;
use std::time::Duration;

use autolight::config::{
    DEFAULT_CALIBRATION_FRAMES, DEFAULT_HEIGHT, DEFAULT_INTERACTIVE_TIMEOUT_MS, DEFAULT_WIDTH,
};
use autolight::{BrightnessModel, Config};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Adjust display backlight to the ambient light seen by a webcam.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Video device; the first of /dev/video0..9 when omitted
    #[arg(short, long)]
    device: Option<PathBuf>,

    /// X display name; $DISPLAY when omitted
    #[arg(long)]
    display: Option<String>,

    /// Capture width
    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    width: u32,

    /// Capture height
    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    height: u32,

    /// Frames used to calibrate exposure, only if the camera has auto exposure
    #[arg(short, long = "calibrate", value_name = "FRAMES", default_value_t = DEFAULT_CALIBRATION_FRAMES)]
    calibration_frames: u32,

    /// Brightness model: STD, OPT1 or OPT2
    #[arg(short = 'x', long = "brightness", value_name = "MODEL", default_value_t = BrightnessModel::Std)]
    model: BrightnessModel,

    /// Keep adjusting, waiting MS milliseconds between frames (default 1000)
    #[arg(short, long, value_name = "MS", num_args = 0..=1, require_equals = true)]
    interactive: Option<Option<u64>>,

    /// Write the first captured frame to this file
    #[arg(long, value_name = "PATH")]
    dump_frame: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            device: args.device,
            display: args.display,
            width: args.width,
            height: args.height,
            calibration_frames: args.calibration_frames,
            model: args.model,
            interactive: args.interactive.map(|timeout| {
                Duration::from_millis(timeout.unwrap_or(DEFAULT_INTERACTIVE_TIMEOUT_MS))
            }),
            dump_frame: args.dump_frame,
        }
    }
}

fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if args.verbose {
            "autolight=debug"
        } else {
            "autolight=info"
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from(args);
    info!(
        width = config.width,
        height = config.height,
        calibration_frames = config.calibration_frames,
        model = %config.model,
        interactive_ms = config.interactive.map(|delay| delay.as_millis()),
        "starting"
    );

    if let Err(err) = autolight::run(&config) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
