//! Resolved run configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::brightness::BrightnessModel;
use crate::error::ConfigError;

/// Capture width requested when none is given.
pub const DEFAULT_WIDTH: u32 = 640;
/// Capture height requested when none is given.
pub const DEFAULT_HEIGHT: u32 = 480;
/// Frames drained while auto exposure settles.
pub const DEFAULT_CALIBRATION_FRAMES: u32 = 24;
/// Delay between interactive cycles, in milliseconds.
pub const DEFAULT_INTERACTIVE_TIMEOUT_MS: u64 = 1000;

/// Everything a run needs, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Capture device path; searched for when `None`.
    pub device: Option<PathBuf>,
    /// X display name; `$DISPLAY` when `None`.
    pub display: Option<String>,
    /// Requested capture width.
    pub width: u32,
    /// Requested capture height.
    pub height: u32,
    /// Frames to drain before scoring when auto exposure is active.
    pub calibration_frames: u32,
    /// Brightness weighting.
    pub model: BrightnessModel,
    /// Repeat forever with this delay between cycles. `None` runs one cycle.
    pub interactive: Option<Duration>,
    /// Write the first captured frame here.
    pub dump_frame: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: None,
            display: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            calibration_frames: DEFAULT_CALIBRATION_FRAMES,
            model: BrightnessModel::default(),
            interactive: None,
            dump_frame: None,
        }
    }
}

impl Config {
    /// Reject values no device could honour.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::EmptyFrame {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}
