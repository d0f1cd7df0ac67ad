//! The capture, score and backlight feedback loop.

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::backlight::{BacklightController, DisplayServer};
use crate::brightness::{self, BrightnessSample};
use crate::calibration::calibrate;
use crate::config::Config;
use crate::decoder::{DecodedFrame, FrameDecoder};
use crate::device::V4L2Device;
use crate::display::XDisplay;
use crate::error::{Error, Result};
use crate::session::{enable_auto_exposure, negotiate, CaptureSession, FrameHandle, BUFFER_COUNT};
use crate::traits::{CameraDevice, CameraError, CaptureStream};

/// Consecutive undecodable frames tolerated in one-shot mode.
pub const MAX_DECODE_ATTEMPTS: u32 = 5;

/// Where the loop is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Resources acquired, stream not started.
    Init,
    /// Draining frames while auto exposure settles.
    Calibrating,
    /// Scoring frames and driving the backlight.
    Running,
    /// Stream stopped and resources released.
    Terminated,
}

/// Result of one capture-to-backlight cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    /// Normalised frame brightness.
    pub sample: BrightnessSample,
    /// Score handed to the backlight controller.
    pub percent: u8,
    /// Outputs that accepted the new value.
    pub outputs: usize,
}

/// Drives the backlight from the camera until one-shot completion or a fatal error.
pub struct ControlLoop<'c, S: CaptureStream, D: DisplayServer> {
    config: &'c Config,
    session: CaptureSession<S>,
    decoder: FrameDecoder,
    backlight: BacklightController<D>,
    auto_exposure: bool,
    phase: Phase,
    pending_dump: Option<PathBuf>,
}

impl<'c, S: CaptureStream, D: DisplayServer> ControlLoop<'c, S, D> {
    /// Assemble the loop from an allocated session and a ready backlight controller.
    ///
    /// The decoder is sized from the session's negotiated format.
    pub fn new(
        config: &'c Config,
        session: CaptureSession<S>,
        backlight: BacklightController<D>,
        auto_exposure: bool,
    ) -> Self {
        let decoder = FrameDecoder::new(session.format());
        Self {
            config,
            session,
            decoder,
            backlight,
            auto_exposure,
            phase: Phase::Init,
            pending_dump: config.dump_frame.clone(),
        }
    }

    /// Current phase.
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Backlight controller in use.
    pub const fn backlight(&self) -> &BacklightController<D> {
        &self.backlight
    }

    /// Start streaming and, with auto exposure active, let it settle.
    pub fn start(&mut self) -> Result<()> {
        if self.phase != Phase::Init {
            return Err(CameraError::InvalidState("control loop already started").into());
        }

        self.session.start()?;

        if self.auto_exposure {
            self.phase = Phase::Calibrating;
            calibrate(&mut self.session, self.config.calibration_frames)?;
        }

        self.phase = Phase::Running;
        Ok(())
    }

    /// Capture one frame, score it and push the score to every output.
    ///
    /// A frame that fails to decode is reported as [`Error::Decode`]; its
    /// buffer has already been released and the next cycle may proceed.
    pub fn cycle(&mut self) -> Result<CycleReport> {
        if self.phase != Phase::Running {
            return Err(CameraError::InvalidState("cycle outside running phase").into());
        }

        let handle = self.session.capture_one()?;
        trace!(
            index = handle.metadata().index,
            sequence = handle.metadata().sequence,
            bytes = handle.metadata().bytes_used,
            "frame captured"
        );
        let decoded = self.consume(&handle);
        self.session.release(handle)?;
        let frame = decoded?;

        let sample = brightness::score(&frame, self.config.model);
        let percent = sample.percent();
        debug!(
            brightness = sample.value(),
            percent,
            model = %self.config.model,
            "calculated brightness"
        );

        let outputs = self.backlight.set_brightness(percent);
        if outputs == 0 {
            warn!("can't find any valid output");
        }

        Ok(CycleReport {
            sample,
            percent,
            outputs,
        })
    }

    fn consume(&mut self, handle: &FrameHandle) -> Result<DecodedFrame> {
        let bytes = self.session.frame(handle)?;

        if let Some(path) = self.pending_dump.take() {
            fs::write(&path, bytes)?;
            info!(path = %path.display(), bytes = bytes.len(), "frame dumped");
        }

        Ok(self.decoder.decode(bytes)?)
    }

    /// Run to completion and release everything.
    ///
    /// Without an interactive delay a single cycle is run, skipping at most
    /// [`MAX_DECODE_ATTEMPTS`] - 1 undecodable frames. In interactive mode
    /// cycles repeat until a fatal error, undecodable frames are skipped.
    pub fn run(mut self) -> Result<()> {
        if self.phase == Phase::Init {
            self.start()?;
        }

        let outcome = match self.config.interactive {
            Some(delay) => self.run_interactive(delay),
            None => self.run_once(),
        };

        let closed = self.shutdown();
        outcome.and(closed)
    }

    fn run_once(&mut self) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.cycle() {
                Ok(_) => return Ok(()),
                Err(Error::Decode(err)) if attempt < MAX_DECODE_ATTEMPTS => {
                    warn!(attempt, %err, "skipping undecodable frame");
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn run_interactive(&mut self, delay: Duration) -> Result<()> {
        info!(delay_ms = delay.as_millis(), "interactive mode");
        loop {
            match self.cycle() {
                Ok(_) => {}
                Err(Error::Decode(err)) => warn!(%err, "skipping undecodable frame"),
                Err(err) => return Err(err),
            }
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
    }

    /// Stop streaming and release the device and display.
    ///
    /// The loop is consumed; [`Phase::Terminated`] has no live value.
    pub fn shutdown(self) -> Result<()> {
        debug!(from = ?self.phase, to = ?Phase::Terminated, "control loop stopping");
        self.session.close()?;
        Ok(())
    }
}

/// Set up capture and backlight on `device` and `display`, then run the loop.
///
/// The backlight capability is checked before streaming starts, so a display
/// without any adjustable output fails without touching the stream.
pub fn run_with<C: CameraDevice, D: DisplayServer>(
    config: &Config,
    device: &mut C,
    display: D,
) -> Result<()> {
    config.validate()?;

    let format = negotiate(device, config.width, config.height)?;
    let auto_exposure = enable_auto_exposure(device)?;
    debug!(auto_exposure, "exposure configured");

    let stream = device.create_stream(BUFFER_COUNT)?;
    let session = CaptureSession::new(stream, format)?;
    debug!(buffers = session.pool().len(), "buffers allocated");

    let backlight = BacklightController::new(display)?;

    ControlLoop::new(config, session, backlight, auto_exposure).run()
}

/// Run against the configured V4L2 device and X display.
pub fn run(config: &Config) -> Result<()> {
    let mut device = V4L2Device::open(config.device.as_deref())?;
    let display = XDisplay::connect(config.display.as_deref())?;

    run_with(config, &mut device, display)
}
