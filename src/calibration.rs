//! Startup frame draining so the sensor's auto exposure can settle.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::session::CaptureSession;
use crate::traits::{CaptureStream, Result};

/// Outcome of a calibration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationReport {
    /// Frames captured and discarded.
    pub frames: u32,
    /// Wall time spent draining.
    pub elapsed: Duration,
}

impl CalibrationReport {
    /// Mean time per frame, zero when nothing was captured.
    pub fn average(&self) -> Duration {
        self.elapsed.checked_div(self.frames).unwrap_or_default()
    }
}

/// Capture and release `frames` buffers without looking at their content.
pub fn calibrate<S: CaptureStream>(
    session: &mut CaptureSession<S>,
    frames: u32,
) -> Result<CalibrationReport> {
    let started = Instant::now();

    for _ in 0..frames {
        let handle = session.capture_one()?;
        session.release(handle)?;
    }

    let report = CalibrationReport {
        frames,
        elapsed: started.elapsed(),
    };

    if frames > 0 {
        debug!(
            frames,
            elapsed_ms = report.elapsed.as_millis(),
            average_ms = report.average().as_millis(),
            "calibration finished"
        );
    }

    Ok(report)
}
