//! Capture session: format negotiation, exposure setup and the buffer lifecycle.
//!
//! A [`CaptureSession`] owns the stream and its pool of mapped buffers. Every
//! successful [`CaptureSession::capture_one`] yields a [`FrameHandle`] that must
//! be given back through [`CaptureSession::release`] before the buffer can be
//! refilled. The handle is neither `Clone` nor `Copy`, so a buffer is released
//! at most once, and [`CaptureSession::frame`] borrows the session immutably so
//! the view cannot outlive the release.

use tracing::{debug, info, trace, warn};

use crate::traits::{
    CameraDevice, CameraError, CaptureStream, ExposureMode, Format, FourCC, FrameMetadata, Result,
};

/// Number of memory-mapped buffers requested from the driver.
pub const BUFFER_COUNT: u32 = 2;

/// Pixel format requested from the device.
pub const PIXEL_FORMAT: FourCC = FourCC::MJPG;

/// Request MJPEG at the desired size and return what the driver granted.
///
/// The returned size is authoritative; drivers are free to round to the
/// nearest supported resolution.
pub fn negotiate<D: CameraDevice>(device: &mut D, width: u32, height: u32) -> Result<Format> {
    let requested = Format::new(width, height, PIXEL_FORMAT);
    let granted = device.set_format(&requested)?;

    if granted.fourcc != PIXEL_FORMAT {
        return Err(CameraError::FormatUnsupported {
            requested: PIXEL_FORMAT,
            reason: format!("driver substituted {}", granted.fourcc),
        });
    }

    debug!(width, height, "capture size requested");
    debug!(
        width = granted.width,
        height = granted.height,
        "capture size recognized"
    );

    Ok(granted)
}

/// Switch the device's exposure control to an automatic mode if it is manual.
///
/// Returns whether an automatic mode is active afterwards.
pub fn enable_auto_exposure<D: CameraDevice>(device: &mut D) -> Result<bool> {
    let Some(current) = device.exposure_mode()? else {
        debug!("device has no exposure mode control");
        return Ok(false);
    };

    if current != ExposureMode::Manual {
        debug!(mode = ?current, "auto exposure already active");
        return Ok(true);
    }

    for mode in ExposureMode::AUTO_PRIORITY {
        match device.set_exposure_mode(mode) {
            Ok(()) => {
                info!(?mode, "auto exposure enabled");
                return Ok(true);
            }
            Err(err) => debug!(?mode, %err, "exposure mode rejected"),
        }
    }

    warn!("device rejected every auto exposure mode");
    Ok(false)
}

/// Whether the session is streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Stream-off; no buffer may be dequeued.
    Stopped,
    /// Stream-on.
    Streaming,
}

/// Bookkeeping for one kernel-shared buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedBuffer {
    /// Length of the mapped region, known once the buffer has been filled.
    pub length: usize,
    /// The buffer has been dequeued and not yet released.
    pub in_flight: bool,
}

/// Fixed set of buffers shared with the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferPool {
    buffers: Vec<MappedBuffer>,
}

impl BufferPool {
    fn new(count: usize) -> Self {
        Self {
            buffers: vec![MappedBuffer::default(); count],
        }
    }

    /// Number of buffers in the pool.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether the pool has no buffers.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Bookkeeping for buffer `index`.
    pub fn get(&self, index: usize) -> Option<&MappedBuffer> {
        self.buffers.get(index)
    }

    /// Number of buffers currently dequeued.
    pub fn in_flight(&self) -> usize {
        self.buffers.iter().filter(|buf| buf.in_flight).count()
    }

    fn slot(&mut self, index: usize) -> Result<&mut MappedBuffer> {
        self.buffers
            .get_mut(index)
            .ok_or(CameraError::InvalidState("driver returned an unknown buffer index"))
    }
}

/// Proof that a buffer is dequeued. Give it back with [`CaptureSession::release`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a captured frame must be released"]
pub struct FrameHandle {
    metadata: FrameMetadata,
}

impl FrameHandle {
    /// Metadata the driver reported for this buffer.
    pub const fn metadata(&self) -> &FrameMetadata {
        &self.metadata
    }
}

/// An open capture stream together with its negotiated format and buffer pool.
pub struct CaptureSession<S: CaptureStream> {
    stream: S,
    format: Format,
    pool: BufferPool,
    state: StreamState,
}

impl<S: CaptureStream> CaptureSession<S> {
    /// Wrap a freshly allocated stream.
    pub fn new(stream: S, format: Format) -> Result<Self> {
        let count = stream.buffer_count();
        if count == 0 {
            return Err(CameraError::BufferAllocation(
                "driver allocated no buffers".to_owned(),
            ));
        }

        Ok(Self {
            stream,
            format,
            pool: BufferPool::new(count),
            state: StreamState::Stopped,
        })
    }

    /// Negotiated format.
    pub const fn format(&self) -> &Format {
        &self.format
    }

    /// Current stream state.
    pub const fn state(&self) -> StreamState {
        self.state
    }

    /// Buffer pool bookkeeping.
    pub const fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Queue every buffer and signal stream-on.
    pub fn start(&mut self) -> Result<()> {
        if self.state == StreamState::Streaming {
            return Err(CameraError::InvalidState("stream already started"));
        }

        for index in 0..self.pool.len() {
            self.stream.queue(index)?;
        }
        self.stream.start()?;
        self.state = StreamState::Streaming;

        info!(buffers = self.pool.len(), "streaming started");
        Ok(())
    }

    /// Block until a good buffer is filled and take it from the driver.
    ///
    /// Buffers not ready yet and buffers the driver flagged as erroneous are
    /// retried without backoff.
    pub fn capture_one(&mut self) -> Result<FrameHandle> {
        if self.state != StreamState::Streaming {
            return Err(CameraError::InvalidState("capture before stream-on"));
        }

        loop {
            let metadata = match self.stream.dequeue() {
                Ok(metadata) => metadata,
                Err(err) if err.is_transient() => continue,
                Err(err) => return Err(err),
            };

            let slot = self.pool.slot(metadata.index)?;
            if slot.in_flight {
                return Err(CameraError::InvalidState("buffer dequeued twice"));
            }

            if metadata.corrupted {
                trace!(index = metadata.index, "dropping erroneous buffer");
                self.stream.queue(metadata.index)?;
                continue;
            }

            slot.in_flight = true;
            slot.length = metadata.length;

            return Ok(FrameHandle { metadata });
        }
    }

    /// Compressed payload of a captured buffer.
    ///
    /// The view covers the bytes the driver reported as used, bounded by the
    /// length of the region.
    pub fn frame(&self, handle: &FrameHandle) -> Result<&[u8]> {
        let metadata = &handle.metadata;
        let length = self
            .pool
            .get(metadata.index)
            .filter(|slot| slot.in_flight)
            .map(|slot| slot.length)
            .ok_or(CameraError::InvalidState("frame view of a queued buffer"))?;
        let buffer = self
            .stream
            .buffer(metadata.index)
            .ok_or(CameraError::InvalidState("buffer not mapped"))?;
        let used = (metadata.bytes_used as usize).min(length).min(buffer.len());
        Ok(buffer.get(..used).unwrap_or(buffer))
    }

    /// Give a captured buffer back to the driver for refilling.
    pub fn release(&mut self, handle: FrameHandle) -> Result<()> {
        let index = handle.metadata.index;
        let slot = self.pool.slot(index)?;
        if !slot.in_flight {
            return Err(CameraError::InvalidState("released buffer is not dequeued"));
        }

        self.stream.queue(index)?;
        slot.in_flight = false;
        Ok(())
    }

    /// Signal stream-off and drop the stream, unmapping every buffer.
    pub fn close(mut self) -> Result<()> {
        if self.state == StreamState::Streaming {
            self.stream.stop()?;
            self.state = StreamState::Stopped;
        }
        info!("streaming stopped");
        Ok(())
    }
}
