//! V4L2 device implementation using the v4l crate.

use std::fs;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};
use v4l::buffer::{Flags, Type};
use v4l::control::{Control, Value};
use v4l::format::FieldOrder;
use v4l::io::mmap::Stream;
use v4l::io::traits::{CaptureStream as V4lCaptureStream, Stream as V4lStream};
use v4l::video::Capture;
use v4l::Device;

use crate::traits::{
    CameraDevice, CameraError, CaptureStream, DeviceCapabilities, ExposureMode, Format, FourCC,
    FrameMetadata, Result,
};

/// Number of `/dev/videoN` nodes tried when no device is given.
pub const DEVICE_CANDIDATES: u32 = 10;

const V4L2_CID_EXPOSURE_AUTO: u32 = 0x009a_0901;

/// Default device paths in search order.
pub fn default_candidates() -> impl Iterator<Item = PathBuf> {
    (0..DEVICE_CANDIDATES).map(|index| PathBuf::from(format!("/dev/video{index}")))
}

/// Pick the device node to open.
///
/// An explicit `hint` must exist and be a character device. Without one, the
/// first candidate that is a character device wins.
pub fn resolve_device_path<I>(hint: Option<&Path>, candidates: I) -> Result<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    if let Some(path) = hint {
        let metadata = fs::metadata(path).map_err(|source| CameraError::DeviceMissing {
            path: path.to_path_buf(),
            source,
        })?;
        if !metadata.file_type().is_char_device() {
            return Err(CameraError::NotACharacterDevice(path.to_path_buf()));
        }
        return Ok(path.to_path_buf());
    }

    let mut tried = 0;
    for candidate in candidates {
        tried += 1;
        debug!("Trying to open {} as a video device", candidate.display());
        let Ok(metadata) = fs::metadata(&candidate) else {
            continue;
        };
        if metadata.file_type().is_char_device() {
            return Ok(candidate);
        }
    }

    Err(CameraError::NoDeviceFound { tried })
}

/// Map a failed v4l `next` to a camera error.
///
/// By the time `next` fails it has already requeued the previous buffer, so a
/// retried call would queue it twice. Nothing from this backend is transient.
fn dequeue_error(err: &io::Error) -> CameraError {
    CameraError::StreamError(err.to_string())
}

/// V4L2 device implementation wrapping the v4l crate.
pub struct V4L2Device {
    device: Device,
    path: PathBuf,
    capabilities: DeviceCapabilities,
}

impl V4L2Device {
    /// Open a capture device, probing `/dev/video0..9` when `hint` is `None`.
    pub fn open(hint: Option<&Path>) -> Result<Self> {
        let path = resolve_device_path(hint, default_candidates())?;

        let device = Device::with_path(&path)
            .map_err(|err| CameraError::DeviceOpenFailed(format!("{}: {err}", path.display())))?;

        let caps = device.query_caps().map_err(|err| {
            CameraError::DeviceOpenFailed(format!("{} is no V4L2 device: {err}", path.display()))
        })?;

        let capabilities = DeviceCapabilities {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
        };

        if !capabilities.can_capture {
            return Err(CameraError::NotACaptureDevice(path.display().to_string()));
        }
        if !capabilities.can_stream {
            return Err(CameraError::StreamingUnsupported(path.display().to_string()));
        }

        info!(
            device = %path.display(),
            card = %capabilities.card,
            driver = %capabilities.driver,
            "opened capture device"
        );

        Ok(Self {
            device,
            path,
            capabilities,
        })
    }

    /// Path of the opened device node.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CameraDevice for V4L2Device {
    type Stream<'a> = V4L2Stream<'a>;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        let mut fmt = self
            .device
            .format()
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        fmt.width = format.width;
        fmt.height = format.height;
        fmt.fourcc = format.fourcc.into();
        fmt.field_order = FieldOrder::Progressive;

        let fmt = self
            .device
            .set_format(&fmt)
            .map_err(|err| CameraError::FormatUnsupported {
                requested: format.fourcc,
                reason: err.to_string(),
            })?;

        Ok(Format::new(fmt.width, fmt.height, FourCC::from(fmt.fourcc)))
    }

    fn exposure_mode(&self) -> Result<Option<ExposureMode>> {
        let controls = self
            .device
            .query_controls()
            .map_err(|err| CameraError::Control(err.to_string()))?;

        if !controls.iter().any(|desc| desc.id == V4L2_CID_EXPOSURE_AUTO) {
            return Ok(None);
        }

        let control = self
            .device
            .control(V4L2_CID_EXPOSURE_AUTO)
            .map_err(|err| CameraError::Control(err.to_string()))?;

        match control.value {
            Value::Integer(raw) => Ok(Some(ExposureMode::from_raw(raw))),
            _ => Err(CameraError::Control(
                "exposure mode control is not an integer".to_owned(),
            )),
        }
    }

    fn set_exposure_mode(&mut self, mode: ExposureMode) -> Result<()> {
        self.device
            .set_control(Control {
                id: V4L2_CID_EXPOSURE_AUTO,
                value: Value::Integer(mode.raw()),
            })
            .map_err(|err| CameraError::Control(err.to_string()))
    }

    fn create_stream(&mut self, buffer_count: u32) -> Result<Self::Stream<'_>> {
        if buffer_count == 0 {
            return Err(CameraError::BufferAllocation(format!(
                "insufficient buffer memory on {}",
                self.path.display()
            )));
        }

        let stream = Stream::with_buffers(&self.device, Type::VideoCapture, buffer_count)
            .map_err(|err| {
                CameraError::BufferAllocation(format!(
                    "{} does not support memory mapping: {err}",
                    self.path.display()
                ))
            })?;

        let buffer_count = buffer_count as usize;
        debug!(buffers = buffer_count, "frame buffers allocated");

        Ok(V4L2Stream {
            stream,
            buffer_count,
            staged: vec![Vec::new(); buffer_count],
            delivered: 0,
        })
    }
}

/// V4L2 capture stream wrapping mmap-based streaming.
///
/// The v4l mmap stream only lends a mapped region for the duration of the
/// borrow returned by `next`, and hands the previous buffer back to the driver
/// itself on the following call. Each dequeued payload is therefore staged in a
/// per-slot buffer. Slots are assigned in rotation, which matches the FIFO
/// order in which the driver returns buffers.
pub struct V4L2Stream<'a> {
    stream: Stream<'a>,
    buffer_count: usize,
    staged: Vec<Vec<u8>>,
    delivered: usize,
}

impl CaptureStream for V4L2Stream<'_> {
    fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    fn queue(&mut self, index: usize) -> Result<()> {
        // The v4l stream requeues the previous buffer on the next dequeue.
        if index >= self.buffer_count {
            return Err(CameraError::InvalidState("buffer index out of range"));
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        // The first `next` queues every buffer and signals stream-on.
        Ok(())
    }

    fn dequeue(&mut self) -> Result<FrameMetadata> {
        let index = self.delivered % self.buffer_count;

        let (buf, meta) = self.stream.next().map_err(|err| dequeue_error(&err))?;

        let staged = self
            .staged
            .get_mut(index)
            .ok_or(CameraError::InvalidState("buffer index out of range"))?;
        let used = (meta.bytesused as usize).min(buf.len());
        staged.clear();
        staged.extend_from_slice(buf.get(..used).unwrap_or(buf));

        self.delivered = self.delivered.wrapping_add(1);

        // Safe conversions: V4L2 timestamps are always non-negative in practice
        #[allow(clippy::cast_sign_loss)]
        let secs = meta.timestamp.sec.max(0) as u64;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let nanos = (meta.timestamp.usec.max(0) as u32).saturating_mul(1000);

        Ok(FrameMetadata {
            index,
            sequence: meta.sequence,
            timestamp: Duration::new(secs, nanos),
            bytes_used: meta.bytesused,
            length: buf.len(),
            corrupted: meta.flags.contains(Flags::ERROR),
        })
    }

    fn buffer(&self, index: usize) -> Option<&[u8]> {
        self.staged.get(index).map(Vec::as_slice)
    }

    fn stop(&mut self) -> Result<()> {
        V4lStream::stop(&mut self.stream).map_err(|err| CameraError::StreamError(err.to_string()))
    }
}
