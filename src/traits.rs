//! Core traits and types for the capture device abstraction.

use std::fmt;
use std::time::Duration;

pub use crate::error::CameraError;

/// Pixel format representation (e.g., MJPG, YUYV).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{}", char::from(byte))?;
        }
        Ok(())
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Negotiated capture format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
}

impl Format {
    /// Create a new format specification.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        Self {
            width,
            height,
            fourcc,
        }
    }

    /// Size of one decoded frame in packed RGB.
    #[must_use]
    pub const fn rgb_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Value of the device's exposure mode control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureMode {
    /// Automatic exposure time and iris.
    Auto,
    /// Manual exposure time and iris.
    Manual,
    /// Manual exposure time, auto iris.
    ShutterPriority,
    /// Auto exposure time, manual iris.
    AperturePriority,
    /// A driver-specific value.
    Other(i64),
}

impl ExposureMode {
    /// Auto submodes in the order they are tried.
    pub const AUTO_PRIORITY: [Self; 3] = [Self::Auto, Self::ShutterPriority, Self::AperturePriority];

    /// Decode the raw `V4L2_CID_EXPOSURE_AUTO` value.
    #[must_use]
    pub const fn from_raw(value: i64) -> Self {
        match value {
            0 => Self::Auto,
            1 => Self::Manual,
            2 => Self::ShutterPriority,
            3 => Self::AperturePriority,
            other => Self::Other(other),
        }
    }

    /// Raw `V4L2_CID_EXPOSURE_AUTO` value.
    #[must_use]
    pub const fn raw(self) -> i64 {
        match self {
            Self::Auto => 0,
            Self::Manual => 1,
            Self::ShutterPriority => 2,
            Self::AperturePriority => 3,
            Self::Other(other) => other,
        }
    }
}

/// Metadata for a dequeued buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMetadata {
    /// Index of the buffer in the stream's pool.
    pub index: usize,
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Bytes of payload in the buffer.
    pub bytes_used: u32,
    /// Length of the mapped region.
    pub length: usize,
    /// The driver flagged the buffer as erroneous.
    pub corrupted: bool,
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// Abstraction over camera device operations.
pub trait CameraDevice {
    /// The stream type returned by `create_stream`.
    type Stream<'a>: CaptureStream
    where
        Self: 'a;

    /// Get device capabilities.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Set capture format. Returns the actual format set by the driver.
    fn set_format(&mut self, format: &Format) -> Result<Format>;

    /// Current exposure mode, or `None` if the device has no exposure mode control.
    fn exposure_mode(&self) -> Result<Option<ExposureMode>>;

    /// Write the exposure mode control.
    fn set_exposure_mode(&mut self, mode: ExposureMode) -> Result<()>;

    /// Allocate `buffer_count` memory-mapped buffers and wrap them in a stream.
    fn create_stream(&mut self, buffer_count: u32) -> Result<Self::Stream<'_>>;
}

/// Abstraction over the kernel buffer queue of a capture stream.
///
/// A buffer is either queued (owned by the driver) or dequeued (readable by
/// us). `dequeue` blocks until the driver has filled one; it may return
/// [`CameraError::BufferUnavailable`] when nothing is ready yet.
pub trait CaptureStream {
    /// Number of buffers backing the stream.
    fn buffer_count(&self) -> usize;

    /// Hand a buffer to the driver for filling.
    fn queue(&mut self, index: usize) -> Result<()>;

    /// Signal stream-on.
    fn start(&mut self) -> Result<()>;

    /// Take the next filled buffer from the driver.
    fn dequeue(&mut self) -> Result<FrameMetadata>;

    /// Mapped contents of a dequeued buffer.
    fn buffer(&self, index: usize) -> Option<&[u8]>;

    /// Signal stream-off.
    fn stop(&mut self) -> Result<()>;
}
