//! Error types for capture, decode and backlight control.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::traits::FourCC;

/// Crate-level result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the capture device and its buffer queue.
#[derive(Debug, Error)]
pub enum CameraError {
    /// None of the default device paths exists.
    #[error("can't identify default video device (tried {tried} candidates)")]
    NoDeviceFound {
        /// Number of candidate paths tried.
        tried: usize,
    },

    /// An explicitly given path does not exist.
    #[error("can't identify '{}': {source}", path.display())]
    DeviceMissing {
        /// Path that was given.
        path: PathBuf,
        /// Underlying stat error.
        source: io::Error,
    },

    /// The path exists but is not a character device.
    #[error("{} is no device", .0.display())]
    NotACharacterDevice(PathBuf),

    /// Failed to open device.
    #[error("failed to open device: {0}")]
    DeviceOpenFailed(String),

    /// The device cannot capture video.
    #[error("{0} is no video capture device")]
    NotACaptureDevice(String),

    /// The device has no streaming I/O.
    #[error("{0} does not support streaming i/o")]
    StreamingUnsupported(String),

    /// The device rejected the requested pixel format.
    #[error("camera doesn't support {requested} pixel format: {reason}")]
    FormatUnsupported {
        /// Format that was requested.
        requested: FourCC,
        /// What the driver said.
        reason: String,
    },

    /// Buffer allocation or memory mapping failed.
    #[error("buffer allocation failed: {0}")]
    BufferAllocation(String),

    /// Reading or writing a device control failed.
    #[error("control error: {0}")]
    Control(String),

    /// Error during a streaming ioctl.
    #[error("stream error: {0}")]
    StreamError(String),

    /// No filled buffer is ready yet. Retried by the capture session.
    #[error("no buffer ready")]
    BufferUnavailable,

    /// Operation is not valid in the current session state.
    #[error("invalid capture state: {0}")]
    InvalidState(&'static str),
}

impl CameraError {
    /// Whether the error is a transient dequeue condition worth retrying.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::BufferUnavailable)
    }
}

/// Errors raised while decoding a compressed frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The compressed stream is malformed.
    #[error("malformed frame: {0}")]
    Malformed(#[from] image::ImageError),

    /// The decoded image does not match the negotiated resolution.
    #[error("decoded frame is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    DimensionMismatch {
        /// Negotiated width.
        expected_width: u32,
        /// Negotiated height.
        expected_height: u32,
        /// Width found in the frame header.
        actual_width: u32,
        /// Height found in the frame header.
        actual_height: u32,
    },
}

/// Errors raised by the display side.
#[derive(Debug, Error)]
pub enum BacklightError {
    /// Could not connect to the display server.
    #[error("can't connect to display: {0}")]
    Connect(#[from] x11rb::errors::ConnectError),

    /// The connection failed while sending a request.
    #[error("display connection error: {0}")]
    Connection(#[from] x11rb::errors::ConnectionError),

    /// The server answered a request with an error.
    #[error("display request failed: {0}")]
    Reply(#[from] x11rb::errors::ReplyError),

    /// The server's RandR extension is older than 1.2.
    #[error("RandR version {major}.{minor} too old")]
    RandrUnsupported {
        /// Reported major version.
        major: u32,
        /// Reported minor version.
        minor: u32,
    },


    /// No output on any screen exposes a backlight property.
    #[error("no outputs have backlight property")]
    NoBacklightCapability,
}

/// Configuration rejected before any device is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Capture width or height is zero.
    #[error("capture size must be non-zero, got {width}x{height}")]
    EmptyFrame {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
}

/// Top-level error.
#[derive(Debug, Error)]
pub enum Error {
    /// Capture device failure.
    #[error(transparent)]
    Camera(#[from] CameraError),

    /// Frame decode failure.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Display or backlight failure.
    #[error(transparent)]
    Backlight(#[from] BacklightError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// I/O error outside the device (frame dump).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
