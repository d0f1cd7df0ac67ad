//! Autolight: drive display backlight from the ambient brightness a camera sees.
//!
//! Frames are captured as MJPEG from a V4L2 device through memory-mapped
//! buffers, decoded to RGB, reduced to one brightness score and written to the
//! backlight property of every RandR output that exposes one. The camera and
//! the display sit behind the [`CameraDevice`] and [`DisplayServer`] traits so
//! the whole loop also runs against mock implementations.

pub mod backlight;
pub mod brightness;
pub mod calibration;
pub mod config;
pub mod control;
pub mod decoder;
pub mod device;
pub mod display;
pub mod error;
pub mod session;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use backlight::{BacklightController, DisplayServer};
pub use brightness::{BrightnessModel, BrightnessSample};
pub use config::Config;
pub use control::{run, ControlLoop};
pub use decoder::{DecodedFrame, FrameDecoder};
pub use device::V4L2Device;
pub use display::XDisplay;
pub use error::{Error, Result};
pub use session::CaptureSession;
pub use traits::{
    CameraDevice, CaptureStream, DeviceCapabilities, ExposureMode, Format, FourCC, FrameMetadata,
};
