//! Mock camera and display implementations for testing without hardware.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use x11rb::errors::{ConnectionError, ReplyError};

use crate::backlight::{Atom, DisplayServer, OutputId, PropertyInfo, RootWindow};
use crate::error::BacklightError;
use crate::traits::{
    CameraDevice, CameraError, CaptureStream, DeviceCapabilities, ExposureMode, Format, FourCC,
    FrameMetadata, Result,
};

/// Encode a solid-colour RGB frame as JPEG.
pub fn solid_jpeg(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let pixels: Vec<u8> = rgb
        .iter()
        .copied()
        .cycle()
        .take(width as usize * height as usize * 3)
        .collect();

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 95)
        .encode(&pixels, width, height, ExtendedColorType::Rgb8)
        .expect("encoding a solid frame should succeed");
    out
}

/// What the mock driver does on the next dequeue.
#[derive(Debug, Clone)]
pub enum MockEvent {
    /// Fill the buffer with these bytes.
    Frame(Vec<u8>),
    /// Fill the buffer with these bytes but report more as used.
    Overfilled(Vec<u8>, u32),
    /// Fill the buffer but flag it erroneous.
    Corrupted,
    /// Nothing ready yet.
    Unavailable,
    /// Unrecoverable ioctl failure.
    Fail,
}

/// Mock device for testing without hardware.
pub struct MockDevice {
    capabilities: DeviceCapabilities,
    format: Format,
    granted_size: Option<(u32, u32)>,
    substituted_fourcc: Option<FourCC>,
    reject_format: bool,
    exposure: Option<ExposureMode>,
    accepted_exposure: Vec<ExposureMode>,
    exposure_writes: Vec<ExposureMode>,
    events: VecDeque<MockEvent>,
    default_fill: [u8; 3],
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Create a new mock device with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: "mock:0".to_owned(),
                can_capture: true,
                can_stream: true,
            },
            format: Format::new(640, 480, FourCC::YUYV),
            granted_size: None,
            substituted_fourcc: None,
            reject_format: false,
            exposure: Some(ExposureMode::Manual),
            accepted_exposure: ExposureMode::AUTO_PRIORITY.to_vec(),
            exposure_writes: Vec::new(),
            events: VecDeque::new(),
            default_fill: [128, 128, 128],
        }
    }

    /// Grant this size whatever is requested.
    #[must_use]
    pub const fn with_granted_size(mut self, width: u32, height: u32) -> Self {
        self.granted_size = Some((width, height));
        self
    }

    /// Answer format requests with a different pixel format.
    #[must_use]
    pub const fn with_substituted_fourcc(mut self, fourcc: FourCC) -> Self {
        self.substituted_fourcc = Some(fourcc);
        self
    }

    /// Fail every format request.
    #[must_use]
    pub const fn rejecting_format(mut self) -> Self {
        self.reject_format = true;
        self
    }

    /// Current exposure mode, `None` for a device without the control.
    #[must_use]
    pub const fn with_exposure(mut self, exposure: Option<ExposureMode>) -> Self {
        self.exposure = exposure;
        self
    }

    /// Exposure modes the device accepts.
    #[must_use]
    pub fn accepting_exposure(mut self, modes: &[ExposureMode]) -> Self {
        self.accepted_exposure = modes.to_vec();
        self
    }

    /// Script the next dequeues. Once exhausted, frames of `default_fill` follow.
    #[must_use]
    pub fn with_events(mut self, events: Vec<MockEvent>) -> Self {
        self.events = events.into();
        self
    }

    /// Colour of frames produced once scripted events run out.
    #[must_use]
    pub const fn with_default_fill(mut self, rgb: [u8; 3]) -> Self {
        self.default_fill = rgb;
        self
    }

    /// Every exposure mode written so far, accepted or not.
    pub fn exposure_writes(&self) -> &[ExposureMode] {
        &self.exposure_writes
    }
}

impl CameraDevice for MockDevice {
    type Stream<'a> = MockStream<'a>;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        if self.reject_format {
            return Err(CameraError::FormatUnsupported {
                requested: format.fourcc,
                reason: "Invalid argument".to_owned(),
            });
        }

        let (width, height) = self.granted_size.unwrap_or((format.width, format.height));
        let fourcc = self.substituted_fourcc.unwrap_or(format.fourcc);
        self.format = Format::new(width, height, fourcc);
        Ok(self.format)
    }

    fn exposure_mode(&self) -> Result<Option<ExposureMode>> {
        Ok(self.exposure)
    }

    fn set_exposure_mode(&mut self, mode: ExposureMode) -> Result<()> {
        self.exposure_writes.push(mode);
        if self.accepted_exposure.contains(&mode) {
            self.exposure = Some(mode);
            Ok(())
        } else {
            Err(CameraError::Control("Invalid argument".to_owned()))
        }
    }

    fn create_stream(&mut self, buffer_count: u32) -> Result<Self::Stream<'_>> {
        let default_frame = solid_jpeg(self.format.width, self.format.height, self.default_fill);
        Ok(MockStream {
            buffers: vec![Vec::new(); buffer_count as usize],
            queued: VecDeque::new(),
            streaming: false,
            sequence: 0,
            default_frame,
            device: self,
        })
    }
}

/// Mock capture stream enforcing the kernel queue rules.
pub struct MockStream<'a> {
    device: &'a mut MockDevice,
    buffers: Vec<Vec<u8>>,
    queued: VecDeque<usize>,
    streaming: bool,
    sequence: u32,
    default_frame: Vec<u8>,
}

impl CaptureStream for MockStream<'_> {
    fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    fn queue(&mut self, index: usize) -> Result<()> {
        if index >= self.buffers.len() {
            return Err(CameraError::InvalidState("queued unknown buffer"));
        }
        if self.queued.contains(&index) {
            return Err(CameraError::InvalidState("buffer queued twice"));
        }
        self.queued.push_back(index);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.streaming = true;
        Ok(())
    }

    fn dequeue(&mut self) -> Result<FrameMetadata> {
        if !self.streaming {
            return Err(CameraError::StreamError("stream is off".to_owned()));
        }
        let index = self
            .queued
            .pop_front()
            .ok_or_else(|| CameraError::StreamError("no buffer queued".to_owned()))?;

        let event = self
            .device
            .events
            .pop_front()
            .unwrap_or_else(|| MockEvent::Frame(self.default_frame.clone()));

        let (data, reported, corrupted) = match event {
            MockEvent::Unavailable => {
                self.queued.push_front(index);
                return Err(CameraError::BufferUnavailable);
            }
            MockEvent::Fail => {
                self.queued.push_front(index);
                return Err(CameraError::StreamError("Input/output error".to_owned()));
            }
            MockEvent::Corrupted => (vec![0xde, 0xad], None, true),
            MockEvent::Frame(data) => (data, None, false),
            MockEvent::Overfilled(data, used) => (data, Some(used), false),
        };

        let seq = self.sequence;
        self.sequence += 1;

        let bytes_used =
            reported.unwrap_or_else(|| u32::try_from(data.len()).expect("mock frame fits in u32"));
        let length = data.len();
        if let Some(buffer) = self.buffers.get_mut(index) {
            *buffer = data;
        }

        Ok(FrameMetadata {
            index,
            sequence: seq,
            timestamp: Duration::from_millis(u64::from(seq) * 33), // ~30fps
            bytes_used,
            length,
            corrupted,
        })
    }

    fn buffer(&self, index: usize) -> Option<&[u8]> {
        self.buffers.get(index).map(Vec::as_slice)
    }

    fn stop(&mut self) -> Result<()> {
        self.streaming = false;
        self.queued.clear();
        Ok(())
    }
}

/// One property on a mock output.
#[derive(Debug, Clone)]
pub struct MockProperty {
    /// Current value, `None` when the property holds something other than one INTEGER.
    pub value: Option<i32>,
    /// Whether the valid values describe a range.
    pub range: bool,
    /// Advertised valid values.
    pub valid_values: Vec<i32>,
    /// Reject writes.
    pub read_only: bool,
}

impl MockProperty {
    /// Adjustable property over `[min, max]`.
    #[must_use]
    pub fn ranged(value: i32, min: i32, max: i32) -> Self {
        Self {
            value: Some(value),
            range: true,
            valid_values: vec![min, max],
            read_only: false,
        }
    }
}

/// Mock output with its properties keyed by atom.
#[derive(Debug, Clone)]
pub struct MockOutput {
    id: OutputId,
    properties: HashMap<Atom, MockProperty>,
}

impl MockOutput {
    /// Output without properties.
    #[must_use]
    pub fn new(id: OutputId) -> Self {
        Self {
            id,
            properties: HashMap::new(),
        }
    }

    /// Attach `property` under `atom`.
    #[must_use]
    pub fn with_property(mut self, atom: Atom, property: MockProperty) -> Self {
        self.properties.insert(atom, property);
        self
    }
}

/// Error the mock server answers refused requests with.
fn request_failed() -> BacklightError {
    BacklightError::Reply(ReplyError::ConnectionError(ConnectionError::UnknownError))
}

/// Atom the mock server assigns to the preferred backlight property name.
pub const BACKLIGHT_ATOM: Atom = 100;
/// Atom the mock server assigns to the legacy backlight property name.
pub const LEGACY_ATOM: Atom = 101;

/// Mock display server holding screens of outputs.
#[derive(Debug, Default)]
pub struct MockDisplay {
    atoms: HashMap<String, Atom>,
    screens: RefCell<Vec<Vec<MockOutput>>>,
    broken_screens: Vec<usize>,
    writes: RefCell<Vec<(OutputId, Atom, i32)>>,
    syncs: Cell<usize>,
}

impl MockDisplay {
    /// Server that knows both backlight property names.
    #[must_use]
    pub fn new() -> Self {
        let atoms = HashMap::from([
            (crate::backlight::BACKLIGHT_PROPERTY.to_owned(), BACKLIGHT_ATOM),
            (crate::backlight::LEGACY_BACKLIGHT_PROPERTY.to_owned(), LEGACY_ATOM),
        ]);
        Self {
            atoms,
            ..Self::default()
        }
    }

    /// Server that has never interned the named atom.
    #[must_use]
    pub fn without_atom(mut self, name: &str) -> Self {
        self.atoms.remove(name);
        self
    }

    /// Add a screen with the given outputs.
    #[must_use]
    pub fn with_screen(self, outputs: Vec<MockOutput>) -> Self {
        self.screens.borrow_mut().push(outputs);
        self
    }

    /// Make resource queries on the screen at `index` fail.
    #[must_use]
    pub fn with_broken_screen(mut self, index: usize) -> Self {
        self.broken_screens.push(index);
        self
    }

    /// Every accepted property write in order.
    pub fn writes(&self) -> Vec<(OutputId, Atom, i32)> {
        self.writes.borrow().clone()
    }

    /// Number of sync round trips.
    pub fn syncs(&self) -> usize {
        self.syncs.get()
    }

    fn with_property<T, F>(&self, output: OutputId, property: Atom, f: F) -> Option<T>
    where
        F: FnOnce(&mut MockProperty) -> T,
    {
        let mut screens = self.screens.borrow_mut();
        screens
            .iter_mut()
            .flatten()
            .find(|candidate| candidate.id == output)
            .and_then(|found| found.properties.get_mut(&property))
            .map(f)
    }
}

impl DisplayServer for MockDisplay {
    fn intern_atom(&self, name: &str) -> std::result::Result<Option<Atom>, BacklightError> {
        Ok(self.atoms.get(name).copied())
    }

    fn roots(&self) -> Vec<RootWindow> {
        (0..self.screens.borrow().len())
            .map(|index| u32::try_from(index).expect("few screens"))
            .collect()
    }

    fn outputs(&self, root: RootWindow) -> std::result::Result<Vec<OutputId>, BacklightError> {
        let index = root as usize;
        if self.broken_screens.contains(&index) {
            return Err(request_failed());
        }
        Ok(self
            .screens
            .borrow()
            .get(index)
            .map(|outputs| outputs.iter().map(|output| output.id).collect())
            .unwrap_or_default())
    }

    fn output_property(
        &self,
        output: OutputId,
        property: Atom,
    ) -> std::result::Result<Option<i32>, BacklightError> {
        Ok(self
            .with_property(output, property, |prop| prop.value)
            .flatten())
    }

    fn query_property(
        &self,
        output: OutputId,
        property: Atom,
    ) -> std::result::Result<PropertyInfo, BacklightError> {
        self.with_property(output, property, |prop| PropertyInfo {
            range: prop.range,
            valid_values: prop.valid_values.clone(),
        })
        .ok_or_else(request_failed)
    }

    fn change_property(
        &self,
        output: OutputId,
        property: Atom,
        value: i32,
    ) -> std::result::Result<(), BacklightError> {
        let accepted = self
            .with_property(output, property, |prop| {
                if prop.read_only {
                    false
                } else {
                    prop.value = Some(value);
                    true
                }
            })
            .unwrap_or(false);

        if !accepted {
            return Err(request_failed());
        }
        self.writes.borrow_mut().push((output, property, value));
        Ok(())
    }

    fn sync(&self) -> std::result::Result<(), BacklightError> {
        self.syncs.set(self.syncs.get() + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_creation() {
        let device = MockDevice::new();
        assert_eq!(device.capabilities().driver, "mock");
        assert!(device.capabilities().can_capture);
        assert!(device.capabilities().can_stream);
    }

    #[test]
    fn test_mock_stream_rejects_double_queue() {
        let mut device = MockDevice::new();
        let mut stream = device.create_stream(2).expect("create_stream should succeed");
        stream.queue(0).expect("first queue");
        assert!(matches!(
            stream.queue(0),
            Err(CameraError::InvalidState(_))
        ));
    }

    #[test]
    fn test_mock_stream_requires_stream_on() {
        let mut device = MockDevice::new();
        let mut stream = device.create_stream(2).expect("create_stream should succeed");
        stream.queue(0).expect("queue");
        assert!(stream.dequeue().is_err());
    }

    #[test]
    fn test_solid_jpeg_has_markers() {
        let data = solid_jpeg(16, 16, [255, 0, 0]);
        assert_eq!(data.get(..2), Some([0xff, 0xd8].as_slice()));
        assert_eq!(data.get(data.len() - 2..), Some([0xff, 0xd9].as_slice()));
    }
}
