//! MJPEG frame decoding into packed RGB.

use std::io::Cursor;

use image::codecs::jpeg::JpegDecoder;
use image::{DynamicImage, ImageDecoder};

use crate::error::DecodeError;
use crate::traits::Format;

/// A decoded frame of packed `R, G, B` triplets, row after row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl DecodedFrame {
    /// Wrap an RGB buffer of `width * height * 3` bytes.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        (pixels.len() == width as usize * height as usize * 3).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Frame width in pixels.
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Packed RGB bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Number of pixels.
    pub const fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Decodes compressed frames of the negotiated size.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    width: u32,
    height: u32,
}

impl FrameDecoder {
    /// Decoder for frames of the negotiated `format`.
    pub const fn new(format: &Format) -> Self {
        Self {
            width: format.width,
            height: format.height,
        }
    }

    /// Decode one JPEG frame.
    ///
    /// The frame header must announce the negotiated size; greyscale frames
    /// are expanded to RGB.
    pub fn decode(&self, compressed: &[u8]) -> Result<DecodedFrame, DecodeError> {
        let decoder = JpegDecoder::new(Cursor::new(compressed))?;

        let (width, height) = decoder.dimensions();
        if (width, height) != (self.width, self.height) {
            return Err(DecodeError::DimensionMismatch {
                expected_width: self.width,
                expected_height: self.height,
                actual_width: width,
                actual_height: height,
            });
        }

        let pixels = DynamicImage::from_decoder(decoder)?.into_rgb8().into_raw();

        Ok(DecodedFrame {
            width,
            height,
            pixels,
        })
    }
}
