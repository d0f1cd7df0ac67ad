//! Perceptual brightness of a decoded frame.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::decoder::DecodedFrame;

/// Weighting applied to each RGB pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrightnessModel {
    /// ITU-R BT.709 luma: `0.2126 R + 0.7152 G + 0.0722 B`.
    #[default]
    Std,
    /// ITU-R BT.601 luma: `0.299 R + 0.587 G + 0.114 B`.
    Opt1,
    /// Quadratic BT.601: `sqrt(0.299 R² + 0.587 G² + 0.114 B²)`.
    Opt2,
}

impl BrightnessModel {
    /// Brightness of one pixel, in `0.0..=255.0`.
    pub fn weigh(self, r: u8, g: u8, b: u8) -> f64 {
        let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
        match self {
            Self::Std => 0.0722f64.mul_add(b, 0.2126f64.mul_add(r, 0.7152 * g)),
            Self::Opt1 => 0.114f64.mul_add(b, 0.299f64.mul_add(r, 0.587 * g)),
            Self::Opt2 => 0.114f64
                .mul_add(b * b, 0.299f64.mul_add(r * r, 0.587 * g * g))
                .sqrt(),
        }
    }
}

impl fmt::Display for BrightnessModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Std => "STD",
            Self::Opt1 => "OPT1",
            Self::Opt2 => "OPT2",
        })
    }
}

/// Unrecognised brightness model name.
#[derive(Debug, Error)]
#[error("unknown brightness model '{0}', expected STD, OPT1 or OPT2")]
pub struct UnknownModel(String);

impl FromStr for BrightnessModel {
    type Err = UnknownModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STD" => Ok(Self::Std),
            "OPT1" => Ok(Self::Opt1),
            "OPT2" => Ok(Self::Opt2),
            _ => Err(UnknownModel(s.to_owned())),
        }
    }
}

/// Frame brightness normalised to `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct BrightnessSample(f64);

impl BrightnessSample {
    /// Sample from a raw value, clamped into `0.0..=1.0`.
    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    /// Normalised value.
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Value on a 0-100 integer scale, rounded to nearest.
    pub fn percent(self) -> u8 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let percent = (self.0 * 100.0).round() as u8;
        percent
    }
}

/// Average brightness of packed RGB `pixels` under `model`.
///
/// An empty buffer scores zero. Trailing bytes that do not form a full pixel
/// are ignored.
pub fn score_rgb(pixels: &[u8], model: BrightnessModel) -> BrightnessSample {
    let count = pixels.len() / 3;
    if count == 0 {
        return BrightnessSample::new(0.0);
    }

    let total: f64 = pixels
        .chunks_exact(3)
        .map(|pixel| match *pixel {
            [r, g, b] => model.weigh(r, g, b),
            _ => 0.0,
        })
        .sum();

    #[allow(clippy::cast_precision_loss)]
    let count = count as f64;
    BrightnessSample::new(total / count / 255.0)
}

/// Average brightness of a decoded frame under `model`.
pub fn score(frame: &DecodedFrame, model: BrightnessModel) -> BrightnessSample {
    score_rgb(frame.pixels(), model)
}
