//! Depth normalization.
//!
//! Every wire encoding is first brought to canonical millimeters ([`DepthImage`]), the one
//! representation the rest of the crate reasons about. Publishing then either keeps the
//! canonical 16-bit samples or maps them onto an 8-bit grayscale ramp with [`DepthRange`].
//!
//! ```rust
//! use depthwire::depth::DepthRange;
//!
//! let range = DepthRange::new(0.3, 5.0, false).unwrap();
//! assert_eq!(range.normalize_sample(2500), 119);
//! assert_eq!(range.normalize_sample(0), 0);
//! ```

mod decode;

pub use decode::{
    DepthImage, INVALID_DEPTH_MM, LEGACY_8BIT_SCALE, decode_depth, meters_to_millimeters,
    to_millimeters,
};

use serde::{Deserialize, Serialize};

use crate::types::{Frame, PixelFormat};
use crate::{Result, StreamError};

/// Clipping window for the 8-bit depth ramp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthRange {
    min_m: f64,
    max_m: f64,
    invert: bool,
}

impl DepthRange {
    /// Build a range in meters
    ///
    /// Both bounds must be finite, `min_m` non-negative and `max_m` strictly greater.
    pub fn new(min_m: f64, max_m: f64, invert: bool) -> Result<Self> {
        if !min_m.is_finite() || !max_m.is_finite() {
            return Err(StreamError::config(format!(
                "depth range bounds must be finite (min {}, max {})",
                min_m, max_m
            )));
        }
        if min_m < 0.0 {
            return Err(StreamError::config(format!("depth min must be >= 0, got {}", min_m)));
        }
        if max_m <= min_m {
            return Err(StreamError::config(format!(
                "depth max ({}) must be greater than depth min ({})",
                max_m, min_m
            )));
        }
        Ok(Self { min_m, max_m, invert })
    }

    pub fn min_m(&self) -> f64 {
        self.min_m
    }

    pub fn max_m(&self) -> f64 {
        self.max_m
    }

    pub fn invert(&self) -> bool {
        self.invert
    }

    /// Map one canonical sample onto `0..=255`
    ///
    /// The invalid sentinel always maps to 0.
    pub fn normalize_sample(&self, millimeters: u16) -> u8 {
        if millimeters == INVALID_DEPTH_MM {
            return 0;
        }
        let meters = f64::from(millimeters) / 1000.0;
        let mut scaled = ((meters - self.min_m) / (self.max_m - self.min_m)).clamp(0.0, 1.0);
        if self.invert {
            scaled = 1.0 - scaled;
        }
        (scaled * 255.0).round() as u8
    }

    /// Map a whole depth image onto an 8-bit grayscale frame
    pub fn normalize(&self, depth: &DepthImage) -> Result<Frame> {
        let data = depth.millimeters().iter().map(|&mm| self.normalize_sample(mm)).collect();
        Frame::new(depth.width(), depth.height(), PixelFormat::Gray8, data)
    }
}

/// What the depth stream publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthOutput {
    /// 8-bit grayscale clipped to the configured range
    #[default]
    Normalized,
    /// Canonical 16-bit millimeters
    Millimeters,
}

impl DepthOutput {
    pub fn pixel_format(self) -> PixelFormat {
        match self {
            DepthOutput::Normalized => PixelFormat::Gray8,
            DepthOutput::Millimeters => PixelFormat::Gray16Le,
        }
    }
}

/// Full depth path: decode, canonicalize, render
#[derive(Debug, Clone, Copy)]
pub struct DepthNormalizer {
    range: DepthRange,
    output: DepthOutput,
}

impl DepthNormalizer {
    pub fn new(range: DepthRange, output: DepthOutput) -> Self {
        Self { range, output }
    }

    pub fn range(&self) -> DepthRange {
        self.range
    }

    pub fn output(&self) -> DepthOutput {
        self.output
    }

    /// Decode a depth payload into the configured output frame
    pub fn process(&self, payload: &[u8], timestamp: f64) -> Result<Frame> {
        let depth = decode_depth(payload)?;
        self.render(&depth).map(|frame| frame.with_timestamp(timestamp))
    }

    pub fn render(&self, depth: &DepthImage) -> Result<Frame> {
        match self.output {
            DepthOutput::Normalized => self.range.normalize(depth),
            DepthOutput::Millimeters => depth.to_frame(),
        }
    }
}
