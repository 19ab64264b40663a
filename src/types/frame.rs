//! Decoded frame types shared by the color and depth paths

use std::fmt;

use crate::{Result, StreamError};

/// The two published streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Color,
    Depth,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Color => "color",
            StreamKind::Depth => "depth",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pixel layout of a decoded frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 24-bit packed blue, green, red
    Bgr24,
    /// 8-bit grayscale
    Gray8,
    /// 16-bit grayscale, little-endian samples
    Gray16Le,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgr24 => 3,
            PixelFormat::Gray8 => 1,
            PixelFormat::Gray16Le => 2,
        }
    }
}

/// Width and height of the raw frames a decode pipeline produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Bytes in one raw BGR24 frame
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * PixelFormat::Bgr24.bytes_per_pixel()
    }
}

impl fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A fully decoded 2-D pixel buffer
///
/// Immutable once built, so a shared frame can never be observed half-written.
#[derive(Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    timestamp: Option<f64>,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap a pixel buffer, checking its length against the dimensions
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(StreamError::codec(
                "frame",
                format!(
                    "{:?} buffer for {}x{} needs {} bytes, got {}",
                    format,
                    width,
                    height,
                    expected,
                    data.len()
                ),
            ));
        }
        Ok(Self { width, height, format, timestamp: None, data })
    }

    /// Attach the sender capture time
    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn timestamp(&self) -> Option<f64> {
        self.timestamp
    }

    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.width, self.height)
    }

    /// Raw pixel bytes, row-major
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("timestamp", &self.timestamp)
            .field("bytes", &self.data.len())
            .finish()
    }
}
