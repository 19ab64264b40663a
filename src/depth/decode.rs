//! Depth payload decoding into canonical millimeters

use image::{DynamicImage, ImageBuffer, Pixel};
use tracing::trace;

use crate::types::{Frame, PixelFormat};
use crate::{Result, StreamError};

/// Canonical value for "no return"
pub const INVALID_DEPTH_MM: u16 = 0;

/// Up-scale applied to legacy 8-bit depth so 255 lands on 65535
pub const LEGACY_8BIT_SCALE: u16 = 257;

/// A depth map in canonical form: one `u16` millimeter sample per pixel, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthImage {
    width: u32,
    height: u32,
    millimeters: Vec<u16>,
}

impl DepthImage {
    pub fn new(width: u32, height: u32, millimeters: Vec<u16>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if millimeters.len() != expected {
            return Err(StreamError::codec(
                "depth",
                format!(
                    "{}x{} depth map needs {} samples, got {}",
                    width,
                    height,
                    expected,
                    millimeters.len()
                ),
            ));
        }
        Ok(Self { width, height, millimeters })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn millimeters(&self) -> &[u16] {
        &self.millimeters
    }

    /// Sample at `(x, y)`, or `None` outside the image
    pub fn get(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.millimeters.get(y as usize * self.width as usize + x as usize).copied()
    }

    /// Canonical samples as a little-endian 16-bit grayscale frame
    pub fn to_frame(&self) -> Result<Frame> {
        let data = self.millimeters.iter().flat_map(|mm| mm.to_le_bytes()).collect();
        Frame::new(self.width, self.height, PixelFormat::Gray16Le, data)
    }
}

/// Decode a compressed depth payload (any lossless still-image codec the `image` crate reads)
pub fn decode_depth(payload: &[u8]) -> Result<DepthImage> {
    let image = image::load_from_memory(payload)
        .map_err(|e| StreamError::codec("depth", e.to_string()))?;
    trace!(
        color = ?image.color(),
        width = image.width(),
        height = image.height(),
        "Decoded depth image"
    );
    to_millimeters(&image)
}

/// Convert a decoded image to canonical millimeters
///
/// Multi-channel sources contribute their first channel only.
/// - 16-bit: passthrough
/// - 32-bit float: meters, scaled by 1000 and clamped to `u16`
/// - 8-bit: scaled by [`LEGACY_8BIT_SCALE`]
pub fn to_millimeters(image: &DynamicImage) -> Result<DepthImage> {
    let (width, height) = (image.width(), image.height());
    let millimeters = match image {
        DynamicImage::ImageLuma8(buffer) => first_channel(buffer, legacy_to_millimeters),
        DynamicImage::ImageLumaA8(buffer) => first_channel(buffer, legacy_to_millimeters),
        DynamicImage::ImageRgb8(buffer) => first_channel(buffer, legacy_to_millimeters),
        DynamicImage::ImageRgba8(buffer) => first_channel(buffer, legacy_to_millimeters),
        DynamicImage::ImageLuma16(buffer) => first_channel(buffer, |mm| mm),
        DynamicImage::ImageLumaA16(buffer) => first_channel(buffer, |mm| mm),
        DynamicImage::ImageRgb16(buffer) => first_channel(buffer, |mm| mm),
        DynamicImage::ImageRgba16(buffer) => first_channel(buffer, |mm| mm),
        DynamicImage::ImageRgb32F(buffer) => first_channel(buffer, meters_to_millimeters),
        DynamicImage::ImageRgba32F(buffer) => first_channel(buffer, meters_to_millimeters),
        other => {
            let sample_type = format!("{:?}", other.color());
            return Err(StreamError::UnsupportedDepth { sample_type });
        }
    };
    DepthImage::new(width, height, millimeters)
}

/// Float meters to millimeters; non-finite and non-positive samples are invalid
pub fn meters_to_millimeters(meters: f32) -> u16 {
    if !meters.is_finite() || meters <= 0.0 {
        return INVALID_DEPTH_MM;
    }
    (meters * 1000.0).round().clamp(0.0, u16::MAX as f32) as u16
}

fn legacy_to_millimeters(value: u8) -> u16 {
    u16::from(value) * LEGACY_8BIT_SCALE
}

fn first_channel<P, F>(buffer: &ImageBuffer<P, Vec<P::Subpixel>>, convert: F) -> Vec<u16>
where
    P: Pixel,
    F: Fn(P::Subpixel) -> u16,
{
    buffer.as_raw().chunks_exact(P::CHANNEL_COUNT as usize).map(|pixel| convert(pixel[0])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Luma, LumaA, Rgb};
    use std::io::Cursor;

    fn encode_png(image: DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    #[test]
    fn sixteen_bit_png_passes_through() {
        let buffer = ImageBuffer::<Luma<u16>, _>::from_raw(2, 1, vec![0u16, 2500]).unwrap();
        let depth = decode_depth(&encode_png(DynamicImage::ImageLuma16(buffer))).unwrap();

        assert_eq!(depth.width(), 2);
        assert_eq!(depth.millimeters(), &[0, 2500]);
        assert_eq!(depth.get(1, 0), Some(2500));
        assert_eq!(depth.get(2, 0), None);
    }

    #[test]
    fn eight_bit_png_is_upscaled() {
        let buffer = ImageBuffer::<Luma<u8>, _>::from_raw(3, 1, vec![0u8, 1, 255]).unwrap();
        let depth = decode_depth(&encode_png(DynamicImage::ImageLuma8(buffer))).unwrap();
        assert_eq!(depth.millimeters(), &[0, 257, 65535]);
    }

    #[test]
    fn float_meters_scale_to_millimeters() {
        let buffer =
            ImageBuffer::<Rgb<f32>, _>::from_raw(2, 1, vec![2.5, 9.0, 9.0, 0.3, 0.0, 0.0]).unwrap();
        let depth = to_millimeters(&DynamicImage::ImageRgb32F(buffer)).unwrap();
        assert_eq!(depth.millimeters(), &[2500, 300]);
    }

    #[test]
    fn float_edge_values() {
        assert_eq!(meters_to_millimeters(f32::NAN), INVALID_DEPTH_MM);
        assert_eq!(meters_to_millimeters(f32::INFINITY), INVALID_DEPTH_MM);
        assert_eq!(meters_to_millimeters(-1.0), INVALID_DEPTH_MM);
        assert_eq!(meters_to_millimeters(0.0), INVALID_DEPTH_MM);
        assert_eq!(meters_to_millimeters(100.0), u16::MAX);
        assert_eq!(meters_to_millimeters(65.535), 65535);
    }

    #[test]
    fn multi_channel_sources_use_first_channel() {
        let buffer = ImageBuffer::<LumaA<u16>, _>::from_raw(2, 1, vec![10u16, 99, 20, 99]).unwrap();
        let depth = to_millimeters(&DynamicImage::ImageLumaA16(buffer)).unwrap();
        assert_eq!(depth.millimeters(), &[10, 20]);

        let buffer = ImageBuffer::<Rgb<u8>, _>::from_raw(1, 1, vec![2u8, 200, 200]).unwrap();
        let depth = to_millimeters(&DynamicImage::ImageRgb8(buffer)).unwrap();
        assert_eq!(depth.millimeters(), &[514]);
    }

    #[test]
    fn garbage_payload_is_codec_error() {
        assert!(matches!(decode_depth(b"not an image"), Err(StreamError::Codec { .. })));
    }

    #[test]
    fn canonical_frame_is_little_endian() {
        let depth = DepthImage::new(2, 1, vec![0x0102, 0xA0B0]).unwrap();
        let frame = depth.to_frame().unwrap();
        assert_eq!(frame.format(), PixelFormat::Gray16Le);
        assert_eq!(frame.data(), &[0x02, 0x01, 0xB0, 0xA0]);
        assert!(DepthImage::new(2, 2, vec![0; 3]).is_err());
    }
}
