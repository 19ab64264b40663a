//! Still-image color frames, decoded in-process one packet at a time

use image::imageops::{self, FilterType};

use crate::types::{Frame, FrameGeometry, PixelFormat};
use crate::{Result, StreamError};

/// Decode one still-image color payload into a BGR24 frame
///
/// When `target` is given and differs from the decoded size, the image is resized to it.
pub fn decode_still(payload: &[u8], target: Option<FrameGeometry>) -> Result<Frame> {
    let image =
        image::load_from_memory(payload).map_err(|e| StreamError::codec("color", e.to_string()))?;
    let mut rgb = image.to_rgb8();

    if let Some(target) = target {
        if rgb.dimensions() != (target.width, target.height) {
            rgb = imageops::resize(&rgb, target.width, target.height, FilterType::Triangle);
        }
    }

    let (width, height) = rgb.dimensions();
    let mut data = rgb.into_raw();
    for pixel in data.chunks_exact_mut(3) {
        pixel.swap(0, 2);
    }
    Frame::new(width, height, PixelFormat::Bgr24, data)
}
