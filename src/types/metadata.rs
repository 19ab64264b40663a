//! Session metadata record sent once at the start of a capture session

use serde::{Deserialize, Deserializer, Serialize, de};
use std::fmt;

use super::FrameGeometry;
use crate::{Result, StreamError};

/// Largest accepted edge length for either stream
pub const MAX_DIMENSION: u32 = 16_384;

/// Color stream encoding advertised by the sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColorEncoding {
    /// H.264 Annex-B, decoded by an external process
    H264,
    /// One JPEG per packet, decoded in-process
    Jpeg,
    /// Anything else; color packets are dropped
    Unsupported,
}

impl From<String> for ColorEncoding {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "h264" => ColorEncoding::H264,
            "jpeg" | "jpg" => ColorEncoding::Jpeg,
            _ => ColorEncoding::Unsupported,
        }
    }
}

impl From<ColorEncoding> for String {
    fn from(value: ColorEncoding) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ColorEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ColorEncoding::H264 => "h264",
            ColorEncoding::Jpeg => "jpeg",
            ColorEncoding::Unsupported => "unsupported",
        })
    }
}

/// Parsed session metadata
///
/// Absent fields fall back to the capture app's defaults. Numeric fields also accept JSON
/// floats such as `30.0`; the fraction is truncated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionMetadata {
    pub session_id: String,
    #[serde(deserialize_with = "whole_u32")]
    pub rgb_width: u32,
    #[serde(deserialize_with = "whole_u32")]
    pub rgb_height: u32,
    #[serde(deserialize_with = "whole_u32")]
    pub depth_width: u32,
    #[serde(deserialize_with = "whole_u32")]
    pub depth_height: u32,
    #[serde(deserialize_with = "whole_u32")]
    pub fps: u32,
    /// Bits per second
    #[serde(deserialize_with = "whole_u64")]
    pub rgb_bitrate: u64,
    pub rgb_encoding: ColorEncoding,
}

/// A JSON number as senders write it
#[derive(Deserialize)]
#[serde(untagged)]
enum Number {
    Integer(u64),
    Float(f64),
}

fn whole_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Number::deserialize(deserializer)? {
        Number::Integer(value) => Ok(value),
        Number::Float(value) if value.is_finite() && value >= 0.0 && value < u64::MAX as f64 => {
            Ok(value.trunc() as u64)
        }
        Number::Float(value) => {
            Err(de::Error::custom(format!("expected a non-negative number, got {}", value)))
        }
    }
}

fn whole_u32<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = whole_u64(deserializer)?;
    u32::try_from(value).map_err(|_| de::Error::custom(format!("{} is out of range", value)))
}

impl Default for SessionMetadata {
    fn default() -> Self {
        Self {
            session_id: String::new(),
            rgb_width: 1920,
            rgb_height: 1440,
            depth_width: 256,
            depth_height: 192,
            fps: 30,
            rgb_bitrate: 0,
            rgb_encoding: ColorEncoding::H264,
        }
    }
}

impl SessionMetadata {
    /// Parse a metadata payload (UTF-8 JSON)
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload).map_err(|e| {
            StreamError::protocol("session metadata", format!("payload is not UTF-8: {}", e))
        })?;
        let metadata: SessionMetadata = serde_json::from_str(text).map_err(|e| {
            StreamError::protocol("session metadata", format!("invalid JSON: {}", e))
        })?;
        metadata.validate()?;
        Ok(metadata)
    }

    pub fn validate(&self) -> Result<()> {
        let dimensions = [
            ("rgbWidth", self.rgb_width),
            ("rgbHeight", self.rgb_height),
            ("depthWidth", self.depth_width),
            ("depthHeight", self.depth_height),
        ];
        for (name, value) in dimensions {
            if value == 0 || value > MAX_DIMENSION {
                return Err(StreamError::protocol(
                    "session metadata",
                    format!("{} must be in 1..={}, got {}", name, MAX_DIMENSION, value),
                ));
            }
        }
        if self.fps == 0 {
            return Err(StreamError::protocol("session metadata", "fps must be positive"));
        }
        Ok(())
    }

    pub fn color_geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.rgb_width, self.rgb_height)
    }

    pub fn depth_geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.depth_width, self.depth_height)
    }
}
