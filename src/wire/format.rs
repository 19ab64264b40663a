//! Packet header layout and parsing
//!
//! Every record on the wire is an 18-byte header followed by `data_size` payload bytes:
//!
//! ```text
//! offset  size  field
//!      0     1  type         1 = color, 2 = depth, 3 = metadata
//!      1     8  timestamp    f64 seconds
//!      9     4  sequence     u32
//!     13     4  data_size    u32 payload length
//!     17     1  is_keyframe  0 or 1
//! ```
//!
//! All numeric fields are little-endian to match the fixed sender.

use crate::types::{FramePacket, HEADER_SIZE, PacketHeader, PacketKind};
use crate::{Result, StreamError};
use tracing::trace;

const KIND_OFFSET: usize = 0;
const TIMESTAMP_OFFSET: usize = 1;
const SEQUENCE_OFFSET: usize = 9;
const DATA_SIZE_OFFSET: usize = 13;
const KEYFRAME_OFFSET: usize = 17;

/// Default ceiling on a single payload
pub const DEFAULT_MAX_PAYLOAD: u32 = 64 * 1024 * 1024;

impl PacketHeader {
    /// Size of the header structure in bytes
    pub const SIZE: usize = HEADER_SIZE;

    /// Parse a header from its wire bytes
    ///
    /// Rejects keyframe flags other than 0 or 1 so that every accepted header
    /// re-encodes to the exact bytes it was parsed from.
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        let kind = PacketKind::from_wire(bytes[KIND_OFFSET]);
        let timestamp = parse_f64_le(bytes, TIMESTAMP_OFFSET)?;
        let sequence = parse_u32_le(bytes, SEQUENCE_OFFSET)?;
        let data_size = parse_u32_le(bytes, DATA_SIZE_OFFSET)?;
        let is_keyframe = match bytes[KEYFRAME_OFFSET] {
            0 => false,
            1 => true,
            other => {
                return Err(StreamError::protocol(
                    "packet header",
                    format!("malformed header: keyframe flag {:#04x} is not 0 or 1", other),
                ));
            }
        };

        trace!(?kind, sequence, data_size, is_keyframe, "Parsed packet header");

        Ok(Self { kind, timestamp, sequence, data_size, is_keyframe })
    }

    /// Serialize to wire bytes
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[KIND_OFFSET] = self.kind.to_wire();
        bytes[TIMESTAMP_OFFSET..SEQUENCE_OFFSET].copy_from_slice(&self.timestamp.to_le_bytes());
        bytes[SEQUENCE_OFFSET..DATA_SIZE_OFFSET].copy_from_slice(&self.sequence.to_le_bytes());
        bytes[DATA_SIZE_OFFSET..KEYFRAME_OFFSET].copy_from_slice(&self.data_size.to_le_bytes());
        bytes[KEYFRAME_OFFSET] = u8::from(self.is_keyframe);
        bytes
    }

    /// Check the announced payload size against the configured ceiling
    pub fn validate(&self, max_payload: u32) -> Result<()> {
        if self.data_size > max_payload {
            return Err(StreamError::protocol(
                "packet header",
                format!(
                    "payload of {} bytes exceeds limit of {} bytes (sequence {})",
                    self.data_size, max_payload, self.sequence
                ),
            ));
        }
        Ok(())
    }
}

impl FramePacket {
    /// Serialize header and payload as one wire record
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        bytes.extend_from_slice(&self.header().encode());
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

/// Safe byte parsing helpers with bounds checking
fn parse_u32_le(data: &[u8], offset: usize) -> Result<u32> {
    let bytes = data.get(offset..offset + 4).ok_or_else(|| {
        StreamError::protocol(
            "integer parsing",
            format!(
                "insufficient data for u32 at offset {} (need 4 bytes, have {})",
                offset,
                data.len().saturating_sub(offset)
            ),
        )
    })?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn parse_f64_le(data: &[u8], offset: usize) -> Result<f64> {
    let bytes = data.get(offset..offset + 8).ok_or_else(|| {
        StreamError::protocol(
            "double precision float parsing",
            format!(
                "insufficient data for f64 at offset {} (need 8 bytes, have {})",
                offset,
                data.len().saturating_sub(offset)
            ),
        )
    })?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Ok(f64::from_le_bytes(raw))
}
