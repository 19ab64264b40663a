//! Packet types for the demultiplexed wire stream

use super::StreamKind;

/// Size of the fixed packet header in bytes
pub const HEADER_SIZE: usize = 18;

/// Record kind carried in the first header byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Compressed color video (H.264 Annex-B or a still image)
    Color,
    /// Compressed depth image
    Depth,
    /// UTF-8 JSON session metadata
    Metadata,
    /// A type byte no known variant claims
    Unknown(u8),
}

impl PacketKind {
    pub const COLOR: u8 = 0x01;
    pub const DEPTH: u8 = 0x02;
    pub const METADATA: u8 = 0x03;

    pub fn from_wire(byte: u8) -> Self {
        match byte {
            Self::COLOR => PacketKind::Color,
            Self::DEPTH => PacketKind::Depth,
            Self::METADATA => PacketKind::Metadata,
            other => PacketKind::Unknown(other),
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            PacketKind::Color => Self::COLOR,
            PacketKind::Depth => Self::DEPTH,
            PacketKind::Metadata => Self::METADATA,
            PacketKind::Unknown(byte) => byte,
        }
    }

    /// The published stream this packet kind feeds, if any
    pub fn stream(self) -> Option<StreamKind> {
        match self {
            PacketKind::Color => Some(StreamKind::Color),
            PacketKind::Depth => Some(StreamKind::Depth),
            PacketKind::Metadata | PacketKind::Unknown(_) => None,
        }
    }
}

/// Fixed 18-byte record header
///
/// Layout (little-endian): `type:u8, timestamp:f64, sequence:u32, data_size:u32, keyframe:u8`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketHeader {
    pub kind: PacketKind,
    /// Sender capture time in seconds
    pub timestamp: f64,
    pub sequence: u32,
    /// Payload length following the header
    pub data_size: u32,
    /// Only meaningful for color packets
    pub is_keyframe: bool,
}

/// One demultiplexed protocol record
///
/// Consumed immediately by the session; never retained.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePacket {
    pub kind: PacketKind,
    pub timestamp: f64,
    pub sequence: u32,
    pub payload: Vec<u8>,
    pub is_keyframe: bool,
}

impl FramePacket {
    /// Create a new frame packet
    pub fn new(
        kind: PacketKind,
        timestamp: f64,
        sequence: u32,
        payload: Vec<u8>,
        is_keyframe: bool,
    ) -> Self {
        Self { kind, timestamp, sequence, payload, is_keyframe }
    }

    /// Rebuild a packet from its parsed header and payload
    pub fn from_parts(header: PacketHeader, payload: Vec<u8>) -> Self {
        Self {
            kind: header.kind,
            timestamp: header.timestamp,
            sequence: header.sequence,
            payload,
            is_keyframe: header.is_keyframe,
        }
    }

    /// Header describing this packet
    ///
    /// Payloads larger than `u32::MAX` cannot be framed; the size saturates.
    pub fn header(&self) -> PacketHeader {
        PacketHeader {
            kind: self.kind,
            timestamp: self.timestamp,
            sequence: self.sequence,
            data_size: u32::try_from(self.payload.len()).unwrap_or(u32::MAX),
            is_keyframe: self.is_keyframe,
        }
    }
}
