//! Exact-length packet reader over any async byte stream

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use super::format::DEFAULT_MAX_PAYLOAD;
use crate::types::{FramePacket, HEADER_SIZE, PacketHeader};
use crate::{Result, StreamError};

/// Reads framed packets: exactly 18 header bytes, then exactly `data_size` payload bytes.
///
/// The reader never resynchronizes. Any short read ends the stream.
pub struct PacketReader<R> {
    inner: R,
    max_payload: u32,
    packets: u64,
}

impl<R> PacketReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(inner: R) -> Self {
        Self { inner, max_payload: DEFAULT_MAX_PAYLOAD, packets: 0 }
    }

    /// Override the per-packet payload ceiling
    pub fn with_max_payload(mut self, max_payload: u32) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Read the next packet
    ///
    /// Returns:
    /// - `Ok(Some(packet))` - a complete record was read
    /// - `Ok(None)` - the peer closed the connection, possibly mid-record
    /// - `Err(e)` - malformed header or an I/O failure other than disconnect
    pub async fn read_packet(&mut self) -> Result<Option<FramePacket>> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        if !self.fill(&mut header_bytes, "packet header").await? {
            debug!(packets = self.packets, "Connection closed while reading header");
            return Ok(None);
        }

        let header = PacketHeader::parse(&header_bytes)?;
        header.validate(self.max_payload)?;

        let mut payload = vec![0u8; header.data_size as usize];
        if !self.fill(&mut payload, "packet payload").await? {
            debug!(
                packets = self.packets,
                sequence = header.sequence,
                expected = header.data_size,
                "Connection closed while reading payload"
            );
            return Ok(None);
        }

        self.packets += 1;
        trace!(
            kind = ?header.kind,
            sequence = header.sequence,
            bytes = payload.len(),
            "Read packet"
        );

        Ok(Some(FramePacket::from_parts(header, payload)))
    }

    /// Packets fully read so far
    pub fn packets_read(&self) -> u64 {
        self.packets
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Fill `buf` completely; `Ok(false)` means the peer went away first.
    async fn fill(&mut self, buf: &mut [u8], what: &str) -> Result<bool> {
        match self.inner.read_exact(buf).await {
            Ok(_) => Ok(true),
            Err(e) if is_disconnect(e.kind()) => Ok(false),
            Err(e) => Err(StreamError::protocol(what, format!("read failed: {}", e))),
        }
    }
}

/// Error kinds that mean the peer closed or dropped the connection
fn is_disconnect(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}
