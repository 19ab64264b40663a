//! Provider trait for packet sources

use super::types::FramePacket;
use crate::Result;

/// Trait for framed packet sources
///
/// Providers abstract over where packets come from (an accepted TCP client, an in-memory
/// pipe in tests) and own their read timing.
#[async_trait::async_trait]
pub trait Provider: Send + 'static {
    /// Read the next complete packet
    ///
    /// Returns:
    /// - `Ok(Some(packet))` - A packet arrived
    /// - `Ok(None)` - The peer closed the stream, possibly mid-packet
    /// - `Err(e)` - The stream is unusable (bad header, I/O failure)
    async fn next_packet(&mut self) -> Result<Option<FramePacket>>;

    /// Description of the remote end for log lines
    fn peer(&self) -> String;
}
