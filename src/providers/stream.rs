//! Provider over an arbitrary async byte stream

use tokio::io::AsyncRead;

use crate::Result;
use crate::provider::Provider;
use crate::types::FramePacket;
use crate::wire::PacketReader;

/// Provider that reads framed packets from any `AsyncRead`
pub struct StreamProvider<R> {
    reader: PacketReader<R>,
    peer: String,
}

impl<R> StreamProvider<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(inner: R, max_payload: u32) -> Self {
        Self::with_peer(inner, max_payload, "stream")
    }

    /// Same as [`StreamProvider::new`] with a label for log lines
    pub fn with_peer(inner: R, max_payload: u32, peer: impl Into<String>) -> Self {
        Self { reader: PacketReader::new(inner).with_max_payload(max_payload), peer: peer.into() }
    }

    /// Packets fully read so far
    pub fn packets_read(&self) -> u64 {
        self.reader.packets_read()
    }
}

#[async_trait::async_trait]
impl<R> Provider for StreamProvider<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn next_packet(&mut self) -> Result<Option<FramePacket>> {
        self.reader.read_packet().await
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}
