//! TCP provider: one accepted client per provider

use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};

use crate::provider::Provider;
use crate::types::FramePacket;
use crate::wire::PacketReader;
use crate::{Result, StreamError};

/// Provider reading from a single accepted TCP client
pub struct TcpProvider {
    reader: PacketReader<TcpStream>,
    peer: SocketAddr,
}

impl TcpProvider {
    /// Bind `addr`, wait for one client, then stop listening
    pub async fn accept<A: ToSocketAddrs>(addr: A, max_payload: u32) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            StreamError::connection_failed_with_source("failed to bind listener", Box::new(e))
        })?;
        Self::accept_from(&listener, max_payload).await
    }

    /// Wait for one client on an already bound listener
    pub async fn accept_from(listener: &TcpListener, max_payload: u32) -> Result<Self> {
        if let Ok(local) = listener.local_addr() {
            info!(%local, "Waiting for capture device");
        }

        let (stream, peer) = listener.accept().await.map_err(|e| {
            StreamError::connection_failed_with_source("failed to accept client", Box::new(e))
        })?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!(%peer, "Failed to disable Nagle's algorithm: {}", e);
        }
        info!(%peer, "Capture device connected");

        Ok(Self { reader: PacketReader::new(stream).with_max_payload(max_payload), peer })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait::async_trait]
impl Provider for TcpProvider {
    async fn next_packet(&mut self) -> Result<Option<FramePacket>> {
        let packet = self.reader.read_packet().await?;
        if packet.is_none() {
            let packets = self.reader.packets_read();
            debug!(peer = %self.peer, packets, "Peer closed connection");
        }
        Ok(packet)
    }

    fn peer(&self) -> String {
        self.peer.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{h264_metadata, metadata_packet};
    use crate::types::{FrameGeometry, PacketKind};
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn reads_packets_from_accepted_client() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let metadata = h264_metadata(FrameGeometry::new(640, 480), FrameGeometry::new(256, 192));
            stream.write_all(&metadata_packet(&metadata).to_bytes()).await.unwrap();
        });

        let mut provider = TcpProvider::accept_from(&listener, 1024).await.unwrap();
        let packet = provider.next_packet().await.unwrap().unwrap();
        assert_eq!(packet.kind, PacketKind::Metadata);

        client.await.unwrap();
        assert_eq!(provider.next_packet().await.unwrap(), None);
        assert_eq!(provider.peer(), provider.peer_addr().to_string());
    }

    #[tokio::test]
    async fn bind_failure_is_connection_error() {
        let result = TcpProvider::accept("definitely-not-an-address", 1024).await;
        assert!(matches!(result, Err(StreamError::Connection { .. })));
    }
}
