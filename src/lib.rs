//! Receiver for length-framed RGB + depth capture streams.
//!
//! A mobile capture device streams three interleaved record kinds over one TCP connection:
//! compressed color video, compressed depth images and a one-time JSON session-metadata
//! record. Depthwire demultiplexes them, runs color through an external decoder, normalizes
//! depth in-process and exposes the latest frame of each kind.
//!
//! # Features
//!
//! - **Exact framing**: 18-byte little-endian headers, no resynchronization, bounded payloads
//! - **Deadlock-free decoding**: independent feeder and drain tasks around the decoder
//! - **Depth normalization**: 16-bit millimeters, float meters and legacy 8-bit depth
//! - **Latest-frame buffers**: immutable shared frames, never torn, one per stream
//!
//! ## Example
//!
//! ```rust,no_run
//! use depthwire::{Depthwire, NullSink, ReceiverConfig, UpdateRate};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> depthwire::Result<()> {
//!     let config = ReceiverConfig::default();
//!     let connection = Depthwire::listen(&config, Arc::new(NullSink)).await?;
//!
//!     let mut depth = connection.depth_frames(UpdateRate::Max(10));
//!     while let Some(frame) = depth.next().await {
//!         println!("depth {}x{}", frame.width(), frame.height());
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Receive path
pub mod buffer;
pub mod config;
pub mod connection;
pub mod depth;
pub mod driver;
pub mod logging;
pub mod pipeline;
pub mod provider;
pub mod providers;
pub mod session;
pub mod sink;
pub mod stats;
pub mod stream;
pub mod wire;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use buffer::{FramePublisher, LatestFrame};
pub use config::{ReceiverConfig, UnknownPacketPolicy};
pub use connection::ReceiverConnection;
pub use depth::{DepthNormalizer, DepthOutput, DepthRange};
pub use logging::init_tracing;
pub use pipeline::{CommandBackend, DecoderBackend, PipelineState};
pub use session::{SessionSummary, StreamEnd};
pub use sink::{FrameSink, NullSink};
pub use stats::{StatsSnapshot, StreamStats};

use std::sync::Arc;
use tokio::io::AsyncRead;

use providers::StreamProvider;

/// Unified entry point for receiver connections.
///
/// # Examples
///
/// ## TCP
/// ```rust,no_run
/// use depthwire::{Depthwire, NullSink, ReceiverConfig};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> depthwire::Result<()> {
///     let connection = Depthwire::listen(&ReceiverConfig::default(), Arc::new(NullSink)).await?;
///     let summary = connection.shutdown().await?;
///     println!("{} packets", summary.packets);
///     Ok(())
/// }
/// ```
pub struct Depthwire;

impl Depthwire {
    /// Accept one sender on `config.bind` and start receiving.
    ///
    /// The configuration is validated before the listener is bound.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - The address cannot be bound
    /// - Accepting the client fails
    pub async fn listen(
        config: &ReceiverConfig,
        sink: Arc<dyn FrameSink>,
    ) -> Result<ReceiverConnection> {
        ReceiverConnection::listen(config, sink).await
    }

    /// Receive from an already connected byte stream with a caller-chosen decoder backend.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use depthwire::{CommandBackend, Depthwire, NullSink, ReceiverConfig};
    /// use std::sync::Arc;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> depthwire::Result<()> {
    /// let socket = tokio::net::TcpStream::connect("192.168.1.20:8888").await?;
    /// let config = ReceiverConfig::default();
    /// let backend = Arc::new(CommandBackend::from_config(&config.decoder));
    /// let connection = Depthwire::from_stream(socket, &config, Arc::new(NullSink), backend)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_stream<R>(
        reader: R,
        config: &ReceiverConfig,
        sink: Arc<dyn FrameSink>,
        backend: Arc<dyn DecoderBackend>,
    ) -> Result<ReceiverConnection>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        config.validate()?;
        let provider = StreamProvider::new(reader, config.max_payload_bytes);
        ReceiverConnection::from_provider(provider, config, sink, backend)
    }
}
