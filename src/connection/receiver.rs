//! Receiver connection for one capture device

use futures::{Stream, StreamExt, stream::BoxStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::buffer::LatestFrame;
use crate::config::ReceiverConfig;
use crate::driver::Driver;
use crate::pipeline::{CommandBackend, DecoderBackend, PipelineState};
use crate::provider::Provider;
use crate::providers::TcpProvider;
use crate::session::SessionSummary;
use crate::sink::FrameSink;
use crate::stats::StreamStats;
use crate::types::{Frame, SessionMetadata, UpdateRate};
use crate::{Result, StreamError};

/// Frame rate assumed for throttling until metadata says otherwise
const DEFAULT_SOURCE_HZ: f64 = 30.0;

/// A live connection to one sender
///
/// Frames are exposed two ways: as latest-frame snapshots for pollers, and as (optionally
/// throttled) streams for async consumers. Dropping the connection cancels the receive task.
pub struct ReceiverConnection {
    color: LatestFrame,
    depth: LatestFrame,
    metadata: watch::Receiver<Option<Arc<SessionMetadata>>>,
    pipeline: watch::Receiver<PipelineState>,
    stats: Arc<StreamStats>,
    cancel: CancellationToken,
    outcome: Option<JoinHandle<Result<SessionSummary>>>,
    peer: String,
}

impl ReceiverConnection {
    /// Bind the configured address, accept one sender and start receiving
    ///
    /// Color is decoded by the configured external decoder program.
    pub async fn listen(config: &ReceiverConfig, sink: Arc<dyn FrameSink>) -> Result<Self> {
        config.validate()?;
        info!(bind = %config.bind, decoder = %config.decoder.program, "Starting receiver");

        let provider = TcpProvider::accept(config.bind.as_str(), config.max_payload_bytes).await?;
        let backend = Arc::new(CommandBackend::from_config(&config.decoder));
        Self::from_provider(provider, config, sink, backend)
    }

    /// Start receiving from an already connected provider
    pub fn from_provider<P: Provider>(
        provider: P,
        config: &ReceiverConfig,
        sink: Arc<dyn FrameSink>,
        backend: Arc<dyn DecoderBackend>,
    ) -> Result<Self> {
        let peer = provider.peer();
        let channels = Driver::spawn(provider, config, sink, backend)?;

        Ok(Self {
            color: channels.color,
            depth: channels.depth,
            metadata: channels.metadata,
            pipeline: channels.pipeline,
            stats: channels.stats,
            cancel: channels.cancel,
            outcome: Some(channels.outcome),
            peer,
        })
    }

    /// Most recent color frame (BGR24)
    pub fn latest_color(&self) -> Option<Arc<Frame>> {
        self.color.snapshot()
    }

    /// Most recent depth frame
    pub fn latest_depth(&self) -> Option<Arc<Frame>> {
        self.depth.snapshot()
    }

    /// Color frames as they are decoded, throttled to `rate`
    pub fn color_frames(&self, rate: UpdateRate) -> BoxStream<'static, Arc<Frame>> {
        self.color.frames(rate, self.source_hz())
    }

    /// Depth frames as they are processed, throttled to `rate`
    pub fn depth_frames(&self, rate: UpdateRate) -> BoxStream<'static, Arc<Frame>> {
        self.depth.frames(rate, self.source_hz())
    }

    /// Session metadata, once received
    pub fn metadata(&self) -> Option<Arc<SessionMetadata>> {
        self.metadata.borrow().clone()
    }

    /// Session metadata as a stream; yields at most once per connection
    pub fn metadata_updates(&self) -> impl Stream<Item = Arc<SessionMetadata>> + 'static {
        WatchStream::new(self.metadata.clone()).filter_map(|opt| async move { opt })
    }

    /// Wait up to `timeout` for session metadata
    pub async fn wait_for_metadata(&self, timeout: Duration) -> Result<Arc<SessionMetadata>> {
        let mut updates = std::pin::pin!(self.metadata_updates());
        match tokio::time::timeout(timeout, updates.next()).await {
            Ok(Some(metadata)) => Ok(metadata),
            Ok(None) => Err(StreamError::connection_failed("connection ended before metadata")),
            Err(_) => Err(StreamError::Timeout { duration: timeout }),
        }
    }

    pub fn pipeline_state(&self) -> PipelineState {
        *self.pipeline.borrow()
    }

    /// Watch color pipeline lifecycle transitions
    pub fn pipeline_updates(&self) -> watch::Receiver<PipelineState> {
        self.pipeline.clone()
    }

    pub fn stats(&self) -> Arc<StreamStats> {
        Arc::clone(&self.stats)
    }

    /// Remote end description
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Frame rate used for throttling: metadata fps, or 30 before metadata arrives
    pub fn source_hz(&self) -> f64 {
        self.metadata
            .borrow()
            .as_ref()
            .map(|metadata| f64::from(metadata.fps))
            .unwrap_or(DEFAULT_SOURCE_HZ)
    }

    /// Wait for the sender to disconnect and the session to close
    ///
    /// Returns the summary once; later calls fail.
    pub async fn finished(&mut self) -> Result<SessionSummary> {
        let outcome = self
            .outcome
            .take()
            .ok_or_else(|| StreamError::connection_failed("connection already finished"))?;

        outcome.await.map_err(|e| {
            StreamError::connection_failed_with_source("receive task failed", Box::new(e))
        })?
    }

    /// Stop receiving, close the decoder and return the session summary
    pub async fn shutdown(mut self) -> Result<SessionSummary> {
        info!(peer = %self.peer, "Shutting down receiver connection");
        self.cancel.cancel();
        self.finished().await
    }
}

impl Drop for ReceiverConnection {
    fn drop(&mut self) {
        debug!(peer = %self.peer, "Dropping receiver connection");
        self.cancel.cancel();
    }
}
