//! Driver spawns and manages the receive task for one connection

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::Result;
use crate::buffer::{LatestFrame, latest_frame};
use crate::config::ReceiverConfig;
use crate::pipeline::{DecoderBackend, PipelineState};
use crate::provider::Provider;
use crate::session::{Session, SessionOutputs, SessionSummary, StreamEnd};
use crate::sink::FrameSink;
use crate::stats::StreamStats;
use crate::types::SessionMetadata;

/// Result of spawning the receive task
pub struct DriverChannels {
    /// Latest decoded color frame
    pub color: LatestFrame,
    /// Latest processed depth frame
    pub depth: LatestFrame,
    /// Session metadata, once received
    pub metadata: watch::Receiver<Option<Arc<SessionMetadata>>>,
    /// Color decode pipeline lifecycle
    pub pipeline: watch::Receiver<PipelineState>,
    pub stats: Arc<StreamStats>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    /// Resolves when the receive task has closed the session
    pub outcome: JoinHandle<Result<SessionSummary>>,
}

/// Driver spawns and manages the receive task
///
/// The receive task owns the provider and the session. Packets are read and dispatched in
/// arrival order. The session's decode pipeline runs under a child of the driver's token, so
/// cancelling the driver also releases a dispatch that is waiting on a stalled decoder.
pub struct Driver;

impl Driver {
    /// Spawn the receive task for `provider`
    ///
    /// Must be called inside a tokio runtime. Fails only on invalid configuration.
    pub fn spawn<P>(
        provider: P,
        config: &ReceiverConfig,
        sink: Arc<dyn FrameSink>,
        backend: Arc<dyn DecoderBackend>,
    ) -> Result<DriverChannels>
    where
        P: Provider,
    {
        let (color_tx, color) = latest_frame();
        let (depth_tx, depth) = latest_frame();
        let (metadata_tx, metadata) = watch::channel(None);
        let stats = Arc::new(StreamStats::new());
        let cancel = CancellationToken::new();

        let outputs = SessionOutputs {
            color: color_tx,
            depth: depth_tx,
            metadata: metadata_tx,
            sink,
            stats: Arc::clone(&stats),
        };
        let session = Session::new(config, outputs, backend, cancel.child_token())?;
        let pipeline = session.pipeline_state();

        let task_stats = Arc::clone(&stats);
        let task_cancel = cancel.clone();
        let stats_interval = config.stats_interval();
        let outcome = tokio::spawn(async move {
            Self::receive_task(provider, session, task_stats, stats_interval, task_cancel).await
        });

        Ok(DriverChannels { color, depth, metadata, pipeline, stats, cancel, outcome })
    }

    /// Receive task - reads packets and hands them to the session until the stream ends
    async fn receive_task<P>(
        mut provider: P,
        mut session: Session,
        stats: Arc<StreamStats>,
        stats_interval: Option<Duration>,
        cancel: CancellationToken,
    ) -> Result<SessionSummary>
    where
        P: Provider,
    {
        let peer = provider.peer();
        info!(%peer, "Receive task started");
        stats.mark_started();
        let mut last_report = Instant::now();

        let ended = loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(%peer, "Receive task cancelled");
                    break Ok(StreamEnd::Cancelled);
                }
                result = provider.next_packet() => result,
            };

            match result {
                Ok(Some(packet)) => {
                    if let Err(e) = session.handle_packet(packet).await {
                        break Err(e);
                    }
                }
                Ok(None) => {
                    info!(%peer, packets = session.packets(), "Connection closed by peer");
                    break Ok(StreamEnd::ConnectionClosed);
                }
                Err(e) => break Err(e),
            }

            if let Some(interval) = stats_interval {
                if last_report.elapsed() >= interval {
                    if let Some(snapshot) = stats.snapshot_now() {
                        info!("{}", snapshot);
                    }
                    last_report = Instant::now();
                }
            }
        };

        match ended {
            Ok(end) => {
                let summary = session.finish(end).await;
                if let Some(snapshot) = stats.snapshot_now() {
                    info!("Final: {}", snapshot);
                }
                info!(
                    %peer,
                    end = ?summary.end,
                    packets = summary.packets,
                    dropped = ?summary.dropped,
                    "Receive task ended"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(%peer, "Receive task failed: {}", e);
                for suggestion in e.recovery_suggestions() {
                    info!("  - {}", suggestion);
                }
                session.close().await;
                Err(e)
            }
        }
    }
}
