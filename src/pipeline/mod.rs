//! Color decode pipeline.
//!
//! Compressed H.264 payloads flow through an external decoder and come back as fixed-size
//! raw BGR24 frames:
//!
//! ```text
//! feed() ──► bounded queue ──► feeder task ──► decoder input
//!                                                  │
//! color LatestFrame ◄── drain task ◄── decoder output
//! ```
//!
//! The feeder and the drain run as independent tasks, so a decoder that buffers several
//! frames internally can never deadlock the receive loop. The pipeline is an explicit state
//! machine, `Stopped → Starting → Running → Stopping → Stopped`, published on a watch channel.
//!
//! Still-image color (JPEG) bypasses all of this; see [`decode_still`].

mod backend;
mod drain;
mod feeder;
mod still;

pub use backend::{CommandBackend, DecoderBackend, DecoderHandles, DecoderProcess, ProcessExit};
pub use drain::{DrainEnd, DrainReport};
pub use feeder::FeederReport;
pub use still::decode_still;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::buffer::FramePublisher;
use crate::config::DecoderConfig;
use crate::sink::FrameSink;
use crate::stats::StreamStats;
use crate::types::FrameGeometry;
use crate::{Result, StreamError};
use drain::{DrainTarget, run_drain};
use feeder::run_feeder;

/// Lifecycle of the decode pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Stopped,
    Starting,
    Running,
    /// The decoder output ended or shutdown is in progress
    Stopping,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineState::Stopped => "stopped",
            PipelineState::Starting => "starting",
            PipelineState::Running => "running",
            PipelineState::Stopping => "stopping",
        })
    }
}

/// Pipeline tuning, usually taken from [`DecoderConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub queue_depth: usize,
    /// Bound on every wait during shutdown
    pub shutdown_timeout: Duration,
    pub restart_on_exit: bool,
    pub max_restarts: u32,
}

impl From<&DecoderConfig> for PipelineSettings {
    fn from(config: &DecoderConfig) -> Self {
        Self {
            queue_depth: config.queue_depth.max(1),
            shutdown_timeout: config.shutdown_timeout(),
            restart_on_exit: config.restart_on_exit,
            max_restarts: config.max_restarts,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&DecoderConfig::default())
    }
}

struct ActivePipeline {
    geometry: FrameGeometry,
    payloads: mpsc::Sender<Vec<u8>>,
    feeder: JoinHandle<FeederReport>,
    drain: JoinHandle<DrainReport>,
    process: Box<dyn DecoderProcess>,
    cancel: CancellationToken,
}

/// Color decode pipeline around one decoder at a time
pub struct DecodePipeline {
    backend: Arc<dyn DecoderBackend>,
    publisher: FramePublisher,
    sink: Arc<dyn FrameSink>,
    stats: Arc<StreamStats>,
    settings: PipelineSettings,
    state: Arc<watch::Sender<PipelineState>>,
    /// Parent of every decoder's token; cancelling it stops all workers
    cancel: CancellationToken,
    /// Whether the drain hands frames to the sink's color output
    sink_open: bool,
    active: Option<ActivePipeline>,
    /// Geometry of the last `ensure_started`, reused for restarts
    geometry: Option<FrameGeometry>,
    restarts: u32,
}

impl DecodePipeline {
    pub fn new(
        backend: Arc<dyn DecoderBackend>,
        publisher: FramePublisher,
        sink: Arc<dyn FrameSink>,
        stats: Arc<StreamStats>,
        settings: PipelineSettings,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Stopped);
        Self {
            backend,
            publisher,
            sink,
            stats,
            settings,
            state: Arc::new(state),
            cancel,
            sink_open: true,
            active: None,
            geometry: None,
            restarts: 0,
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions
    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Geometry the running decoder produces
    pub fn geometry(&self) -> Option<FrameGeometry> {
        self.active.as_ref().map(|active| active.geometry)
    }

    /// Decoder restarts performed so far
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Route decoded frames to the sink's color output or keep them buffer-only
    ///
    /// Takes effect for the next decoder started.
    pub fn set_sink_open(&mut self, open: bool) {
        self.sink_open = open;
    }

    /// Start the decoder for `geometry` unless it is already running for it
    ///
    /// A pipeline running with a different geometry, or whose decoder has exited, is shut
    /// down and started again.
    pub async fn ensure_started(&mut self, geometry: FrameGeometry) -> Result<()> {
        self.geometry = Some(geometry);

        if let Some(running) = self.geometry() {
            if running == geometry && self.state() == PipelineState::Running {
                debug!(%geometry, "Decode pipeline already running");
                return Ok(());
            }
            let state = self.state();
            info!(from = %running, to = %geometry, %state, "Restarting decode pipeline");
            self.shutdown().await;
        }

        self.start(geometry)
    }

    /// Hand one compressed payload to the decoder
    ///
    /// Waits when the queue is full, until the pipeline is cancelled. Fails when no decoder
    /// is running; with restarts enabled, a keyframe arriving after the decoder exited starts
    /// a new one first.
    pub async fn feed(&mut self, payload: Vec<u8>, is_keyframe: bool) -> Result<()> {
        if self.active.is_some() && self.state() != PipelineState::Running {
            warn!("Decoder exited mid-stream");
            if let Some(report) = self.shutdown().await {
                debug!(frames = report.frames, end = ?report.end, "Reaped decoder");
            }
        }

        if self.active.is_none() {
            self.try_restart(is_keyframe)?;
        }

        let active = self
            .active
            .as_ref()
            .ok_or_else(|| StreamError::pipeline("decoder is not running"))?;
        tokio::select! {
            biased;
            _ = active.cancel.cancelled() => {
                Err(StreamError::pipeline("decode pipeline cancelled"))
            }
            sent = active.payloads.send(payload) => {
                sent.map_err(|_| StreamError::pipeline("decoder feeder has stopped"))
            }
        }
    }

    /// Close the decoder input, let the drain finish, then stop the process
    ///
    /// Every wait is bounded by the shutdown timeout; a decoder that outlives it is killed.
    /// Returns `None` when nothing was running.
    pub async fn shutdown(&mut self) -> Option<DrainReport> {
        let ActivePipeline { geometry, payloads, feeder, drain, mut process, cancel } =
            self.active.take()?;
        let timeout = self.settings.shutdown_timeout;
        self.state.send_replace(PipelineState::Stopping);
        debug!(%geometry, pid = ?process.id(), "Shutting down decode pipeline");

        drop(payloads);
        let feeder = join_within(feeder, timeout, &cancel, "feeder").await;
        let drain = join_within(drain, timeout, &cancel, "drain").await;
        cancel.cancel();

        match process.terminate(timeout).await {
            Ok(exit) => debug!(?exit, "Decoder stopped"),
            Err(e) => warn!("Failed to stop decoder: {}", e),
        }

        self.state.send_replace(PipelineState::Stopped);

        let drain = drain.unwrap_or_else(DrainReport::aborted);
        info!(
            frames = drain.frames,
            fed = feeder.map(|report| report.written).unwrap_or(0),
            end = ?drain.end,
            "Decode pipeline stopped"
        );
        Some(drain)
    }

    fn start(&mut self, geometry: FrameGeometry) -> Result<()> {
        self.state.send_replace(PipelineState::Starting);

        let DecoderHandles { input, output, process } = match self.backend.spawn(geometry) {
            Ok(handles) => handles,
            Err(e) => {
                self.state.send_replace(PipelineState::Stopped);
                return Err(e);
            }
        };

        let cancel = self.cancel.child_token();
        let (payloads, queue) = mpsc::channel(self.settings.queue_depth);

        // Running must be visible before the drain can move it to Stopping.
        self.state.send_replace(PipelineState::Running);

        let feeder = tokio::spawn(run_feeder(input, queue, cancel.clone()));
        let target = DrainTarget {
            geometry,
            publisher: self.publisher.clone(),
            sink: Arc::clone(&self.sink),
            stats: Arc::clone(&self.stats),
            state: Arc::clone(&self.state),
            sink_open: self.sink_open,
        };
        let drain = tokio::spawn(run_drain(output, target, cancel.clone()));

        info!(
            backend = self.backend.name(),
            pid = ?process.id(),
            %geometry,
            frame_size = geometry.frame_size(),
            "Decode pipeline running"
        );

        self.active = Some(ActivePipeline { geometry, payloads, feeder, drain, process, cancel });
        Ok(())
    }

    fn try_restart(&mut self, is_keyframe: bool) -> Result<()> {
        let geometry =
            self.geometry.ok_or_else(|| StreamError::pipeline("decoder has not been started"))?;

        if !self.settings.restart_on_exit {
            return Err(StreamError::pipeline("decoder is not running"));
        }
        if self.cancel.is_cancelled() {
            return Err(StreamError::pipeline("decode pipeline cancelled"));
        }
        if self.restarts >= self.settings.max_restarts {
            return Err(StreamError::pipeline(format!(
                "decoder restart limit ({}) reached",
                self.settings.max_restarts
            )));
        }
        if !is_keyframe {
            return Err(StreamError::pipeline("waiting for a keyframe to restart the decoder"));
        }

        self.restarts += 1;
        info!(
            attempt = self.restarts,
            max = self.settings.max_restarts,
            "Restarting decoder on keyframe"
        );
        self.start(geometry)
    }
}

impl Drop for DecodePipeline {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            debug!("Dropping running decode pipeline");
            active.cancel.cancel();
        }
    }
}

/// Join a worker, cancelling it when it outlives `timeout`
async fn join_within<T>(
    mut handle: JoinHandle<T>,
    timeout: Duration,
    cancel: &CancellationToken,
    worker: &str,
) -> Option<T> {
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(report)) => return Some(report),
        Ok(Err(e)) => {
            warn!("Decoder {} task failed: {}", worker, e);
            return None;
        }
        Err(_) => warn!("Decoder {} did not stop within {:?}, cancelling", worker, timeout),
    }

    cancel.cancel();
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(report)) => Some(report),
        _ => {
            handle.abort();
            None
        }
    }
}
