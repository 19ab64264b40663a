//! Drain task: fixed-size raw frames out of the decoder's output

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::PipelineState;
use crate::buffer::FramePublisher;
use crate::sink::FrameSink;
use crate::stats::StreamStats;
use crate::types::{Frame, FrameGeometry, PixelFormat, StreamKind};

/// Why the drain stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainEnd {
    /// Decoder output closed on a frame boundary
    Eof,
    /// Decoder output closed part-way into a frame
    ShortRead { bytes: usize },
    /// Reading decoder output failed
    ReadError(String),
    Cancelled,
    /// The drain task could not be joined
    Aborted,
}

/// What the drain did before it stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub frames: u64,
    pub sink_failures: u64,
    pub end: DrainEnd,
}

impl DrainReport {
    pub(crate) fn aborted() -> Self {
        Self { frames: 0, sink_failures: 0, end: DrainEnd::Aborted }
    }
}

/// Where drained frames go
pub(crate) struct DrainTarget {
    pub geometry: FrameGeometry,
    pub publisher: FramePublisher,
    pub sink: Arc<dyn FrameSink>,
    pub stats: Arc<StreamStats>,
    pub state: Arc<watch::Sender<PipelineState>>,
    /// False when the sink's color output failed to open; frames stay buffer-only
    pub sink_open: bool,
}

/// Read exactly one frame at a time until the output ends or `cancel` fires
///
/// Each full read becomes one published BGR24 frame. A short read, including EOF, ends the
/// run and moves the pipeline from `Running` to `Stopping`.
pub(crate) async fn run_drain<R>(
    mut output: R,
    target: DrainTarget,
    cancel: CancellationToken,
) -> DrainReport
where
    R: AsyncRead + Unpin,
{
    let frame_size = target.geometry.frame_size();
    let mut frames = 0u64;
    let mut sink_failures = 0u64;

    info!(geometry = %target.geometry, frame_size, "Drain running");

    let end = loop {
        let mut raw = vec![0u8; frame_size];
        let read = tokio::select! {
            _ = cancel.cancelled() => break DrainEnd::Cancelled,
            read = read_full(&mut output, &mut raw) => read,
        };

        match read {
            Ok(n) if n == frame_size => {}
            Ok(0) => break DrainEnd::Eof,
            Ok(n) => {
                warn!("Decoder output ended mid-frame: expected {} bytes, got {}", frame_size, n);
                break DrainEnd::ShortRead { bytes: n };
            }
            Err(e) => {
                warn!("Reading decoder output failed: {}", e);
                break DrainEnd::ReadError(e.to_string());
            }
        }

        let frame = match Frame::new(
            target.geometry.width,
            target.geometry.height,
            PixelFormat::Bgr24,
            raw,
        ) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping decoded frame: {}", e);
                continue;
            }
        };

        let frame = target.publisher.publish(frame);
        target.stats.record_published(StreamKind::Color);
        frames += 1;

        if !target.sink_open {
            continue;
        }
        if let Err(e) = target.sink.publish_color(&frame).await {
            sink_failures += 1;
            if sink_failures == 1 {
                warn!(sink = target.sink.name(), "Color sink rejected frame: {}", e);
            } else {
                let sink = target.sink.name();
                debug!(sink, sink_failures, "Color sink rejected frame: {}", e);
            }
        }
    };

    target.state.send_if_modified(|state| {
        if *state == PipelineState::Running {
            *state = PipelineState::Stopping;
            true
        } else {
            false
        }
    });

    debug!(frames, ?end, "Drain stopped");
    DrainReport { frames, sink_failures, end }
}

/// Fill `buf` as far as the reader allows; returns the byte count, short only at EOF
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
