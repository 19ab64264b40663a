//! Per-connection session: demultiplexing and the metadata handshake.
//!
//! A session starts in `AwaitingMetadata`. The first metadata record moves it to `Active`,
//! opens the sink outputs and, for H.264 color, starts the decode pipeline sized to the
//! advertised resolution. Every later packet is routed by kind:
//!
//! | kind     | awaiting metadata              | active                                  |
//! |----------|--------------------------------|-----------------------------------------|
//! | color    | counted, dropped               | decode pipeline, or still-image decode  |
//! | depth    | decoded, buffer only           | decoded, buffer and sink                |
//! | metadata | accepted                       | first record wins                       |
//! | unknown  | per [`UnknownPacketPolicy`]    | per [`UnknownPacketPolicy`]             |
//!
//! Only protocol errors leave [`Session::handle_packet`]; everything else is a dropped
//! frame.

mod handshake;

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::buffer::FramePublisher;
use crate::config::{ReceiverConfig, UnknownPacketPolicy};
use crate::depth::DepthNormalizer;
use crate::pipeline::{
    DecodePipeline, DecoderBackend, DrainReport, PipelineSettings, PipelineState, decode_still,
};
use crate::sink::FrameSink;
use crate::stats::{KindTotals, StreamStats};
use crate::types::{ColorEncoding, FramePacket, PacketKind, SessionMetadata, StreamKind};
use crate::{Result, StreamError};
use handshake::{MetadataOutcome, OpenOutputs, log_accepted, open_outputs, review_metadata};

/// Handshake progress
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    AwaitingMetadata,
    Active(Arc<SessionMetadata>),
}

/// Why a connection's receive loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The peer closed the connection (including mid-packet)
    ConnectionClosed,
    /// Shutdown was requested locally
    Cancelled,
}

/// Final accounting for one connection
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub end: StreamEnd,
    /// Complete packets read, all kinds
    pub packets: u64,
    pub color: KindTotals,
    pub depth: KindTotals,
    pub metadata: Option<Arc<SessionMetadata>>,
    pub dropped: DropCounts,
    /// Frames the sink rejected, both streams, including frames from the decode pipeline
    pub sink_failures: u64,
    /// Final decode pipeline report, when one was running
    pub decoder: Option<DrainReport>,
}

/// Frames that never reached a buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropCounts {
    pub color: u64,
    pub depth: u64,
    pub unknown: u64,
}

/// Everything a session publishes into
pub struct SessionOutputs {
    pub color: FramePublisher,
    pub depth: FramePublisher,
    pub metadata: watch::Sender<Option<Arc<SessionMetadata>>>,
    pub sink: Arc<dyn FrameSink>,
    pub stats: Arc<StreamStats>,
}

/// Demultiplexer state for one connection
pub struct Session {
    state: SessionState,
    unknown_packets: UnknownPacketPolicy,
    resize_still_frames: bool,
    depth: DepthNormalizer,
    pipeline: DecodePipeline,
    color_out: FramePublisher,
    depth_out: FramePublisher,
    metadata_tx: watch::Sender<Option<Arc<SessionMetadata>>>,
    sink: Arc<dyn FrameSink>,
    stats: Arc<StreamStats>,
    open: OpenOutputs,
    seen_unknown: HashSet<u8>,
    packets: u64,
    dropped: DropCounts,
    sink_failures: u64,
}

impl Session {
    /// Build an idle session; cancelling `cancel` also stops its decode pipeline
    pub fn new(
        config: &ReceiverConfig,
        outputs: SessionOutputs,
        backend: Arc<dyn DecoderBackend>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let depth = config.depth_normalizer()?;
        let pipeline = DecodePipeline::new(
            backend,
            outputs.color.clone(),
            Arc::clone(&outputs.sink),
            Arc::clone(&outputs.stats),
            PipelineSettings::from(&config.decoder),
            cancel,
        );

        Ok(Self {
            state: SessionState::AwaitingMetadata,
            unknown_packets: config.unknown_packets,
            resize_still_frames: config.color.resize_still_frames,
            depth,
            pipeline,
            color_out: outputs.color,
            depth_out: outputs.depth,
            metadata_tx: outputs.metadata,
            sink: outputs.sink,
            stats: outputs.stats,
            open: OpenOutputs::default(),
            seen_unknown: HashSet::new(),
            packets: 0,
            dropped: DropCounts::default(),
            sink_failures: 0,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn metadata(&self) -> Option<&Arc<SessionMetadata>> {
        match &self.state {
            SessionState::AwaitingMetadata => None,
            SessionState::Active(metadata) => Some(metadata),
        }
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    pub fn dropped(&self) -> DropCounts {
        self.dropped
    }

    /// Sink rejections seen by the receive path; decode pipeline rejections are in its report
    pub fn sink_failures(&self) -> u64 {
        self.sink_failures
    }

    pub fn pipeline_state(&self) -> watch::Receiver<PipelineState> {
        self.pipeline.subscribe_state()
    }

    /// Route one packet
    ///
    /// Returns an error only for conditions that end the connection: malformed metadata and
    /// rejected unknown packet types.
    pub async fn handle_packet(&mut self, packet: FramePacket) -> Result<()> {
        self.packets += 1;
        trace!(
            kind = ?packet.kind,
            sequence = packet.sequence,
            bytes = packet.payload.len(),
            "Dispatching packet"
        );

        match packet.kind {
            PacketKind::Metadata => self.handle_metadata(&packet.payload).await,
            PacketKind::Color => {
                self.stats.record(StreamKind::Color, packet.payload.len());
                self.handle_color(packet).await;
                Ok(())
            }
            PacketKind::Depth => {
                self.stats.record(StreamKind::Depth, packet.payload.len());
                self.handle_depth(packet).await;
                Ok(())
            }
            PacketKind::Unknown(byte) => self.handle_unknown(byte, &packet),
        }
    }

    /// Stop the decode pipeline and release the session
    pub async fn close(&mut self) -> Option<DrainReport> {
        debug!(packets = self.packets, dropped = ?self.dropped, "Closing session");
        self.pipeline.shutdown().await
    }

    /// Close the session and account for everything it saw
    pub async fn finish(mut self, end: StreamEnd) -> SessionSummary {
        let decoder = self.close().await;
        let drained = decoder.as_ref().map_or(0, |report| report.sink_failures);
        SessionSummary {
            end,
            packets: self.packets,
            color: self.stats.totals(StreamKind::Color),
            depth: self.stats.totals(StreamKind::Depth),
            metadata: self.metadata().map(Arc::clone),
            dropped: self.dropped,
            sink_failures: self.sink_failures + drained,
            decoder,
        }
    }

    async fn handle_metadata(&mut self, payload: &[u8]) -> Result<()> {
        let current = self.metadata().map(Arc::clone);

        match review_metadata(current.as_deref(), payload)? {
            MetadataOutcome::Accepted(metadata) => self.activate(metadata).await,
            MetadataOutcome::Repeated => debug!("Ignoring repeated session metadata"),
            MetadataOutcome::Conflicting(metadata) => warn!(
                color = %metadata.color_geometry(),
                encoding = %metadata.rgb_encoding,
                "Ignoring session metadata that differs from the first record"
            ),
        }
        Ok(())
    }

    async fn activate(&mut self, metadata: Arc<SessionMetadata>) {
        log_accepted(&metadata);
        self.state = SessionState::Active(Arc::clone(&metadata));
        self.metadata_tx.send_replace(Some(Arc::clone(&metadata)));
        self.open = open_outputs(self.sink.as_ref(), &metadata).await;
        self.pipeline.set_sink_open(self.open.color);

        match metadata.rgb_encoding {
            ColorEncoding::H264 => {
                if let Err(e) = self.pipeline.ensure_started(metadata.color_geometry()).await {
                    error!("Failed to start color decoder: {}", e);
                    for suggestion in e.recovery_suggestions() {
                        info!("  - {}", suggestion);
                    }
                }
            }
            ColorEncoding::Jpeg => info!("Still-image color stream; decoding in-process"),
            ColorEncoding::Unsupported => {}
        }
    }

    async fn handle_color(&mut self, packet: FramePacket) {
        let encoding = match &self.state {
            SessionState::AwaitingMetadata => {
                self.drop_color(&StreamError::pipeline("no session metadata yet"), packet.sequence);
                return;
            }
            SessionState::Active(metadata) => metadata.rgb_encoding,
        };

        match encoding {
            ColorEncoding::H264 => {
                let fed = self.pipeline.feed(packet.payload, packet.is_keyframe).await;
                if let Err(e) = fed {
                    self.drop_color(&e, packet.sequence);
                }
            }
            ColorEncoding::Jpeg => {
                let target = match (&self.state, self.resize_still_frames) {
                    (SessionState::Active(metadata), true) => Some(metadata.color_geometry()),
                    _ => None,
                };
                match decode_still(&packet.payload, target) {
                    Ok(frame) => {
                        let frame = self.color_out.publish(frame.with_timestamp(packet.timestamp));
                        self.stats.record_published(StreamKind::Color);
                        if self.open.color {
                            let published = self.sink.publish_color(&frame).await;
                            if let Err(e) = published {
                                self.note_sink_failure(StreamKind::Color, &e);
                            }
                        }
                    }
                    Err(e) => self.drop_color(&e, packet.sequence),
                }
            }
            ColorEncoding::Unsupported => {
                let reason = StreamError::codec("color", "unsupported encoding");
                self.drop_color(&reason, packet.sequence);
            }
        }
    }

    async fn handle_depth(&mut self, packet: FramePacket) {
        match self.depth.process(&packet.payload, packet.timestamp) {
            Ok(frame) => {
                let frame = self.depth_out.publish(frame);
                self.stats.record_published(StreamKind::Depth);
                if self.open.depth {
                    let published = self.sink.publish_depth(&frame).await;
                    if let Err(e) = published {
                        self.note_sink_failure(StreamKind::Depth, &e);
                    }
                }
            }
            Err(e) => {
                self.dropped.depth += 1;
                if self.dropped.depth == 1 {
                    warn!(sequence = packet.sequence, "Dropping depth frame: {}", e);
                } else {
                    debug!(
                        sequence = packet.sequence,
                        dropped = self.dropped.depth,
                        "Dropping depth frame: {}",
                        e
                    );
                }
            }
        }
    }

    fn handle_unknown(&mut self, byte: u8, packet: &FramePacket) -> Result<()> {
        self.dropped.unknown += 1;
        match self.unknown_packets {
            UnknownPacketPolicy::Reject => Err(StreamError::protocol(
                "packet dispatch",
                format!("unknown packet type {:#04x} (sequence {})", byte, packet.sequence),
            )),
            UnknownPacketPolicy::Skip => {
                if self.seen_unknown.insert(byte) {
                    warn!(
                        sequence = packet.sequence,
                        bytes = packet.payload.len(),
                        "Skipping packets of unknown type {:#04x}",
                        byte
                    );
                } else {
                    let sequence = packet.sequence;
                    debug!(sequence, "Skipping unknown packet type {:#04x}", byte);
                }
                Ok(())
            }
        }
    }

    fn drop_color(&mut self, reason: &StreamError, sequence: u32) {
        self.dropped.color += 1;
        if self.dropped.color == 1 {
            warn!(sequence, "Dropping color frame: {}", reason);
        } else {
            debug!(sequence, dropped = self.dropped.color, "Dropping color frame: {}", reason);
        }
    }

    fn note_sink_failure(&mut self, kind: StreamKind, e: &StreamError) {
        self.sink_failures += 1;
        if self.sink_failures == 1 {
            warn!(sink = self.sink.name(), stream = %kind, "Sink rejected frame: {}", e);
        } else {
            debug!(
                sink = self.sink.name(),
                stream = %kind,
                failures = self.sink_failures,
                "Sink rejected frame: {}",
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{LatestFrame, latest_frame};
    use crate::test_utils::{
        LoopbackBackend, RecordingSink, color_packet, depth_packet, encode_depth_png,
        encode_rgb_png, h264_metadata, metadata_packet,
    };
    use crate::types::{FrameGeometry, PixelFormat};
    use std::time::Duration;

    struct Harness {
        session: Session,
        color: LatestFrame,
        depth: LatestFrame,
        metadata: watch::Receiver<Option<Arc<SessionMetadata>>>,
        sink: Arc<RecordingSink>,
        stats: Arc<StreamStats>,
        backend: Arc<LoopbackBackend>,
    }

    fn harness(config: ReceiverConfig) -> Harness {
        let (color_tx, color) = latest_frame();
        let (depth_tx, depth) = latest_frame();
        let (metadata_tx, metadata) = watch::channel(None);
        let sink = Arc::new(RecordingSink::new());
        let stats = Arc::new(StreamStats::new());
        let backend = Arc::new(LoopbackBackend::new());

        let outputs = SessionOutputs {
            color: color_tx,
            depth: depth_tx,
            metadata: metadata_tx,
            sink: sink.clone(),
            stats: Arc::clone(&stats),
        };
        let session =
            Session::new(&config, outputs, backend.clone(), CancellationToken::new()).unwrap();
        Harness { session, color, depth, metadata, sink, stats, backend }
    }

    fn small_metadata() -> SessionMetadata {
        h264_metadata(FrameGeometry::new(4, 2), FrameGeometry::new(2, 2))
    }

    #[tokio::test]
    async fn metadata_starts_pipeline_and_opens_sinks() {
        let mut h = harness(ReceiverConfig::default());
        assert_eq!(*h.session.state(), SessionState::AwaitingMetadata);

        h.session.handle_packet(metadata_packet(&small_metadata())).await.unwrap();

        assert!(matches!(h.session.state(), SessionState::Active(_)));
        assert_eq!(h.metadata.borrow().as_deref(), Some(&small_metadata()));
        assert_eq!(*h.session.pipeline_state().borrow(), PipelineState::Running);
        assert_eq!(h.backend.spawned(), 1);
        assert_eq!(
            h.sink.opened(),
            vec![(StreamKind::Color, 4, 2, 30), (StreamKind::Depth, 2, 2, 30)]
        );
        h.session.close().await;
    }

    #[tokio::test]
    async fn duplicate_metadata_keeps_first_record() {
        let mut h = harness(ReceiverConfig::default());
        h.session.handle_packet(metadata_packet(&small_metadata())).await.unwrap();

        let mut other = small_metadata();
        other.rgb_width = 8;
        h.session.handle_packet(metadata_packet(&small_metadata())).await.unwrap();
        h.session.handle_packet(metadata_packet(&other)).await.unwrap();

        assert_eq!(h.session.metadata().unwrap().rgb_width, 4);
        assert_eq!(h.backend.spawned(), 1);
        assert_eq!(h.sink.opened().len(), 2);
        h.session.close().await;
    }

    #[tokio::test]
    async fn malformed_metadata_is_fatal() {
        let mut h = harness(ReceiverConfig::default());
        let packet = FramePacket::new(PacketKind::Metadata, 0.0, 0, b"{oops".to_vec(), false);
        assert!(matches!(h.session.handle_packet(packet).await, Err(StreamError::Protocol { .. })));
    }

    #[tokio::test]
    async fn color_before_metadata_is_counted_and_dropped() {
        let mut h = harness(ReceiverConfig::default());
        h.session.handle_packet(color_packet(1, vec![0; 24], true)).await.unwrap();

        assert_eq!(h.stats.totals(StreamKind::Color).received, 1);
        assert_eq!(h.session.dropped().color, 1);
        assert!(h.color.snapshot().is_none());
        assert_eq!(h.backend.spawned(), 0);
    }

    #[tokio::test]
    async fn depth_before_metadata_reaches_buffer_only() {
        let mut h = harness(ReceiverConfig::default());
        let payload = encode_depth_png(2, 1, &[0, 2500]);
        h.session.handle_packet(depth_packet(1, payload)).await.unwrap();

        let frame = h.depth.snapshot().unwrap();
        assert_eq!(frame.format(), PixelFormat::Gray8);
        assert_eq!(frame.data(), &[0, 119]);
        assert!(h.sink.depth_frames().is_empty());
        assert_eq!(h.stats.totals(StreamKind::Depth).published, 1);
    }

    #[tokio::test]
    async fn depth_after_metadata_reaches_sink() {
        let mut h = harness(ReceiverConfig::default());
        h.session.handle_packet(metadata_packet(&small_metadata())).await.unwrap();
        h.session.handle_packet(depth_packet(2, encode_depth_png(2, 2, &[5000; 4]))).await.unwrap();

        let frames = h.sink.depth_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data(), &[255; 4]);
        h.session.close().await;
    }

    #[tokio::test]
    async fn corrupt_depth_is_dropped() {
        let mut h = harness(ReceiverConfig::default());
        h.session.handle_packet(depth_packet(1, b"garbage".to_vec())).await.unwrap();

        assert_eq!(h.session.dropped().depth, 1);
        assert_eq!(h.stats.totals(StreamKind::Depth).received, 1);
        assert!(h.depth.snapshot().is_none());
    }

    #[tokio::test]
    async fn h264_color_flows_through_pipeline() {
        let mut h = harness(ReceiverConfig::default());
        h.session.handle_packet(metadata_packet(&small_metadata())).await.unwrap();

        let mut latest = h.color.clone();
        h.session.handle_packet(color_packet(1, vec![7; 24], true)).await.unwrap();
        let frame = tokio::time::timeout(Duration::from_secs(1), latest.changed())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(frame.format(), PixelFormat::Bgr24);
        assert_eq!(frame.data(), &[7; 24]);

        let report = h.session.close().await.unwrap();
        assert_eq!(report.frames, 1);
        assert_eq!(h.sink.color_frames().len(), 1);
    }

    #[tokio::test]
    async fn still_image_color_is_decoded_and_resized() {
        let mut h = harness(ReceiverConfig::default());
        let mut metadata = small_metadata();
        metadata.rgb_encoding = ColorEncoding::Jpeg;
        h.session.handle_packet(metadata_packet(&metadata)).await.unwrap();
        assert_eq!(h.backend.spawned(), 0);

        let still = color_packet(1, encode_rgb_png(8, 4, [10, 20, 30]), true);
        h.session.handle_packet(still).await.unwrap();

        let frame = h.color.snapshot().unwrap();
        assert_eq!(frame.geometry(), FrameGeometry::new(4, 2));
        assert_eq!(&frame.data()[..3], &[30, 20, 10]);
        assert_eq!(frame.timestamp(), Some(1.0 / 30.0));
        assert_eq!(h.sink.color_frames().len(), 1);

        h.session.handle_packet(color_packet(2, b"not a jpeg".to_vec(), false)).await.unwrap();
        assert_eq!(h.session.dropped().color, 1);
    }

    #[tokio::test]
    async fn unknown_packets_follow_policy() {
        let unknown = FramePacket::new(PacketKind::Unknown(9), 0.0, 4, vec![1, 2, 3], false);

        let mut skipping = harness(ReceiverConfig::default());
        skipping.session.handle_packet(unknown.clone()).await.unwrap();
        skipping.session.handle_packet(unknown.clone()).await.unwrap();
        assert_eq!(skipping.session.dropped().unknown, 2);

        let config = ReceiverConfig {
            unknown_packets: UnknownPacketPolicy::Reject,
            ..ReceiverConfig::default()
        };
        let mut rejecting = harness(config);
        assert!(matches!(
            rejecting.session.handle_packet(unknown).await,
            Err(StreamError::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn finish_summarizes_the_connection() {
        let config = ReceiverConfig::default();
        let (color, _) = latest_frame();
        let (depth, _) = latest_frame();
        let (metadata, _) = watch::channel(None);
        let sink: Arc<dyn FrameSink> = Arc::new(RecordingSink::failing());
        let stats = Arc::new(StreamStats::new());
        let outputs = SessionOutputs { color, depth, metadata, sink, stats };
        let backend = Arc::new(LoopbackBackend::new());
        let cancel = CancellationToken::new();
        let mut session = Session::new(&config, outputs, backend, cancel).unwrap();

        session.handle_packet(metadata_packet(&small_metadata())).await.unwrap();
        session.handle_packet(depth_packet(1, encode_depth_png(2, 2, &[1000; 4]))).await.unwrap();
        session.handle_packet(depth_packet(2, vec![0xAB])).await.unwrap();

        let summary = session.finish(StreamEnd::ConnectionClosed).await;
        assert_eq!(summary.end, StreamEnd::ConnectionClosed);
        assert_eq!(summary.packets, 3);
        assert_eq!(summary.depth.received, 2);
        assert_eq!(summary.depth.published, 1);
        assert_eq!(summary.dropped.depth, 1);
        assert_eq!(summary.sink_failures, 1);
        assert_eq!(summary.metadata.unwrap().rgb_width, 4);
        assert_eq!(summary.decoder.unwrap().frames, 0);
    }

    #[tokio::test]
    async fn decoder_spawn_failure_only_drops_color() {
        let (color, latest_color) = latest_frame();
        let (depth, latest_depth) = latest_frame();
        let (metadata, _) = watch::channel(None);
        let sink: Arc<dyn FrameSink> = Arc::new(RecordingSink::new());
        let stats = Arc::new(StreamStats::new());
        let outputs = SessionOutputs { color, depth, metadata, sink, stats };
        let backend = Arc::new(crate::test_utils::BrokenBackend);
        let config = ReceiverConfig::default();
        let cancel = CancellationToken::new();
        let mut session = Session::new(&config, outputs, backend, cancel).unwrap();

        session.handle_packet(metadata_packet(&small_metadata())).await.unwrap();
        assert!(matches!(session.state(), SessionState::Active(_)));
        assert_eq!(*session.pipeline_state().borrow(), PipelineState::Stopped);

        session.handle_packet(color_packet(1, vec![0; 24], true)).await.unwrap();
        session.handle_packet(depth_packet(2, encode_depth_png(2, 2, &[0; 4]))).await.unwrap();

        assert_eq!(session.dropped().color, 1);
        assert!(latest_color.snapshot().is_none());
        assert!(latest_depth.snapshot().is_some());
        assert!(session.close().await.is_none());
    }

    fn session_with(sink: Arc<dyn FrameSink>) -> (Session, LatestFrame) {
        let (color, latest_color) = latest_frame();
        let (depth, _) = latest_frame();
        let (metadata, _) = watch::channel(None);
        let stats = Arc::new(StreamStats::new());
        let outputs = SessionOutputs { color, depth, metadata, sink, stats };
        let backend = Arc::new(LoopbackBackend::new());
        let config = ReceiverConfig::default();
        let session = Session::new(&config, outputs, backend, CancellationToken::new()).unwrap();
        (session, latest_color)
    }

    #[tokio::test]
    async fn decoded_color_skips_an_unopened_sink() {
        let sink = Arc::new(RecordingSink::refusing_open());
        let (mut session, latest_color) = session_with(sink.clone());

        session.handle_packet(metadata_packet(&small_metadata())).await.unwrap();
        session.handle_packet(color_packet(1, vec![5; 24], true)).await.unwrap();

        let report = session.close().await.unwrap();
        assert_eq!(report.frames, 1);
        assert_eq!(report.sink_failures, 0);
        assert_eq!(latest_color.snapshot().unwrap().data(), &[5; 24]);
        assert!(sink.color_frames().is_empty());
        assert!(sink.opened().is_empty());
    }

    #[tokio::test]
    async fn summary_counts_decoder_sink_failures() {
        let (mut session, _latest_color) = session_with(Arc::new(RecordingSink::failing()));

        session.handle_packet(metadata_packet(&small_metadata())).await.unwrap();
        session.handle_packet(color_packet(1, vec![1; 24], true)).await.unwrap();
        session.handle_packet(depth_packet(2, encode_depth_png(2, 2, &[1000; 4]))).await.unwrap();
        assert_eq!(session.sink_failures(), 1);

        let summary = session.finish(StreamEnd::ConnectionClosed).await;
        let decoder = summary.decoder.unwrap();
        assert_eq!(decoder.frames, 1);
        assert_eq!(decoder.sink_failures, 1);
        assert_eq!(summary.sink_failures, 2);
    }
}
