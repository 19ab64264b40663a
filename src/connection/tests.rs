//! Connection-level tests over in-memory streams

use super::*;
use crate::config::ReceiverConfig;
use crate::pipeline::{DecoderBackend, DrainEnd, PipelineState};
use crate::providers::StreamProvider;
use crate::session::StreamEnd;
use crate::test_utils::{
    LoopbackBackend, RecordingSink, StallBackend, color_packet, depth_packet, encode_depth_png,
    h264_metadata, metadata_packet,
};
use crate::types::{FrameGeometry, PixelFormat, StreamKind, UpdateRate};
use crate::{NullSink, StreamError};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};

fn connect(config: &ReceiverConfig) -> (DuplexStream, ReceiverConnection) {
    connect_with(config, Arc::new(LoopbackBackend::new()))
}

fn connect_with(
    config: &ReceiverConfig,
    backend: Arc<dyn DecoderBackend>,
) -> (DuplexStream, ReceiverConnection) {
    let (tx, rx) = tokio::io::duplex(256 * 1024);
    let provider = StreamProvider::with_peer(rx, config.max_payload_bytes, "test-device");
    let connection =
        ReceiverConnection::from_provider(provider, config, Arc::new(RecordingSink::new()), backend)
            .unwrap();
    (tx, connection)
}

#[tokio::test]
async fn metadata_then_frames_reach_snapshots() {
    let (mut tx, mut connection) = connect(&ReceiverConfig::default());
    assert!(connection.metadata().is_none());
    assert_eq!(connection.source_hz(), 30.0);

    let mut metadata = h264_metadata(FrameGeometry::new(4, 4), FrameGeometry::new(2, 2));
    metadata.fps = 15;
    tx.write_all(&metadata_packet(&metadata).to_bytes()).await.unwrap();

    let received = connection.wait_for_metadata(Duration::from_secs(1)).await.unwrap();
    assert_eq!(received.rgb_width, 4);
    assert_eq!(connection.source_hz(), 15.0);

    let mut colors = connection.color_frames(UpdateRate::Native);
    tx.write_all(&color_packet(1, vec![3; 48], true).to_bytes()).await.unwrap();
    let color = tokio::time::timeout(Duration::from_secs(1), colors.next()).await.unwrap().unwrap();
    assert_eq!(color.format(), PixelFormat::Bgr24);
    assert_eq!(color.data().len(), 48);

    tx.write_all(&depth_packet(2, encode_depth_png(2, 2, &[0; 4])).to_bytes()).await.unwrap();
    drop(tx);

    let summary = connection.finished().await.unwrap();
    assert_eq!(summary.end, StreamEnd::ConnectionClosed);
    assert_eq!(connection.latest_depth().unwrap().data(), &[0; 4]);
    assert!(connection.latest_color().is_some());
    assert_eq!(connection.pipeline_state(), PipelineState::Stopped);
    assert!(connection.finished().await.is_err());
}

#[tokio::test]
async fn shutdown_cancels_a_silent_sender() {
    let (_tx, connection) = connect(&ReceiverConfig::default());
    assert_eq!(connection.peer(), "test-device");

    let summary = connection.shutdown().await.unwrap();
    assert_eq!(summary.end, StreamEnd::Cancelled);
}

#[tokio::test]
async fn metadata_wait_times_out() {
    let (_tx, connection) = connect(&ReceiverConfig::default());

    let result = connection.wait_for_metadata(Duration::from_millis(20)).await;
    assert!(matches!(result, Err(StreamError::Timeout { .. })));
}

#[tokio::test]
async fn shutdown_is_bounded_with_a_stalled_decoder() {
    let config = ReceiverConfig::default();
    let (mut tx, connection) = connect_with(&config, Arc::new(StallBackend));
    let geometry = FrameGeometry::new(4, 4);

    let metadata = h264_metadata(geometry, FrameGeometry::new(2, 2));
    tx.write_all(&metadata_packet(&metadata).to_bytes()).await.unwrap();
    for sequence in 1..=40 {
        let packet = color_packet(sequence, vec![0; geometry.frame_size()], sequence == 1);
        tx.write_all(&packet.to_bytes()).await.unwrap();
    }

    // Past the queue depth the receive task is parked inside a feed
    let stats = connection.stats();
    tokio::time::timeout(Duration::from_secs(2), async {
        while stats.totals(StreamKind::Color).received <= config.decoder.queue_depth as u64 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(stats.totals(StreamKind::Color).received < 40);

    let summary = tokio::time::timeout(Duration::from_secs(5), connection.shutdown())
        .await
        .expect("shutdown hung behind a stalled decoder")
        .unwrap();
    assert_eq!(summary.end, StreamEnd::Cancelled);
    assert!(summary.dropped.color >= 1);
    assert_eq!(summary.decoder.unwrap().end, DrainEnd::Cancelled);
}

#[tokio::test]
async fn metadata_wait_sees_a_late_record() {
    let (mut tx, connection) = connect(&ReceiverConfig::default());
    let metadata = h264_metadata(FrameGeometry::new(2, 2), FrameGeometry::new(2, 2));

    let sent = metadata.clone();
    let sender = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.write_all(&metadata_packet(&sent).to_bytes()).await.unwrap();
        tx
    });

    let received = connection.wait_for_metadata(Duration::from_secs(2)).await.unwrap();
    assert_eq!(*received, metadata);
    drop(sender.await.unwrap());
}

#[tokio::test]
async fn metadata_wait_fails_when_the_connection_ends_first() {
    let (tx, connection) = connect(&ReceiverConfig::default());
    drop(tx);

    let result = connection.wait_for_metadata(Duration::from_secs(2)).await;
    assert!(matches!(result, Err(StreamError::Connection { .. })));
}

#[tokio::test]
async fn metadata_stream_yields_once() {
    let (mut tx, connection) = connect(&ReceiverConfig::default());
    let mut updates = connection.metadata_updates().boxed();

    let metadata = h264_metadata(FrameGeometry::new(2, 2), FrameGeometry::new(2, 2));
    tx.write_all(&metadata_packet(&metadata).to_bytes()).await.unwrap();
    tx.write_all(&metadata_packet(&metadata).to_bytes()).await.unwrap();
    drop(tx);

    assert_eq!(updates.next().await.as_deref(), Some(&metadata));
    assert_eq!(updates.next().await, None);
}

#[tokio::test]
async fn listen_rejects_invalid_config() {
    let config = ReceiverConfig { bind: "no-port".to_string(), ..ReceiverConfig::default() };

    let result = ReceiverConnection::listen(&config, Arc::new(NullSink)).await;
    assert!(matches!(result, Err(StreamError::Config { .. })));
}
