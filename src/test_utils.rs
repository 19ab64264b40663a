//! Test utilities: in-memory decoders, a recording sink and packet builders
//!
//! Used by unit tests, integration tests and benchmarks so none of them needs an external
//! decoder binary or a capture device.

#![cfg(any(test, feature = "benchmark"))]

use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::pipeline::{DecoderBackend, DecoderHandles, DecoderProcess, ProcessExit};
use crate::sink::FrameSink;
use crate::types::{Frame, FrameGeometry, FramePacket, PacketKind, SessionMetadata, StreamKind};
use crate::{Result, StreamError};

/// Decoder that echoes its input: every `frame_size` bytes fed come back as one raw frame
///
/// Closing the input ends the output, like a real decoder reaching end of stream.
#[derive(Debug, Default)]
pub struct LoopbackBackend {
    spawned: AtomicUsize,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of decoders started
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

impl DecoderBackend for LoopbackBackend {
    fn spawn(&self, geometry: FrameGeometry) -> Result<DecoderHandles> {
        self.spawned.fetch_add(1, Ordering::SeqCst);

        let capacity = geometry.frame_size().clamp(64, 1 << 20);
        let (input, mut decoder_in) = tokio::io::duplex(capacity);
        let (mut decoder_out, output) = tokio::io::duplex(capacity);
        let task = tokio::spawn(async move {
            let _ = tokio::io::copy(&mut decoder_in, &mut decoder_out).await;
        });

        Ok(DecoderHandles {
            input: Box::new(input),
            output: Box::new(output),
            process: Box::new(TaskProcess { task }),
        })
    }

    fn name(&self) -> &str {
        "loopback"
    }
}

/// Decoder that swallows input and exits immediately without producing frames
#[derive(Debug, Default)]
pub struct SilentBackend {
    spawned: AtomicUsize,
}

impl SilentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

impl DecoderBackend for SilentBackend {
    fn spawn(&self, _geometry: FrameGeometry) -> Result<DecoderHandles> {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(DecoderHandles {
            input: Box::new(tokio::io::sink()),
            output: Box::new(tokio::io::empty()),
            process: Box::new(TaskProcess { task: tokio::spawn(async {}) }),
        })
    }

    fn name(&self) -> &str {
        "silent"
    }
}

/// Backend whose decoder can never be started
#[derive(Debug, Default)]
pub struct BrokenBackend;

impl DecoderBackend for BrokenBackend {
    fn spawn(&self, _geometry: FrameGeometry) -> Result<DecoderHandles> {
        Err(StreamError::pipeline("decoder binary not installed"))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

/// Decoder that hangs: it never reads its input and never writes output
///
/// Only termination ends it, so every feed past the queue depth waits.
#[derive(Debug, Default)]
pub struct StallBackend;

impl DecoderBackend for StallBackend {
    fn spawn(&self, _geometry: FrameGeometry) -> Result<DecoderHandles> {
        let (input, decoder_in) = tokio::io::duplex(64);
        let (decoder_out, output) = tokio::io::duplex(64);
        let task = tokio::spawn(async move {
            let _held = (decoder_in, decoder_out);
            std::future::pending::<()>().await;
        });

        Ok(DecoderHandles {
            input: Box::new(input),
            output: Box::new(output),
            process: Box::new(TaskProcess { task }),
        })
    }

    fn name(&self) -> &str {
        "stall"
    }
}

/// A decoder "process" that is really a task
struct TaskProcess {
    task: JoinHandle<()>,
}

#[async_trait::async_trait]
impl DecoderProcess for TaskProcess {
    async fn terminate(&mut self, grace: Duration) -> Result<ProcessExit> {
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(_) => Ok(ProcessExit::Exited(Some(0))),
            Err(_) => {
                self.task.abort();
                Ok(ProcessExit::Killed)
            }
        }
    }

    fn id(&self) -> Option<u32> {
        None
    }
}

/// Sink that keeps everything it is given
#[derive(Debug, Default)]
pub struct RecordingSink {
    fail_open: bool,
    fail_publish: bool,
    opened: Mutex<Vec<(StreamKind, u32, u32, u32)>>,
    color: Mutex<Vec<Frame>>,
    depth: Mutex<Vec<Frame>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose publish calls always fail
    pub fn failing() -> Self {
        Self { fail_publish: true, ..Self::default() }
    }

    /// A sink whose outputs can never be opened
    pub fn refusing_open() -> Self {
        Self { fail_open: true, ..Self::default() }
    }

    /// `(kind, width, height, fps)` for every open call
    pub fn opened(&self) -> Vec<(StreamKind, u32, u32, u32)> {
        self.opened.lock().map(|opened| opened.clone()).unwrap_or_default()
    }

    pub fn color_frames(&self) -> Vec<Frame> {
        self.color.lock().map(|frames| frames.clone()).unwrap_or_default()
    }

    pub fn depth_frames(&self) -> Vec<Frame> {
        self.depth.lock().map(|frames| frames.clone()).unwrap_or_default()
    }

    fn record(&self, kind: StreamKind, frame: &Frame) -> Result<()> {
        if self.fail_publish {
            return Err(StreamError::sink(kind.as_str(), "recording sink set to fail"));
        }
        let frames = match kind {
            StreamKind::Color => &self.color,
            StreamKind::Depth => &self.depth,
        };
        if let Ok(mut frames) = frames.lock() {
            frames.push(frame.clone());
        }
        Ok(())
    }

    fn open(&self, kind: StreamKind, width: u32, height: u32, fps: u32) -> Result<()> {
        if self.fail_open {
            return Err(StreamError::sink(kind.as_str(), "recording sink refused to open"));
        }
        if let Ok(mut opened) = self.opened.lock() {
            opened.push((kind, width, height, fps));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl FrameSink for RecordingSink {
    async fn open_color(&self, width: u32, height: u32, fps: u32) -> Result<()> {
        self.open(StreamKind::Color, width, height, fps)
    }

    async fn open_depth(&self, width: u32, height: u32, fps: u32) -> Result<()> {
        self.open(StreamKind::Depth, width, height, fps)
    }

    async fn publish_color(&self, frame: &Frame) -> Result<()> {
        self.record(StreamKind::Color, frame)
    }

    async fn publish_depth(&self, frame: &Frame) -> Result<()> {
        self.record(StreamKind::Depth, frame)
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Metadata packet carrying `metadata` as camelCase JSON
pub fn metadata_packet(metadata: &SessionMetadata) -> FramePacket {
    let json = serde_json::to_vec(metadata).unwrap_or_default();
    FramePacket::new(PacketKind::Metadata, 0.0, 0, json, false)
}

/// Metadata for an H.264 session with the given color and depth sizes
pub fn h264_metadata(color: FrameGeometry, depth: FrameGeometry) -> SessionMetadata {
    SessionMetadata {
        session_id: "test-session".to_string(),
        rgb_width: color.width,
        rgb_height: color.height,
        depth_width: depth.width,
        depth_height: depth.height,
        fps: 30,
        ..SessionMetadata::default()
    }
}

pub fn color_packet(sequence: u32, payload: Vec<u8>, is_keyframe: bool) -> FramePacket {
    FramePacket::new(PacketKind::Color, sequence as f64 / 30.0, sequence, payload, is_keyframe)
}

pub fn depth_packet(sequence: u32, payload: Vec<u8>) -> FramePacket {
    FramePacket::new(PacketKind::Depth, sequence as f64 / 30.0, sequence, payload, false)
}

/// 16-bit grayscale PNG of millimeter samples
pub fn encode_depth_png(width: u32, height: u32, millimeters: &[u16]) -> Vec<u8> {
    let buffer = ImageBuffer::<Luma<u16>, _>::from_raw(width, height, millimeters.to_vec())
        .unwrap_or_else(|| ImageBuffer::new(width, height));
    encode(DynamicImage::ImageLuma16(buffer), ImageFormat::Png)
}

/// Solid-color RGB PNG
pub fn encode_rgb_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    encode(DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb))), ImageFormat::Png)
}

/// Solid-color RGB JPEG
pub fn encode_rgb_jpeg(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    encode(DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb))), ImageFormat::Jpeg)
}

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    if let Err(e) = image.write_to(&mut Cursor::new(&mut bytes), format) {
        panic!("failed to encode test image: {}", e);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::decode_depth;

    #[test]
    fn depth_png_round_trips_samples() {
        let payload = encode_depth_png(2, 2, &[0, 1000, 2000, 65535]);
        let depth = decode_depth(&payload).unwrap();
        assert_eq!(depth.millimeters(), &[0, 1000, 2000, 65535]);
    }

    #[test]
    fn metadata_packet_parses_back() {
        let metadata = h264_metadata(FrameGeometry::new(640, 480), FrameGeometry::new(256, 192));
        let packet = metadata_packet(&metadata);
        assert_eq!(packet.kind, PacketKind::Metadata);
        assert_eq!(SessionMetadata::parse(&packet.payload).unwrap(), metadata);
    }

    #[tokio::test]
    async fn recording_sink_records_and_fails_on_request() {
        let frame = Frame::new(1, 1, crate::PixelFormat::Gray8, vec![1]).unwrap();

        let sink = RecordingSink::new();
        sink.open_depth(1, 1, 30).await.unwrap();
        sink.publish_depth(&frame).await.unwrap();
        assert_eq!(sink.opened(), vec![(StreamKind::Depth, 1, 1, 30)]);
        assert_eq!(sink.depth_frames().len(), 1);

        let failing = RecordingSink::failing();
        assert!(matches!(failing.publish_color(&frame).await, Err(StreamError::Sink { .. })));

        let refusing = RecordingSink::refusing_open();
        assert!(refusing.open_color(1, 1, 30).await.is_err());
        assert!(refusing.opened().is_empty());
    }
}
