//! Downstream frame consumers

use crate::Result;
use crate::types::Frame;

/// A consumer of decoded frames, such as a display window or a virtual camera writer
///
/// Outputs are opened once, when session metadata fixes the resolutions. Every method
/// reports failure through its `Result`; the receiver logs failures and keeps going.
#[async_trait::async_trait]
pub trait FrameSink: Send + Sync + 'static {
    async fn open_color(&self, width: u32, height: u32, fps: u32) -> Result<()>;

    async fn open_depth(&self, width: u32, height: u32, fps: u32) -> Result<()>;

    /// Receive one BGR24 color frame
    async fn publish_color(&self, frame: &Frame) -> Result<()>;

    /// Receive one depth frame in the configured depth output format
    async fn publish_depth(&self, frame: &Frame) -> Result<()>;

    /// Short name for log lines
    fn name(&self) -> &str {
        "sink"
    }
}

/// Sink that accepts and discards everything
///
/// For consumers that only read the latest-frame buffers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait::async_trait]
impl FrameSink for NullSink {
    async fn open_color(&self, _width: u32, _height: u32, _fps: u32) -> Result<()> {
        Ok(())
    }

    async fn open_depth(&self, _width: u32, _height: u32, _fps: u32) -> Result<()> {
        Ok(())
    }

    async fn publish_color(&self, _frame: &Frame) -> Result<()> {
        Ok(())
    }

    async fn publish_depth(&self, _frame: &Frame) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}
