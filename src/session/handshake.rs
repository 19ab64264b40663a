//! Metadata handshake: the first metadata record sizes every output

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::Result;
use crate::sink::FrameSink;
use crate::types::{ColorEncoding, SessionMetadata};

/// How a metadata record relates to the session so far
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MetadataOutcome {
    /// First record; the session becomes active
    Accepted(Arc<SessionMetadata>),
    /// Same values as the accepted record
    Repeated,
    /// Different values; ignored because the first record wins
    Conflicting(SessionMetadata),
}

/// Parse a metadata payload and compare it with the record already accepted
///
/// Malformed payloads are protocol errors regardless of session state.
pub(crate) fn review_metadata(
    current: Option<&SessionMetadata>,
    payload: &[u8],
) -> Result<MetadataOutcome> {
    let metadata = SessionMetadata::parse(payload)?;

    Ok(match current {
        None => MetadataOutcome::Accepted(Arc::new(metadata)),
        Some(current) if *current == metadata => MetadataOutcome::Repeated,
        Some(_) => MetadataOutcome::Conflicting(metadata),
    })
}

/// Which sink outputs opened successfully
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct OpenOutputs {
    pub color: bool,
    pub depth: bool,
}

/// Open both sink outputs at the advertised resolutions
///
/// A sink that refuses is logged and left closed; frames still reach the buffers.
pub(crate) async fn open_outputs(sink: &dyn FrameSink, metadata: &SessionMetadata) -> OpenOutputs {
    let mut outputs = OpenOutputs::default();

    match sink.open_color(metadata.rgb_width, metadata.rgb_height, metadata.fps).await {
        Ok(()) => outputs.color = true,
        Err(e) => warn!(sink = sink.name(), "Failed to open color output: {}", e),
    }
    match sink.open_depth(metadata.depth_width, metadata.depth_height, metadata.fps).await {
        Ok(()) => outputs.depth = true,
        Err(e) => warn!(sink = sink.name(), "Failed to open depth output: {}", e),
    }

    debug!(sink = sink.name(), ?outputs, "Sink outputs opened");
    outputs
}

pub(crate) fn log_accepted(metadata: &SessionMetadata) {
    info!(
        session = %metadata.session_id,
        color = %metadata.color_geometry(),
        depth = %metadata.depth_geometry(),
        fps = metadata.fps,
        bitrate = metadata.rgb_bitrate,
        encoding = %metadata.rgb_encoding,
        "Session metadata received"
    );
    if metadata.rgb_encoding == ColorEncoding::Unsupported {
        warn!("Color encoding is not supported; color packets will be dropped");
    }
}
