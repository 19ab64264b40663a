//! Error types for stream reception and decoding.
//!
//! Every failure in the receiver falls into one of a small number of categories, and the
//! category decides what happens next:
//!
//! - **Protocol**: short reads, malformed headers, unusable metadata. Fatal to the connection.
//! - **Codec**: a single color or depth frame could not be decoded. The frame is dropped.
//! - **Pipeline**: the external decoder process died or its pipes broke. Packet-level I/O is
//!   swallowed; the pipeline reports a lifecycle transition instead.
//! - **Config**: invalid settings detected before any connection is accepted.
//! - **Sink**: a downstream output refused a frame. Logged, never fatal.
//!
//! ```rust
//! use depthwire::{ErrorCategory, StreamError};
//!
//! let error = StreamError::codec("depth", "not a PNG stream");
//! assert_eq!(error.category(), ErrorCategory::Codec);
//! assert!(!error.is_fatal());
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for receiver operations.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Coarse classification used to decide between dropping a frame and ending a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Protocol,
    Codec,
    Pipeline,
    Config,
    Sink,
}

/// Main error type for receiver operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StreamError {
    #[error("Protocol error in {context}: {details}")]
    Protocol { context: String, details: String },

    #[error("Connection error: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Failed to decode {stream} frame: {details}")]
    Codec { stream: String, details: String },

    #[error("Unsupported depth sample type: {sample_type}")]
    UnsupportedDepth { sample_type: String },

    #[error("Decoder pipeline error: {reason}")]
    Pipeline {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Configuration file error: {path}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Sink rejected {stream} output: {reason}")]
    Sink { stream: String, reason: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("I/O error during {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

impl StreamError {
    /// Returns the taxonomy bucket this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            StreamError::Protocol { .. } => ErrorCategory::Protocol,
            StreamError::Connection { .. } => ErrorCategory::Protocol,
            StreamError::Io { .. } => ErrorCategory::Protocol,
            StreamError::Codec { .. } => ErrorCategory::Codec,
            StreamError::UnsupportedDepth { .. } => ErrorCategory::Codec,
            StreamError::Pipeline { .. } => ErrorCategory::Pipeline,
            StreamError::Timeout { .. } => ErrorCategory::Pipeline,
            StreamError::Config { .. } => ErrorCategory::Config,
            StreamError::ConfigFile { .. } => ErrorCategory::Config,
            StreamError::Sink { .. } => ErrorCategory::Sink,
        }
    }

    /// Returns whether this error ends the connection (or prevents it from starting).
    ///
    /// Codec, pipeline and sink errors are handled per frame and never end a session.
    pub fn is_fatal(&self) -> bool {
        matches!(self.category(), ErrorCategory::Protocol | ErrorCategory::Config)
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StreamError::Protocol { .. } => vec![
                "Check that the sender and receiver use the same protocol version",
                "Verify nothing else is writing to the receiver port",
                "Reconnect the capture device",
            ],
            StreamError::Connection { .. } => vec![
                "Check that the bind address is free",
                "Verify the device and receiver are on the same network",
                "Restart the capture app on the device",
            ],
            StreamError::Codec { .. } => vec![
                "Check the encoding advertised in session metadata",
                "Inspect the sender for corrupted frames",
            ],
            StreamError::UnsupportedDepth { .. } => vec![
                "Send depth as 16-bit PNG, 32-bit float or 8-bit grayscale",
                "Check the depth compression format on the sender",
            ],
            StreamError::Pipeline { .. } => vec![
                "Verify the decoder program is installed and on PATH",
                "Check decoder warnings in the log output",
                "Enable decoder restarts in the configuration",
            ],
            StreamError::Timeout { .. } => vec![
                "Increase the decoder shutdown timeout",
                "Check whether the decoder process is hung",
            ],
            StreamError::Config { .. } => vec![
                "Fix the reported setting and restart",
                "Compare against the documented defaults",
            ],
            StreamError::ConfigFile { .. } => vec![
                "Check the configuration file exists and is readable",
                "Validate the YAML syntax",
            ],
            StreamError::Sink { .. } => vec![
                "Check that the output device is still available",
                "Verify the output resolution matches session metadata",
            ],
            StreamError::Io { .. } => vec![
                "Check network connectivity",
                "Reconnect the capture device",
            ],
        }
    }

    /// Helper constructor for protocol errors.
    pub fn protocol(context: impl Into<String>, details: impl Into<String>) -> Self {
        StreamError::Protocol { context: context.into(), details: details.into() }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        StreamError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        StreamError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for codec errors.
    pub fn codec(stream: impl Into<String>, details: impl Into<String>) -> Self {
        StreamError::Codec { stream: stream.into(), details: details.into() }
    }

    /// Helper constructor for pipeline errors.
    pub fn pipeline(reason: impl Into<String>) -> Self {
        StreamError::Pipeline { reason: reason.into(), source: None }
    }

    /// Helper constructor for pipeline errors with source.
    pub fn pipeline_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        StreamError::Pipeline { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        StreamError::Config { reason: reason.into() }
    }

    /// Helper constructor for sink errors.
    pub fn sink(stream: impl Into<String>, reason: impl Into<String>) -> Self {
        StreamError::Sink { stream: stream.into(), reason: reason.into() }
    }

    /// Helper constructor for I/O errors with an operation label.
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        StreamError::Io { operation: operation.into(), source }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::Io { operation: "unknown".to_string(), source: err }
    }
}

impl From<image::ImageError> for StreamError {
    fn from(err: image::ImageError) -> Self {
        StreamError::Codec { stream: "image".to_string(), details: err.to_string() }
    }
}
