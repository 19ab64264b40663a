//! Receiver configuration
//!
//! All settings have defaults, so an empty document is a valid configuration:
//!
//! ```yaml
//! bind: 0.0.0.0:8888
//! max_payload_bytes: 67108864
//! stats_interval_ms: 2000
//! unknown_packets: skip
//! depth:
//!   min_m: 0.3
//!   max_m: 5.0
//!   invert: false
//!   output: normalized
//! color:
//!   resize_still_frames: true
//! decoder:
//!   program: ffmpeg
//!   queue_depth: 16
//!   shutdown_timeout_ms: 2000
//!   restart_on_exit: false
//!   max_restarts: 3
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::depth::{DepthNormalizer, DepthOutput, DepthRange};
use crate::wire::DEFAULT_MAX_PAYLOAD;
use crate::{Result, StreamError};

/// What to do with a packet whose type byte is not color, depth or metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownPacketPolicy {
    /// Discard the payload and keep reading
    #[default]
    Skip,
    /// End the connection with a protocol error
    Reject,
}

/// Top-level receiver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReceiverConfig {
    /// Listen address, `host:port`
    pub bind: String,
    pub max_payload_bytes: u32,
    /// Interval between throughput log lines; 0 disables them
    pub stats_interval_ms: u64,
    pub unknown_packets: UnknownPacketPolicy,
    pub depth: DepthConfig,
    pub color: ColorConfig,
    pub decoder: DecoderConfig,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8888".to_string(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD,
            stats_interval_ms: 2000,
            unknown_packets: UnknownPacketPolicy::Skip,
            depth: DepthConfig::default(),
            color: ColorConfig::default(),
            decoder: DecoderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DepthConfig {
    /// Depth mapped to black (white when inverted), meters
    pub min_m: f64,
    /// Depth mapped to white (black when inverted), meters
    pub max_m: f64,
    pub invert: bool,
    pub output: DepthOutput,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self { min_m: 0.3, max_m: 5.0, invert: false, output: DepthOutput::Normalized }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColorConfig {
    /// Resize still-image color frames to the advertised resolution
    pub resize_still_frames: bool,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self { resize_still_frames: true }
    }
}

/// External H.264 decoder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecoderConfig {
    pub program: String,
    /// Arguments; the decoder reads Annex-B on stdin and writes raw BGR24 on stdout
    pub args: Vec<String>,
    /// Compressed payloads buffered ahead of the decoder
    pub queue_depth: usize,
    pub shutdown_timeout_ms: u64,
    pub restart_on_exit: bool,
    pub max_restarts: u32,
}

impl DecoderConfig {
    pub const DEFAULT_ARGS: [&'static str; 12] = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "h264",
        "-i",
        "pipe:0",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "bgr24",
        "pipe:1",
    ];

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            args: Self::DEFAULT_ARGS.iter().map(|arg| arg.to_string()).collect(),
            queue_depth: 16,
            shutdown_timeout_ms: 2000,
            restart_on_exit: false,
            max_restarts: 3,
        }
    }
}

impl ReceiverConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ReceiverConfig = serde_yaml_ng::from_str(yaml)
            .map_err(|e| StreamError::config(format!("invalid YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading receiver config from {}", path.display());

        let text = std::fs::read_to_string(path).map_err(|e| StreamError::ConfigFile {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        let config: ReceiverConfig = serde_yaml_ng::from_str(&text).map_err(|e| {
            StreamError::ConfigFile { path: path.to_path_buf(), source: Box::new(e) }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every setting; run once before accepting a connection
    pub fn validate(&self) -> Result<()> {
        self.depth_range()?;

        match self.bind.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => {
                return Err(StreamError::config(format!(
                    "bind must be host:port, got '{}'",
                    self.bind
                )));
            }
        }
        if self.max_payload_bytes == 0 {
            return Err(StreamError::config("max_payload_bytes must be positive"));
        }
        if self.decoder.program.trim().is_empty() {
            return Err(StreamError::config("decoder.program must not be empty"));
        }
        if self.decoder.queue_depth == 0 {
            return Err(StreamError::config("decoder.queue_depth must be at least 1"));
        }
        if self.decoder.shutdown_timeout_ms == 0 {
            return Err(StreamError::config("decoder.shutdown_timeout_ms must be positive"));
        }
        Ok(())
    }

    pub fn depth_range(&self) -> Result<DepthRange> {
        DepthRange::new(self.depth.min_m, self.depth.max_m, self.depth.invert)
    }

    pub fn depth_normalizer(&self) -> Result<DepthNormalizer> {
        Ok(DepthNormalizer::new(self.depth_range()?, self.depth.output))
    }

    /// `None` when periodic stats logging is disabled
    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_ms > 0).then(|| Duration::from_millis(self.stats_interval_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = ReceiverConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, ReceiverConfig::default());
        assert_eq!(config.bind, "0.0.0.0:8888");
        assert_eq!(config.depth.min_m, 0.3);
        assert_eq!(config.depth.max_m, 5.0);
        assert_eq!(config.decoder.queue_depth, 16);
        assert_eq!(config.stats_interval(), Some(Duration::from_secs(2)));
        assert!(config.decoder.args.iter().any(|arg| arg == "bgr24"));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let yaml = r#"
depth:
  max_m: 3.0
  invert: true
  output: millimeters
decoder:
  restart_on_exit: true
unknown_packets: reject
stats_interval_ms: 0
"#;
        let config = ReceiverConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.depth.min_m, 0.3);
        assert_eq!(config.depth.max_m, 3.0);
        assert!(config.depth.invert);
        assert_eq!(config.depth.output, DepthOutput::Millimeters);
        assert!(config.decoder.restart_on_exit);
        assert_eq!(config.decoder.max_restarts, 3);
        assert_eq!(config.unknown_packets, UnknownPacketPolicy::Reject);
        assert_eq!(config.stats_interval(), None);
    }

    #[test]
    fn inverted_depth_bounds_fail_validation() {
        let err = ReceiverConfig::from_yaml_str("depth:\n  min_m: 5.0\n  max_m: 0.3\n").unwrap_err();
        assert!(matches!(err, StreamError::Config { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn rejects_bad_settings() {
        for yaml in [
            "bind: localhost",
            "bind: ':8888'",
            "max_payload_bytes: 0",
            "decoder:\n  program: ''",
            "decoder:\n  queue_depth: 0",
            "decoder:\n  shutdown_timeout_ms: 0",
            "unknown_field: 1",
            "unknown_packets: explode",
        ] {
            assert!(
                matches!(ReceiverConfig::from_yaml_str(yaml), Err(StreamError::Config { .. })),
                "expected config error for {:?}",
                yaml
            );
        }
    }

    #[test]
    fn missing_file_is_config_file_error() {
        let err = ReceiverConfig::load("/nonexistent/depthwire.yaml").unwrap_err();
        assert!(matches!(err, StreamError::ConfigFile { .. }));
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("depthwire-config-{}.yaml", std::process::id()));
        std::fs::write(&path, "bind: 127.0.0.1:9000\n").unwrap();

        let config = ReceiverConfig::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.bind, "127.0.0.1:9000");
    }
}
