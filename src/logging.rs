//! Tracing subscriber setup for applications embedding the receiver

use tracing_subscriber::EnvFilter;

use crate::{Result, StreamError};

/// Install a formatted subscriber filtered by `RUST_LOG`, or `default_directive` when unset
///
/// Fails when the directive is invalid or a global subscriber is already installed.
pub fn init_tracing(default_directive: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive).map_err(|e| {
            StreamError::config(format!("invalid log directive '{}': {}", default_directive, e))
        })?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| StreamError::config(format!("failed to install tracing subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_an_error() {
        let _ = init_tracing("depthwire=debug");
        assert!(matches!(init_tracing("info"), Err(StreamError::Config { .. })));
    }
}
