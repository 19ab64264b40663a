//! Decoder backends
//!
//! A backend turns a frame geometry into a running decoder: a byte sink for compressed
//! payloads, a byte source of raw BGR24 frames, and a handle that can stop it. The pipeline
//! only ever sees these three pieces, so an external program and an in-process codec are
//! interchangeable.

use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, info, warn};

use crate::config::DecoderConfig;
use crate::types::FrameGeometry;
use crate::{Result, StreamError};

/// How a decoder process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Exited on its own or after the termination request; `None` when ended by a signal
    Exited(Option<i32>),
    /// Did not exit within the grace period and was force-killed
    Killed,
}

/// Control handle for a running decoder
#[async_trait::async_trait]
pub trait DecoderProcess: Send + 'static {
    /// Request graceful termination, wait up to `grace`, then force-kill
    async fn terminate(&mut self, grace: Duration) -> Result<ProcessExit>;

    /// OS process id, when there is one
    fn id(&self) -> Option<u32>;
}

/// The pieces of a freshly spawned decoder
pub struct DecoderHandles {
    /// Compressed payloads go here
    pub input: Box<dyn AsyncWrite + Send + Unpin>,
    /// Raw BGR24 frames come out here
    pub output: Box<dyn AsyncRead + Send + Unpin>,
    pub process: Box<dyn DecoderProcess>,
}

/// Factory for decoders
pub trait DecoderBackend: Send + Sync + 'static {
    /// Start a decoder producing frames of `geometry`
    fn spawn(&self, geometry: FrameGeometry) -> Result<DecoderHandles>;

    /// Short name for log lines
    fn name(&self) -> &str;
}

/// Runs an external program that reads H.264 on stdin and writes raw BGR24 on stdout
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
}

impl CommandBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    pub fn from_config(config: &DecoderConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for CommandBackend {
    fn default() -> Self {
        Self::from_config(&DecoderConfig::default())
    }
}

impl DecoderBackend for CommandBackend {
    fn spawn(&self, geometry: FrameGeometry) -> Result<DecoderHandles> {
        debug!(program = %self.program, args = ?self.args, %geometry, "Spawning decoder");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                StreamError::pipeline_with_source(
                    format!("failed to spawn decoder '{}'", self.program),
                    Box::new(e),
                )
            })?;

        let input = child
            .stdin
            .take()
            .ok_or_else(|| StreamError::pipeline("decoder stdin was not captured"))?;
        let output = child
            .stdout
            .take()
            .ok_or_else(|| StreamError::pipeline("decoder stdout was not captured"))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr, child.id()));
        }

        info!(program = %self.program, pid = ?child.id(), "Decoder process started");

        Ok(DecoderHandles {
            input: Box::new(input),
            output: Box::new(output),
            process: Box::new(ChildProcess { child }),
        })
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Decoder diagnostics end up in the log instead of the terminal
async fn forward_stderr(stderr: ChildStderr, pid: Option<u32>) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => warn!(pid = ?pid, "decoder: {}", line.trim_end()),
            Ok(None) => break,
            Err(e) => {
                debug!(pid = ?pid, "Stopped reading decoder stderr: {}", e);
                break;
            }
        }
    }
}

/// An OS child process
struct ChildProcess {
    child: Child,
}

impl ChildProcess {
    #[cfg(unix)]
    fn request_stop(&mut self) {
        if let Some(pid) = self.child.id() {
            // SAFETY: plain signal delivery to a child we spawned and have not yet reaped.
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if rc != 0 {
                debug!(pid, "SIGTERM failed: {}", std::io::Error::last_os_error());
            }
        }
    }

    #[cfg(not(unix))]
    fn request_stop(&mut self) {
        // No graceful signal here; closed stdin is the only polite request.
    }
}

#[async_trait::async_trait]
impl DecoderProcess for ChildProcess {
    async fn terminate(&mut self, grace: Duration) -> Result<ProcessExit> {
        let pid = self.child.id();

        let exited = self.child.try_wait().map_err(|e| StreamError::io("decoder wait", e))?;
        if let Some(status) = exited {
            debug!(pid = ?pid, ?status, "Decoder already exited");
            return Ok(ProcessExit::Exited(status.code()));
        }

        self.request_stop();

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(pid = ?pid, ?status, "Decoder exited");
                Ok(ProcessExit::Exited(status.code()))
            }
            Ok(Err(e)) => Err(StreamError::io("decoder wait", e)),
            Err(_) => {
                warn!(pid = ?pid, "Decoder did not exit within {:?}, killing", grace);
                self.child.kill().await.map_err(|e| StreamError::io("decoder kill", e))?;
                Ok(ProcessExit::Killed)
            }
        }
    }

    fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn missing_program_is_pipeline_error() {
        let backend = CommandBackend::new("/nonexistent/decoder-binary", vec![]);
        match backend.spawn(FrameGeometry::new(2, 2)) {
            Err(StreamError::Pipeline { reason, .. }) => assert!(reason.contains("failed to spawn")),
            Err(other) => panic!("Expected Pipeline error, got {:?}", other),
            Ok(_) => panic!("Expected spawn failure"),
        }
    }

    #[tokio::test]
    async fn cat_passes_bytes_through_and_exits_on_eof() {
        let backend = CommandBackend::new("cat", vec![]);
        let DecoderHandles { mut input, mut output, mut process } =
            backend.spawn(FrameGeometry::new(1, 1)).unwrap();
        assert!(process.id().is_some());

        input.write_all(&[1, 2, 3]).await.unwrap();
        input.flush().await.unwrap();
        drop(input);

        let mut echoed = Vec::new();
        output.read_to_end(&mut echoed).await.unwrap();
        assert_eq!(echoed, vec![1, 2, 3]);

        let exit = process.terminate(Duration::from_secs(2)).await.unwrap();
        assert!(matches!(exit, ProcessExit::Exited(_)), "unexpected exit {:?}", exit);
    }

    #[tokio::test]
    async fn sigterm_stops_a_blocked_process() {
        let backend = CommandBackend::new("sleep", vec!["30".to_string()]);
        let mut handles = backend.spawn(FrameGeometry::new(1, 1)).unwrap();

        let exit = handles.process.terminate(Duration::from_secs(2)).await.unwrap();
        assert_eq!(exit, ProcessExit::Exited(None));
    }
}
