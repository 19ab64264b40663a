//! Feeder task: compressed payloads into the decoder's input

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// What the feeder did before it stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeederReport {
    pub written: u64,
    pub bytes: u64,
    /// Writes that failed, typically because the decoder already exited
    pub failed: u64,
}

/// Write payloads in arrival order until the queue closes or `cancel` fires
///
/// Write failures are counted and swallowed; the drain side reports a dead decoder.
/// The input is shut down on exit, which signals EOF to the decoder.
pub(crate) async fn run_feeder<W>(
    mut input: W,
    mut payloads: mpsc::Receiver<Vec<u8>>,
    cancel: CancellationToken,
) -> FeederReport
where
    W: AsyncWrite + Unpin,
{
    let mut report = FeederReport::default();

    loop {
        let payload = tokio::select! {
            _ = cancel.cancelled() => break,
            payload = payloads.recv() => match payload {
                Some(payload) => payload,
                None => break,
            },
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = write_payload(&mut input, &payload) => result,
        };

        match result {
            Ok(()) => {
                report.written += 1;
                report.bytes += payload.len() as u64;
                trace!(bytes = payload.len(), "Fed decoder");
            }
            Err(e) => {
                report.failed += 1;
                if report.failed == 1 {
                    warn!("Decoder input write failed: {}", e);
                } else {
                    debug!(failed = report.failed, "Decoder input write failed: {}", e);
                }
            }
        }
    }

    if let Err(e) = input.shutdown().await {
        debug!("Closing decoder input: {}", e);
    }
    debug!(?report, "Feeder stopped");
    report
}

async fn write_payload<W>(input: &mut W, payload: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    input.write_all(payload).await?;
    input.flush().await
}
