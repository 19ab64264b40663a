//! Per-stream throughput counters

use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::types::StreamKind;

#[derive(Debug, Default)]
struct KindCounters {
    received: AtomicU64,
    bytes: AtomicU64,
    published: AtomicU64,
}

impl KindCounters {
    fn totals(&self) -> KindTotals {
        KindTotals {
            received: self.received.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
        }
    }
}

/// Counters shared between the receive task and the drain task
///
/// Counters only ever increase. They are used for reporting and never gate control flow.
#[derive(Debug, Default)]
pub struct StreamStats {
    started: OnceLock<Instant>,
    color: KindCounters,
    depth: KindCounters,
}

impl StreamStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of the measurement window; later calls are ignored
    pub fn mark_started(&self) {
        let _ = self.started.set(Instant::now());
    }

    /// Count one received packet of `bytes` payload bytes
    pub fn record(&self, kind: StreamKind, bytes: usize) {
        let counters = self.counters(kind);
        counters.received.fetch_add(1, Ordering::Relaxed);
        counters.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Count one frame handed to the latest-frame buffer
    pub fn record_published(&self, kind: StreamKind) {
        self.counters(kind).published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn totals(&self, kind: StreamKind) -> KindTotals {
        self.counters(kind).totals()
    }

    /// Time since [`mark_started`](Self::mark_started), if it was called
    pub fn elapsed(&self) -> Option<Duration> {
        self.started.get().map(Instant::elapsed)
    }

    /// Rates over `elapsed`; `None` when no time has passed
    pub fn snapshot(&self, elapsed: Duration) -> Option<StatsSnapshot> {
        let seconds = elapsed.as_secs_f64();
        if seconds <= 0.0 {
            return None;
        }

        Some(StatsSnapshot {
            elapsed,
            color: KindRates::from_totals(self.color.totals(), seconds),
            depth: KindRates::from_totals(self.depth.totals(), seconds),
        })
    }

    /// Rates since the start mark
    pub fn snapshot_now(&self) -> Option<StatsSnapshot> {
        self.snapshot(self.elapsed()?)
    }

    fn counters(&self, kind: StreamKind) -> &KindCounters {
        match kind {
            StreamKind::Color => &self.color,
            StreamKind::Depth => &self.depth,
        }
    }
}

/// Raw counter values for one stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindTotals {
    pub received: u64,
    pub bytes: u64,
    pub published: u64,
}

/// Derived rates for one stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KindRates {
    pub totals: KindTotals,
    pub received_fps: f64,
    pub published_fps: f64,
    pub kbps: f64,
}

impl KindRates {
    fn from_totals(totals: KindTotals, seconds: f64) -> Self {
        Self {
            totals,
            received_fps: totals.received as f64 / seconds,
            published_fps: totals.published as f64 / seconds,
            kbps: (totals.bytes as f64 * 8.0 / 1000.0) / seconds,
        }
    }
}

/// Point-in-time throughput report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub elapsed: Duration,
    pub color: KindRates,
    pub depth: KindRates,
}

impl StatsSnapshot {
    pub fn total_kbps(&self) -> f64 {
        self.color.kbps + self.depth.kbps
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RX color/depth fps: {:.1}/{:.1} | PUB color/depth fps: {:.1}/{:.1} | BW kbps: {:.0}",
            self.color.received_fps,
            self.depth.received_fps,
            self.color.published_fps,
            self.depth.published_fps,
            self.total_kbps()
        )
    }
}
