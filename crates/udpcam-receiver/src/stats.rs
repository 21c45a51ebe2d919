use std::time::{Duration, Instant};

use tracing::info;

/// Counters for one reporting interval.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Frames decoded successfully.
    pub received: u64,
    /// Frames handed to the sink.
    pub displayed: u64,
    /// Decoded frames evicted from a full display buffer.
    pub dropped: u64,
    /// Partial frames reaped before completing.
    pub incomplete: u64,
}

/// A closed reporting interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsReport {
    pub stats: Stats,
    pub elapsed: Duration,
}

impl StatsReport {
    /// Displayed frames per second over the interval.
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.stats.displayed as f64 / secs
        } else {
            0.0
        }
    }

    pub fn log(&self, partial_frames: usize) {
        info!(
            received = self.stats.received,
            displayed = self.stats.displayed,
            dropped = self.stats.dropped,
            incomplete = self.stats.incomplete,
            fps = %format!("{:.1}", self.fps()),
            partial_frames,
            elapsed_secs = %format!("{:.1}", self.elapsed.as_secs_f64()),
            "receiver stats"
        );
    }
}

/// Rolling counters that close and reset on a fixed wall-clock interval.
#[derive(Debug)]
pub struct StatsCounter {
    current: Stats,
    interval: Duration,
    interval_start: Instant,
}

impl StatsCounter {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            current: Stats::default(),
            interval,
            interval_start: now,
        }
    }

    pub fn record_received(&mut self) {
        self.current.received += 1;
    }

    pub fn record_displayed(&mut self) {
        self.current.displayed += 1;
    }

    pub fn record_dropped(&mut self, n: u64) {
        self.current.dropped += n;
    }

    pub fn record_incomplete(&mut self, n: u64) {
        self.current.incomplete += n;
    }

    /// Counters for the interval in progress.
    pub fn current(&self) -> Stats {
        self.current
    }

    /// Close the interval if it has run its length. The counters and the
    /// interval clock are reset together.
    pub fn poll_report(&mut self, now: Instant) -> Option<StatsReport> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }
        let stats = std::mem::take(&mut self.current);
        self.interval_start = now;
        Some(StatsReport { stats, elapsed })
    }
}
