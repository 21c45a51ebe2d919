use std::time::{Duration, Instant};

use tracing::debug;
use udpcam_protocol::FrameAssembler;

/// Evicts partial frames that can no longer complete in time.
///
/// Runs on its own cadence so memory stays bounded even when chunks stop
/// arriving altogether.
#[derive(Debug)]
pub struct FreshnessReaper {
    max_age: Duration,
    interval: Duration,
    last_sweep: Instant,
}

impl FreshnessReaper {
    pub fn new(max_age: Duration, interval: Duration, now: Instant) -> Self {
        Self {
            max_age,
            interval,
            last_sweep: now,
        }
    }

    /// Sweep if the cadence interval has passed. Returns the number of
    /// frames evicted (zero when no sweep ran).
    pub fn poll(&mut self, now: Instant, assembler: &mut FrameAssembler) -> usize {
        if now.saturating_duration_since(self.last_sweep) < self.interval {
            return 0;
        }
        self.last_sweep = now;
        self.sweep(now, assembler)
    }

    /// Sweep unconditionally.
    pub fn sweep(&self, now: Instant, assembler: &mut FrameAssembler) -> usize {
        let evicted = assembler.sweep(now, self.max_age);
        if evicted > 0 {
            debug!(evicted, remaining = assembler.len(), "reaped incomplete frames");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use udpcam_protocol::ChunkPacket;

    #[test]
    fn respects_cadence() {
        let start = Instant::now();
        let mut reaper =
            FreshnessReaper::new(Duration::from_millis(500), Duration::from_millis(100), start);
        let mut assembler = FrameAssembler::new();
        assembler
            .ingest(ChunkPacket::new(1, 0, 2, vec![1]), start)
            .unwrap();

        // Stale, but the cadence has not elapsed since the last sweep.
        reaper.last_sweep = start + Duration::from_millis(550);
        assert_eq!(reaper.poll(start + Duration::from_millis(600), &mut assembler), 0);
        assert!(assembler.contains(1));

        assert_eq!(reaper.poll(start + Duration::from_millis(700), &mut assembler), 1);
        assert!(assembler.is_empty());
    }

    #[test]
    fn fresh_frames_survive() {
        let start = Instant::now();
        let mut reaper =
            FreshnessReaper::new(Duration::from_millis(500), Duration::from_millis(100), start);
        let mut assembler = FrameAssembler::new();
        assembler
            .ingest(ChunkPacket::new(1, 0, 2, vec![1]), start + Duration::from_millis(300))
            .unwrap();

        assert_eq!(reaper.poll(start + Duration::from_millis(400), &mut assembler), 0);
        assert!(assembler.contains(1));
    }
}
