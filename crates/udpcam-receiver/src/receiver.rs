use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};
use udpcam_protocol::snapshot::unix_nanos_now;
use udpcam_protocol::{AssemblyError, ChunkPacket, FrameAssembler, SnapshotPacket};
use udpcam_video::{DecodedImage, DisplayBuffer, FrameSink, ImageDecoder};

use crate::config::{ReceiverConfig, StreamMode};
use crate::reaper::FreshnessReaper;
use crate::recorder::Recorder;
use crate::stats::StatsCounter;
#[cfg(test)]
use crate::stats::Stats;

/// A decoded frame waiting in the display buffer.
#[derive(Debug)]
pub struct DisplayFrame {
    /// Frame id (chunked mode) or sender sequence (single-packet mode).
    pub sequence: u32,
    /// Capture-to-arrival latency; only known in single-packet mode.
    pub latency: Option<Duration>,
    pub image: DecodedImage,
}

/// What happened to one datagram.
#[derive(Debug, PartialEq, Eq)]
pub enum DatagramOutcome {
    /// Stored as a chunk of a frame still in flight.
    Buffered,
    /// Completed a frame that decoded and was queued for display.
    Queued,
    /// Completed a frame the decoder could not use.
    DecodeFailed,
    /// Rejected before touching any frame state.
    Malformed,
    /// Frame completed but reassembly found a gap; frame discarded.
    Discarded,
}

/// All receiver-side state, owned by one instance and driven by the
/// receive loop: partial frames, the display queue and the counters.
pub struct Receiver<D, S> {
    mode: StreamMode,
    assembler: FrameAssembler,
    display: DisplayBuffer<DisplayFrame>,
    stats: StatsCounter,
    reaper: FreshnessReaper,
    decoder: D,
    sink: S,
    recorder: Option<Recorder>,
}

impl<D: ImageDecoder, S: FrameSink> Receiver<D, S> {
    pub fn new(config: &ReceiverConfig, decoder: D, sink: S, now: Instant) -> Self {
        Self {
            mode: config.mode,
            assembler: FrameAssembler::new(),
            display: DisplayBuffer::new(config.display_capacity),
            stats: StatsCounter::new(config.stats_interval(), now),
            reaper: FreshnessReaper::new(config.max_frame_age(), config.reap_interval(), now),
            decoder,
            sink,
            recorder: None,
        }
    }

    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Route one received datagram. Errors stay local to this datagram.
    pub fn handle_datagram(&mut self, data: &[u8], now: Instant) -> DatagramOutcome {
        match self.mode {
            StreamMode::Chunked => self.handle_chunk(data, now),
            StreamMode::Single => self.handle_snapshot(data),
        }
    }

    fn handle_chunk(&mut self, data: &[u8], now: Instant) -> DatagramOutcome {
        let packet = match ChunkPacket::from_bytes(data) {
            Ok(p) => p,
            Err(e) => {
                debug!(len = data.len(), "dropping malformed chunk: {}", e);
                return DatagramOutcome::Malformed;
            }
        };
        let frame_id = packet.frame_id;

        match self.assembler.ingest(packet, now) {
            Ok(None) => DatagramOutcome::Buffered,
            Ok(Some(encoded)) => self.accept_frame(frame_id, None, encoded),
            Err(e @ AssemblyError::InvalidChunk { .. }) => {
                debug!("dropping chunk: {}", e);
                DatagramOutcome::Malformed
            }
            Err(e @ AssemblyError::MissingChunk { .. }) => {
                warn!("{}", e);
                DatagramOutcome::Discarded
            }
        }
    }

    fn handle_snapshot(&mut self, data: &[u8]) -> DatagramOutcome {
        let packet = match SnapshotPacket::from_bytes(data) {
            Ok(p) => p,
            Err(e) => {
                debug!(len = data.len(), "dropping malformed snapshot packet: {}", e);
                return DatagramOutcome::Malformed;
            }
        };
        let latency = packet.latency(unix_nanos_now());
        self.accept_frame(packet.sequence, Some(latency), packet.jpeg)
    }

    /// Decode a complete frame and queue it for display.
    fn accept_frame(
        &mut self,
        sequence: u32,
        latency: Option<Duration>,
        encoded: Vec<u8>,
    ) -> DatagramOutcome {
        let image = match self.decoder.decode(&encoded) {
            Ok(img) => img,
            Err(e) => {
                warn!(sequence, bytes = encoded.len(), "dropping undecodable frame: {:#}", e);
                return DatagramOutcome::DecodeFailed;
            }
        };
        self.stats.record_received();

        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record(sequence, latency, &encoded, &image);
        }

        let frame = DisplayFrame {
            sequence,
            latency,
            image,
        };
        if let Some(old) = self.display.push(frame) {
            trace!(sequence = old.sequence, "display buffer full, dropped oldest frame");
            self.stats.record_dropped(1);
        }
        DatagramOutcome::Queued
    }

    /// Hand at most one buffered frame to the sink. Returns whether one was rendered.
    pub fn render_one(&mut self) -> bool {
        let Some(frame) = self.display.pop() else {
            return false;
        };
        trace!(
            sequence = frame.sequence,
            latency_ms = frame.latency.map(|l| l.as_millis() as u64),
            "rendering frame"
        );
        self.sink.render(&frame.image);
        self.stats.record_displayed();
        true
    }

    /// Periodic work: reap stale partial frames and emit the stats report
    /// when their intervals have elapsed.
    pub fn housekeeping(&mut self, now: Instant) {
        let evicted = self.reaper.poll(now, &mut self.assembler);
        self.stats.record_incomplete(evicted as u64);

        if let Some(report) = self.stats.poll_report(now) {
            report.log(self.assembler.len());
        }
    }

    /// Release buffered frames and close the recorder.
    pub fn finish(&mut self) {
        let discarded = self.display.clear();
        let partial = self.assembler.len();
        self.assembler.reset();
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.finish();
        }
        let last = self.stats.current();
        info!(
            discarded,
            partial,
            received = last.received,
            displayed = last.displayed,
            "receiver stopped"
        );
    }

    /// Counters for the current reporting interval.
    #[cfg(test)]
    pub fn stats(&self) -> Stats {
        self.stats.current()
    }

    #[cfg(test)]
    pub fn assembler(&self) -> &FrameAssembler {
        &self.assembler
    }

    #[cfg(test)]
    pub fn buffered_frames(&self) -> usize {
        self.display.len()
    }

    #[cfg(test)]
    pub fn sink(&self) -> &S {
        &self.sink
    }
}
