use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};
use udpcam_video::DecodedImage;

use crate::config::RecordConfig;

/// Metadata line written per recorded frame.
#[derive(Debug, Serialize)]
struct RecordEntry {
    sequence: u32,
    latency_ms: Option<f64>,
    width: u32,
    height: u32,
    bytes: usize,
}

/// Best-effort recording of decoded frames: the encoded bytes go to an
/// MJPEG stream file, metadata to a JSON-lines log.
///
/// The first write error disables the recorder. Recording never feeds back
/// into frame handling.
pub struct Recorder {
    video: BufWriter<File>,
    log: BufWriter<File>,
    frames: u64,
    failed: bool,
}

impl Recorder {
    pub fn open(config: &RecordConfig) -> Result<Self> {
        let video = open_append(&config.video_path)
            .with_context(|| format!("failed to open video file: {}", config.video_path.display()))?;
        let log = open_append(&config.log_path)
            .with_context(|| format!("failed to open frame log: {}", config.log_path.display()))?;
        info!(
            video = %config.video_path.display(),
            log = %config.log_path.display(),
            "recording enabled"
        );
        Ok(Self {
            video: BufWriter::new(video),
            log: BufWriter::new(log),
            frames: 0,
            failed: false,
        })
    }

    pub fn record(
        &mut self,
        sequence: u32,
        latency: Option<Duration>,
        encoded: &[u8],
        image: &DecodedImage,
    ) {
        if self.failed {
            return;
        }
        let entry = RecordEntry {
            sequence,
            latency_ms: latency.map(|l| l.as_micros() as f64 / 1000.0),
            width: image.width,
            height: image.height,
            bytes: encoded.len(),
        };
        if let Err(e) = self.write_entry(&entry, encoded) {
            warn!(sequence, "recording failed, disabling recorder: {:#}", e);
            self.failed = true;
            return;
        }
        self.frames += 1;
    }

    fn write_entry(&mut self, entry: &RecordEntry, encoded: &[u8]) -> Result<()> {
        self.video.write_all(encoded)?;
        serde_json::to_writer(&mut self.log, entry)?;
        self.log.write_all(b"\n")?;
        Ok(())
    }

    /// Flush both files. Called on shutdown.
    pub fn finish(&mut self) {
        if let Err(e) = self.video.flush().and_then(|_| self.log.flush()) {
            warn!("failed to flush recording: {}", e);
        }
        info!(frames = self.frames, "recording closed");
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> DecodedImage {
        DecodedImage {
            width: 2,
            height: 1,
            rgb: vec![0; 6],
        }
    }

    #[test]
    fn records_frames_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecordConfig {
            video_path: dir.path().join("out.mjpeg"),
            log_path: dir.path().join("frames.jsonl"),
        };
        let mut recorder = Recorder::open(&config).unwrap();
        recorder.record(1, Some(Duration::from_millis(40)), b"\xFF\xD8one", &image());
        recorder.record(2, None, b"\xFF\xD8two", &image());
        recorder.finish();
        assert_eq!(recorder.frames, 2);

        let video = std::fs::read(&config.video_path).unwrap();
        assert_eq!(video, b"\xFF\xD8one\xFF\xD8two");

        let log = std::fs::read_to_string(&config.log_path).unwrap();
        let lines: Vec<serde_json::Value> = log
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["sequence"], 1);
        assert_eq!(lines[0]["latency_ms"], 40.0);
        assert_eq!(lines[0]["width"], 2);
        assert!(lines[1]["latency_ms"].is_null());
        assert_eq!(lines[1]["bytes"], 5);
    }

    #[test]
    fn open_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecordConfig {
            video_path: dir.path().join("nope/out.mjpeg"),
            log_path: dir.path().join("frames.jsonl"),
        };
        assert!(Recorder::open(&config).is_err());
    }
}
