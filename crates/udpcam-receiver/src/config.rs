use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Which wire format the sender speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// 8-byte header, frames split across many datagrams.
    Chunked,
    /// 12-byte header, one whole JPEG per datagram.
    Single,
}

/// Optional recording of every decoded frame.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordConfig {
    /// Encoded frames are appended here as an MJPEG stream.
    pub video_path: PathBuf,
    /// One JSON line of frame metadata per decoded frame.
    pub log_path: PathBuf,
}

/// Receiver configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiverConfig {
    /// IP address to bind on (default "0.0.0.0").
    #[serde(default = "default_host")]
    pub host: String,

    /// UDP port the camera streams to.
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_mode")]
    pub mode: StreamMode,

    /// OS-level socket receive buffer, in bytes.
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,

    /// How long a single read waits before the batch is considered drained.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Maximum datagrams read per loop iteration.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Partial frames older than this are reaped.
    #[serde(default = "default_max_frame_age_ms")]
    pub max_frame_age_ms: u64,

    #[serde(default = "default_reap_interval_ms")]
    pub reap_interval_ms: u64,

    /// Decoded frames waiting for render; the oldest is dropped beyond this.
    #[serde(default = "default_display_capacity")]
    pub display_capacity: usize,

    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,

    /// Write rendered frames to this PNG file. Headless when unset.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,

    /// Only every Nth rendered frame is written to the snapshot file.
    #[serde(default = "default_snapshot_every")]
    pub snapshot_every: u32,

    #[serde(default)]
    pub record: Option<RecordConfig>,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    5000
}

fn default_mode() -> StreamMode {
    StreamMode::Chunked
}

fn default_recv_buffer_size() -> usize {
    65_536 * 10
}

fn default_read_timeout_ms() -> u64 {
    10
}

fn default_batch_size() -> usize {
    50
}

fn default_max_frame_age_ms() -> u64 {
    500
}

fn default_reap_interval_ms() -> u64 {
    100
}

fn default_display_capacity() -> usize {
    3
}

fn default_stats_interval_secs() -> u64 {
    5
}

fn default_snapshot_every() -> u32 {
    1
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            mode: default_mode(),
            recv_buffer_size: default_recv_buffer_size(),
            read_timeout_ms: default_read_timeout_ms(),
            batch_size: default_batch_size(),
            max_frame_age_ms: default_max_frame_age_ms(),
            reap_interval_ms: default_reap_interval_ms(),
            display_capacity: default_display_capacity(),
            stats_interval_secs: default_stats_interval_secs(),
            snapshot_path: None,
            snapshot_every: default_snapshot_every(),
            record: None,
        }
    }
}

impl ReceiverConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    pub fn max_frame_age(&self) -> Duration {
        Duration::from_millis(self.max_frame_age_ms)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs.max(1))
    }
}
