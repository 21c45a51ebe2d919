use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::ProtocolError;
use crate::MAX_DATAGRAM_SIZE;

/// Header size: 4 (sequence) + 8 (timestamp_nanos) = 12 bytes.
pub const SNAPSHOT_HEADER_SIZE: usize = 12;

/// A whole encoded image in one datagram (no chunking).
///
/// Wire format:
/// ```text
/// [sequence: u32 BE] [timestamp_nanos: u64 BE] [jpeg: variable]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPacket {
    /// Monotonic per-sender counter.
    pub sequence: u32,
    /// Sender wall clock at capture, nanoseconds since the Unix epoch.
    pub timestamp_nanos: u64,
    pub jpeg: Vec<u8>,
}

impl SnapshotPacket {
    pub fn new(sequence: u32, timestamp_nanos: u64, jpeg: Vec<u8>) -> Self {
        Self {
            sequence,
            timestamp_nanos,
            jpeg,
        }
    }

    /// Serialize to bytes for UDP transmission.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SNAPSHOT_HEADER_SIZE + self.jpeg.len());
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.extend_from_slice(&self.timestamp_nanos.to_be_bytes());
        buf.extend_from_slice(&self.jpeg);
        buf
    }

    /// Deserialize from raw UDP bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < SNAPSHOT_HEADER_SIZE {
            return Err(ProtocolError::PacketTooShort {
                expected: SNAPSHOT_HEADER_SIZE,
                got: data.len(),
            });
        }
        if data.len() > MAX_DATAGRAM_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                len: data.len() - SNAPSHOT_HEADER_SIZE,
                max: MAX_DATAGRAM_SIZE - SNAPSHOT_HEADER_SIZE,
            });
        }
        if data.len() == SNAPSHOT_HEADER_SIZE {
            return Err(ProtocolError::EmptyPayload);
        }

        let sequence = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let timestamp_nanos = u64::from_be_bytes([
            data[4], data[5], data[6], data[7], data[8], data[9], data[10], data[11],
        ]);

        Ok(Self {
            sequence,
            timestamp_nanos,
            jpeg: data[SNAPSHOT_HEADER_SIZE..].to_vec(),
        })
    }

    /// Capture-to-arrival latency. Clock skew that puts the sender ahead of
    /// us reads as zero rather than wrapping.
    pub fn latency(&self, now_unix_nanos: u64) -> Duration {
        Duration::from_nanos(now_unix_nanos.saturating_sub(self.timestamp_nanos))
    }
}

/// Local wall clock in nanoseconds since the Unix epoch.
pub fn unix_nanos_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
