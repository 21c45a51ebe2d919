use thiserror::Error;

/// Reasons a datagram is rejected at the decode boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("packet too short: expected at least {expected} bytes, got {got}")]
    PacketTooShort { expected: usize, got: usize },

    #[error("chunk header declares zero total chunks")]
    ZeroChunkCount,

    #[error("chunk index {index} out of range for {total} total chunks")]
    ChunkIndexOutOfRange { index: u16, total: u16 },

    #[error("image payload is empty")]
    EmptyPayload,

    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("frame of {len} bytes needs {chunks} chunks (max 65535)")]
    FrameTooLarge { len: usize, chunks: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_too_short_display() {
        let e = ProtocolError::PacketTooShort { expected: 8, got: 5 };
        let msg = e.to_string();
        assert!(msg.contains("8"));
        assert!(msg.contains("5"));
    }

    #[test]
    fn chunk_index_display() {
        let e = ProtocolError::ChunkIndexOutOfRange { index: 4, total: 3 };
        let msg = e.to_string();
        assert!(msg.contains("index 4"));
        assert!(msg.contains("3 total"));
    }

    #[test]
    fn frame_too_large_display() {
        let e = ProtocolError::FrameTooLarge { len: 100_000_000, chunks: 97_657 };
        assert!(e.to_string().contains("97657"));
    }
}
