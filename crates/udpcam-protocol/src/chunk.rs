use crate::error::ProtocolError;
use crate::MAX_DATAGRAM_SIZE;

/// Header size: 4 (frame_id) + 2 (chunk_index) + 2 (total_chunks) = 8 bytes.
pub const CHUNK_HEADER_SIZE: usize = 8;

/// Largest payload that still fits in one datagram after the header.
pub const MAX_CHUNK_PAYLOAD_SIZE: usize = MAX_DATAGRAM_SIZE - CHUNK_HEADER_SIZE;

/// Payload size used by the camera sender when splitting a JPEG.
pub const DEFAULT_CHUNK_PAYLOAD_SIZE: usize = 1024;

/// One fragment of an encoded frame.
///
/// Wire format:
/// ```text
/// [frame_id: u32 BE] [chunk_index: u16 BE] [total_chunks: u16 BE] [payload: variable]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPacket {
    pub frame_id: u32,
    pub chunk_index: u16,
    pub total_chunks: u16,
    pub payload: Vec<u8>,
}

impl ChunkPacket {
    pub fn new(frame_id: u32, chunk_index: u16, total_chunks: u16, payload: Vec<u8>) -> Self {
        Self {
            frame_id,
            chunk_index,
            total_chunks,
            payload,
        }
    }

    /// Check the header fields against each other.
    ///
    /// A packet that fails here must never touch assembler state.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.total_chunks == 0 {
            return Err(ProtocolError::ZeroChunkCount);
        }
        if self.chunk_index >= self.total_chunks {
            return Err(ProtocolError::ChunkIndexOutOfRange {
                index: self.chunk_index,
                total: self.total_chunks,
            });
        }
        if self.payload.len() > MAX_CHUNK_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                len: self.payload.len(),
                max: MAX_CHUNK_PAYLOAD_SIZE,
            });
        }
        Ok(())
    }

    /// Serialize to bytes for UDP transmission.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CHUNK_HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.frame_id.to_be_bytes());
        buf.extend_from_slice(&self.chunk_index.to_be_bytes());
        buf.extend_from_slice(&self.total_chunks.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Deserialize and validate a received datagram.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < CHUNK_HEADER_SIZE {
            return Err(ProtocolError::PacketTooShort {
                expected: CHUNK_HEADER_SIZE,
                got: data.len(),
            });
        }

        let frame_id = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let chunk_index = u16::from_be_bytes([data[4], data[5]]);
        let total_chunks = u16::from_be_bytes([data[6], data[7]]);

        let packet = Self {
            frame_id,
            chunk_index,
            total_chunks,
            payload: data[CHUNK_HEADER_SIZE..].to_vec(),
        };
        packet.validate()?;
        Ok(packet)
    }
}

/// Split an encoded frame into chunk packets of at most `max_payload` bytes.
pub fn fragment_frame(
    encoded: &[u8],
    frame_id: u32,
    max_payload: usize,
) -> Result<Vec<ChunkPacket>, ProtocolError> {
    if encoded.is_empty() {
        return Err(ProtocolError::EmptyPayload);
    }
    let max_payload = max_payload.clamp(1, MAX_CHUNK_PAYLOAD_SIZE);
    let chunks = encoded.len().div_ceil(max_payload);
    let total_chunks = u16::try_from(chunks).map_err(|_| ProtocolError::FrameTooLarge {
        len: encoded.len(),
        chunks,
    })?;

    Ok(encoded
        .chunks(max_payload)
        .enumerate()
        .map(|(i, chunk)| ChunkPacket::new(frame_id, i as u16, total_chunks, chunk.to_vec()))
        .collect())
}
