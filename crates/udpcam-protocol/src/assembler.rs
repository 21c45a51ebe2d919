use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use crate::chunk::ChunkPacket;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssemblyError {
    /// Chunk index outside `[0, total)` for the frame's authoritative total,
    /// or a zero total. Nothing was stored.
    #[error("frame {frame_id}: chunk {index} invalid for {total} total chunks")]
    InvalidChunk { frame_id: u32, index: u16, total: u16 },

    /// Chunk count reached the total but an index was absent at reassembly.
    /// The partial frame has been discarded.
    #[error("frame {frame_id}: chunk {index} missing during reassembly")]
    MissingChunk { frame_id: u32, index: u16 },
}

/// Chunks received so far for one frame id.
#[derive(Debug)]
struct PartialFrame {
    /// Taken from the first chunk seen; later chunks cannot resize the frame.
    total_chunks: u16,
    chunks: HashMap<u16, Vec<u8>>,
    created_at: Instant,
}

impl PartialFrame {
    fn new(total_chunks: u16, created_at: Instant) -> Self {
        Self {
            total_chunks,
            // Grown on demand: total_chunks comes off the wire unchecked.
            chunks: HashMap::new(),
            created_at,
        }
    }

    fn is_complete(&self) -> bool {
        self.chunks.len() == self.total_chunks as usize
    }
}

/// Reassembles chunked frames, tracking any number of frames in flight.
///
/// Chunks may arrive in any order and frames may interleave. A frame is
/// emitted exactly once, as soon as every index in `[0, total)` is present,
/// and its state is removed at that point. Frames that never complete are
/// removed by [`FrameAssembler::sweep`].
#[derive(Debug, Default)]
pub struct FrameAssembler {
    frames: HashMap<u32, PartialFrame>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk. Returns the reassembled frame bytes when this chunk
    /// completes its frame.
    ///
    /// A chunk at an index already stored overwrites the earlier payload.
    pub fn ingest(
        &mut self,
        packet: ChunkPacket,
        now: Instant,
    ) -> Result<Option<Vec<u8>>, AssemblyError> {
        let frame_id = packet.frame_id;
        let index = packet.chunk_index;

        if packet.total_chunks == 0 || index >= packet.total_chunks {
            return Err(AssemblyError::InvalidChunk {
                frame_id,
                index,
                total: packet.total_chunks,
            });
        }

        // An existing frame keeps its first-seen total; check the index
        // against it before creating or touching anything.
        if let Some(partial) = self.frames.get(&frame_id) {
            if packet.total_chunks != partial.total_chunks {
                debug!(
                    frame_id,
                    first_seen = partial.total_chunks,
                    declared = packet.total_chunks,
                    "conflicting total_chunks, keeping first-seen value"
                );
            }
            if index >= partial.total_chunks {
                return Err(AssemblyError::InvalidChunk {
                    frame_id,
                    index,
                    total: partial.total_chunks,
                });
            }
        }

        let partial = self
            .frames
            .entry(frame_id)
            .or_insert_with(|| PartialFrame::new(packet.total_chunks, now));
        partial.chunks.insert(index, packet.payload);

        if !partial.is_complete() {
            return Ok(None);
        }

        // Complete: the entry goes away whether or not reassembly succeeds.
        let Some(partial) = self.frames.remove(&frame_id) else {
            return Ok(None);
        };
        reassemble(frame_id, partial).map(Some)
    }

    /// Remove every partial frame older than `max_age`. Returns how many
    /// were evicted.
    pub fn sweep(&mut self, now: Instant, max_age: Duration) -> usize {
        let before = self.frames.len();
        self.frames.retain(|frame_id, partial| {
            let keep = now.saturating_duration_since(partial.created_at) <= max_age;
            if !keep {
                debug!(
                    frame_id = *frame_id,
                    received = partial.chunks.len(),
                    total = partial.total_chunks,
                    "evicting stale partial frame"
                );
            }
            keep
        });
        before - self.frames.len()
    }

    /// Whether a partial frame is currently held for `frame_id`.
    pub fn contains(&self, frame_id: u32) -> bool {
        self.frames.contains_key(&frame_id)
    }

    /// Number of chunks stored for `frame_id`, if it is in flight.
    pub fn chunks_received(&self, frame_id: u32) -> Option<usize> {
        self.frames.get(&frame_id).map(|p| p.chunks.len())
    }

    /// Number of partial frames in flight.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drop all in-flight state.
    pub fn reset(&mut self) {
        self.frames.clear();
    }
}

fn reassemble(frame_id: u32, partial: PartialFrame) -> Result<Vec<u8>, AssemblyError> {
    let mut chunks = partial.chunks;
    let size: usize = chunks.values().map(Vec::len).sum();
    let mut frame = Vec::with_capacity(size);
    for index in 0..partial.total_chunks {
        match chunks.remove(&index) {
            Some(chunk) => frame.extend_from_slice(&chunk),
            None => return Err(AssemblyError::MissingChunk { frame_id, index }),
        }
    }
    Ok(frame)
}
