pub mod assembler;
pub mod chunk;
pub mod error;
pub mod snapshot;

pub use assembler::{AssemblyError, FrameAssembler};
pub use chunk::{fragment_frame, ChunkPacket, CHUNK_HEADER_SIZE, DEFAULT_CHUNK_PAYLOAD_SIZE};
pub use error::ProtocolError;
pub use snapshot::{unix_nanos_now, SnapshotPacket, SNAPSHOT_HEADER_SIZE};

/// Largest payload a single UDP datagram can carry over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;
