// This is the plain-value counterpart of the in-memory ChunkHeader

use crate::ABI::header::{ChunkFlags, Packets};

// no atomics in ChunkMeta; it is what writers hand in and readers get back

/// Identity and packet accounting of a chunk.
///
/// Writers pass one to `try_acquire_chunk_for_writing` to initialize the
/// chunk header; readers get one back as a snapshot of the header.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkMeta {
    /// Per-writer sequence number, wraps at u16::MAX.
    pub chunk_id: u16,
    pub writer_id: u16,
    pub packets: Packets,
}

impl ChunkMeta {
    pub const fn new(chunk_id: u16, writer_id: u16) -> Self {
        Self {
            chunk_id,
            writer_id,
            packets: Packets::new(0, ChunkFlags::empty()),
        }
    }

    pub const fn with_packets(mut self, count: u16, flags: ChunkFlags) -> Self {
        self.packets = Packets::new(count, flags);
        self
    }
}
