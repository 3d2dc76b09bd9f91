use super::Structs::Chunk_Structs::ChunkMeta;
use bitflags::bitflags;
use std::sync::atomic::{AtomicU16, Ordering};

/// Highest packet count the 10-bit counter can hold.
pub const MAX_PACKET_COUNT: u16 = (1 << PACKET_COUNT_BITS) - 1;

const PACKET_COUNT_BITS: u32 = 10;
const PACKET_COUNT_MASK: u16 = MAX_PACKET_COUNT;
const PACKET_FLAGS_BITS: u32 = 6;
const PACKET_FLAGS_MASK: u8 = (1 << PACKET_FLAGS_BITS) - 1;

bitflags! {
    /// Per-chunk flags stored in the upper 6 bits of the packets word.
    ///
    /// Only the writer sets them while the chunk is `BeingWritten`. Bits that
    /// are not named here are preserved when decoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChunkFlags: u8 {
        /// The last packet in the chunk is a fragment; it continues in the
        /// next chunk of the same writer.
        const LAST_PACKET_CONTINUES_ON_NEXT_CHUNK = 1 << 0;
        /// The first packet in the chunk is the tail of a fragment started in
        /// the previous chunk of the same writer.
        const FIRST_PACKET_CONTINUES_FROM_PREV_CHUNK = 1 << 1;
        /// Some bytes of the chunk will be patched after it is committed.
        const CHUNK_NEEDS_PATCHING = 1 << 2;
    }
}

/// The packet accounting pair: 10-bit count in the low bits, 6-bit flags above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Packets {
    pub count: u16,
    pub flags: ChunkFlags,
}

impl Packets {
    pub const fn new(count: u16, flags: ChunkFlags) -> Self {
        Self { count, flags }
    }

    /// Pack into the 16-bit wire word. Out of range bits are truncated.
    #[inline]
    pub const fn pack(self) -> u16 {
        (self.count & PACKET_COUNT_MASK)
            | (((self.flags.bits() & PACKET_FLAGS_MASK) as u16) << PACKET_COUNT_BITS)
    }

    #[inline]
    pub const fn unpack(word: u16) -> Self {
        Self {
            count: word & PACKET_COUNT_MASK,
            flags: ChunkFlags::from_bits_retain((word >> PACKET_COUNT_BITS) as u8),
        }
    }
}

/// The header at the start of every chunk.
///
/// Identity fields are written once when a writer acquires the chunk. The
/// packets word is updated in place by that writer, always with a single
/// atomic read-modify-write so count and flags never race each other.
#[repr(C)]
pub struct ChunkHeader {
    pub chunk_id: AtomicU16,
    pub writer_id: AtomicU16,
    /// See `Packets` for the packing.
    pub packets: AtomicU16,
    pub reserved: u16,
}

impl ChunkHeader {
    /// Write the identity and initial packet accounting.
    ///
    /// Relaxed is enough: the header only becomes visible to the reader
    /// through the release CAS that marks the chunk `Complete`.
    pub(crate) fn store(&self, meta: &ChunkMeta) {
        self.chunk_id.store(meta.chunk_id, Ordering::Relaxed);
        self.writer_id.store(meta.writer_id, Ordering::Relaxed);
        self.packets.store(meta.packets.pack(), Ordering::Relaxed);
    }

    /// Snapshot of all header fields.
    pub fn load(&self) -> ChunkMeta {
        ChunkMeta {
            chunk_id: self.chunk_id.load(Ordering::Relaxed),
            writer_id: self.writer_id.load(Ordering::Relaxed),
            packets: self.load_packets(),
        }
    }

    #[inline]
    pub fn load_packets(&self) -> Packets {
        Packets::unpack(self.packets.load(Ordering::Relaxed))
    }

    /// Add one to the packet count, leaving the flags untouched.
    ///
    /// Returns the resulting count. The counter saturates at
    /// `MAX_PACKET_COUNT` (debug builds assert instead).
    pub fn increment_packet_count(&self) -> u16 {
        let res = self
            .packets
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |word| {
                let count = word & PACKET_COUNT_MASK;
                if count == MAX_PACKET_COUNT {
                    None
                } else {
                    Some((word & !PACKET_COUNT_MASK) | (count + 1))
                }
            });
        debug_assert!(res.is_ok(), "chunk packet count overflow");
        match res {
            Ok(prev) => (prev & PACKET_COUNT_MASK) + 1,
            Err(prev) => prev & PACKET_COUNT_MASK,
        }
    }

    /// OR `flag` into the flag bits, leaving the count untouched.
    pub fn set_flag(&self, flag: ChunkFlags) {
        let bits = ((flag.bits() & PACKET_FLAGS_MASK) as u16) << PACKET_COUNT_BITS;
        self.packets.fetch_or(bits, Ordering::Relaxed);
    }
}
