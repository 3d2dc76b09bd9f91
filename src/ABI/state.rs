// Page state word: the packed representation behind every page/chunk transition.
//
//   bit  31     : unused (always written as 0)
//   bits 28..30 : PageLayout tag
//   bits 0..27  : 14 x 2-bit ChunkState, chunk i at bits [2i, 2i+1]
//
// Transitions never touch this word piecemeal. Callers take a `PageState`
// snapshot, derive the next word with the pure helpers below and publish it
// with a single compare-and-swap.

use super::layout::{PageLayout, MAX_CHUNKS_PER_PAGE};

pub const CHUNK_STATE_BITS: u32 = 2;
pub const CHUNK_STATE_MASK: u32 = 0b11;
pub const LAYOUT_SHIFT: u32 = 28;
pub const LAYOUT_MASK: u32 = 0x7 << LAYOUT_SHIFT;
pub const ALL_CHUNKS_MASK: u32 = 0x0FFF_FFFF;

/// Lifecycle of a single chunk slot.
///
/// ```text
///   Free --acquire(write)--> BeingWritten --release--> Complete
///    ^                                                   |
///    +--release-- BeingRead <--acquire(read)-------------+
/// ```
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkState {
    /// Not owned by anybody; a writer may acquire it.
    Free = 0,
    /// Owned by exactly one writer.
    BeingWritten = 1,
    /// Owned by the reader.
    BeingRead = 2,
    /// Filled by a writer, waiting for the reader.
    Complete = 3,
}

impl ChunkState {
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        match bits & CHUNK_STATE_MASK {
            0 => ChunkState::Free,
            1 => ChunkState::BeingWritten,
            2 => ChunkState::BeingRead,
            _ => ChunkState::Complete,
        }
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self as u32
    }
}

/// Bits covering the states of the first `num_chunks` chunks.
#[inline]
pub const fn chunks_mask(num_chunks: usize) -> u32 {
    if num_chunks == 0 {
        0
    } else {
        ALL_CHUNKS_MASK >> ((MAX_CHUNKS_PER_PAGE - num_chunks) as u32 * CHUNK_STATE_BITS)
    }
}

/// A snapshot of a page's layout word.
///
/// Values read from shared memory are untrusted: a reserved layout tag decodes
/// to a page with no usable chunks that is neither free nor complete.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageState(u32);

impl PageState {
    /// The all-zero word of a page that is not partitioned.
    pub const UNPARTITIONED: PageState = PageState(0);

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        PageState(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// A freshly partitioned page: `layout` tag set, every chunk `Free`.
    #[inline]
    pub const fn partitioned(layout: PageLayout) -> Self {
        PageState(layout.tag() << LAYOUT_SHIFT)
    }

    #[inline]
    pub const fn layout_tag(self) -> u32 {
        (self.0 & LAYOUT_MASK) >> LAYOUT_SHIFT
    }

    /// Decoded layout, `None` if the tag is one of the reserved values.
    #[inline]
    pub const fn layout(self) -> Option<PageLayout> {
        PageLayout::from_tag(self.layout_tag())
    }

    #[inline]
    pub const fn is_partitioned(self) -> bool {
        self.layout_tag() != 0
    }

    #[inline]
    pub const fn num_chunks(self) -> usize {
        match self.layout() {
            Some(layout) => layout.num_chunks(),
            None => 0,
        }
    }

    #[inline]
    pub const fn chunk_state(self, chunk_idx: usize) -> ChunkState {
        ChunkState::from_bits(self.0 >> (chunk_idx as u32 * CHUNK_STATE_BITS))
    }

    /// The same word with the state of `chunk_idx` replaced.
    #[inline]
    pub const fn with_chunk_state(self, chunk_idx: usize, state: ChunkState) -> Self {
        let shift = chunk_idx as u32 * CHUNK_STATE_BITS;
        PageState((self.0 & !(CHUNK_STATE_MASK << shift)) | (state.bits() << shift))
    }

    /// Bitmask of the chunks (bit i = chunk i) currently in `state`.
    pub fn chunks_in_state(self, state: ChunkState) -> u32 {
        (0..self.num_chunks())
            .filter(|&idx| self.chunk_state(idx) == state)
            .fold(0, |mask, idx| mask | (1 << idx))
    }

    /// Bitmask of the free chunks. Zero for unpartitioned pages.
    #[inline]
    pub fn free_chunks(self) -> u32 {
        self.chunks_in_state(ChunkState::Free)
    }

    /// True if the page is unpartitioned or none of its chunks is in use.
    #[inline]
    pub const fn is_free(self) -> bool {
        if !self.is_partitioned() {
            return true;
        }
        let num_chunks = self.num_chunks();
        num_chunks != 0 && (self.0 & chunks_mask(num_chunks)) == 0
    }

    /// True if the page is partitioned and every chunk is `Complete`.
    #[inline]
    pub const fn is_complete(self) -> bool {
        let mask = chunks_mask(self.num_chunks());
        // Complete is 0b11, so "all complete" is every state bit set.
        mask != 0 && (self.0 & mask) == mask
    }

    /// The word with the layout reset to unpartitioned if no chunk is in use.
    #[inline]
    pub(crate) const fn departition_if_unused(self) -> Self {
        if self.is_partitioned() && self.is_free() {
            PageState::UNPARTITIONED
        } else {
            self
        }
    }
}
