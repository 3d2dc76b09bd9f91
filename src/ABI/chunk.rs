use super::abi::SharedMemoryAbi;
use super::header::{ChunkFlags, ChunkHeader};
use super::layout::CHUNK_HEADER_SIZE;
use super::Structs::Chunk_Structs::ChunkMeta;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// Exclusive access to one chunk, for writing or for reading.
///
/// A `Chunk` is a capability, not state: the chunk's state lives in the page
/// header. At most one handle exists per (page, chunk) because obtaining one
/// requires winning the state transition in the page header. It can only be
/// given back through `release_chunk_as_complete` / `release_chunk_as_free`,
/// which take it by value.
///
/// The handle borrows the `SharedMemoryAbi` it came from, so it cannot
/// outlive the mapping.
#[must_use = "a chunk must be released back to the SharedMemoryAbi"]
pub struct Chunk<'a> {
    begin: NonNull<u8>,
    size: usize,
    chunk_idx: usize,
    page_idx: usize,
    _abi: PhantomData<&'a SharedMemoryAbi>,
}

// The chunk is owned exclusively by the holder of the handle and the header
// is only touched through atomics.
unsafe impl Send for Chunk<'_> {}

impl<'a> Chunk<'a> {
    /// # Safety
    /// `begin..begin + size` must be a chunk inside a live mapping borrowed
    /// for `'a`, with `size >= CHUNK_HEADER_SIZE`.
    pub(crate) unsafe fn new(begin: NonNull<u8>, size: usize, page_idx: usize, chunk_idx: usize) -> Self {
        debug_assert!(size >= CHUNK_HEADER_SIZE);
        Self {
            begin,
            size,
            chunk_idx,
            page_idx,
            _abi: PhantomData,
        }
    }

    /// Consume the handle without the debug drop check.
    #[inline]
    pub(crate) fn into_parts(self) -> (usize, usize) {
        let parts = (self.page_idx, self.chunk_idx);
        std::mem::forget(self);
        parts
    }

    #[inline]
    pub fn begin(&self) -> *const u8 {
        self.begin.as_ptr()
    }

    #[inline]
    pub fn end(&self) -> *const u8 {
        // In bounds of the same chunk, see `new`.
        unsafe { self.begin.as_ptr().add(self.size) }
    }

    /// Chunk size in bytes, header included.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn payload_size(&self) -> usize {
        self.size - CHUNK_HEADER_SIZE
    }

    #[inline]
    pub fn chunk_idx(&self) -> usize {
        self.chunk_idx
    }

    #[inline]
    pub fn page_idx(&self) -> usize {
        self.page_idx
    }

    #[inline]
    pub fn header(&self) -> &ChunkHeader {
        // Chunks start 4-byte aligned, ChunkHeader needs 2.
        unsafe { &*(self.begin.as_ptr() as *const ChunkHeader) }
    }

    /// Snapshot of the chunk header.
    pub fn meta(&self) -> ChunkMeta {
        self.header().load()
    }

    pub fn writer_id(&self) -> u16 {
        self.meta().writer_id
    }

    pub fn chunk_id(&self) -> u16 {
        self.meta().chunk_id
    }

    /// Payload bytes following the header.
    ///
    /// The bytes live in memory shared with another, untrusted, process.
    /// Readers must treat them as opaque input.
    pub fn payload(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(
                self.begin.as_ptr().add(CHUNK_HEADER_SIZE),
                self.payload_size(),
            )
        }
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(
                self.begin.as_ptr().add(CHUNK_HEADER_SIZE),
                self.payload_size(),
            )
        }
    }

    /// Returns the packet count after the increment.
    #[inline]
    pub fn increment_packet_count(&self) -> u16 {
        self.header().increment_packet_count()
    }

    #[inline]
    pub fn set_flag(&self, flag: ChunkFlags) {
        self.header().set_flag(flag)
    }

    pub fn get_packet_count_and_flags(&self) -> (u16, ChunkFlags) {
        let packets = self.header().load_packets();
        (packets.count, packets.flags)
    }
}

impl Drop for Chunk<'_> {
    fn drop(&mut self) {
        // Releasing consumes the handle through `into_parts`, so reaching this
        // means the slot stays BeingWritten/BeingRead forever.
        if cfg!(debug_assertions) {
            tracing::warn!(
                page = self.page_idx,
                chunk = self.chunk_idx,
                "chunk dropped without being released"
            );
        }
    }
}
