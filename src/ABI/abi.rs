// The shared memory ABI: page and chunk transitions over a raw region.
//
// Nothing in here allocates, blocks or makes syscalls. Every transition is a
// compare-and-swap on the page's layout word (see state.rs) retried against
// concurrent changes to other chunks of the same page.

use super::chunk::Chunk;
use super::layout::{
    is_valid_page_size, ChunkLayout, PageHeader, PageLayout, MAX_CHUNKS_PER_PAGE, MIN_PAGE_SIZE,
    NUM_PAGE_LAYOUTS, PAGE_HEADER_SIZE,
};
use super::state::{ChunkState, PageState};
use super::Structs::Chunk_Structs::ChunkMeta;
use crate::error::{AbiError, Result};
use crossbeam_utils::Backoff;
use std::ptr::NonNull;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::{AcqRel, Acquire};

/// Upper bound on compare-and-swap attempts for a single transition. Every
/// failed attempt means another thread changed the same page word.
pub const MAX_CAS_ATTEMPTS: usize = 1024;

/// A view of the shared memory buffer as an array of pages.
///
/// This struct is NOT stored in shared memory. It holds the geometry of the
/// region and a pointer to it; all shared state lives in the page headers.
pub struct SharedMemoryAbi {
    start: NonNull<u8>,
    size: usize,
    page_size: usize,
    num_pages: usize,
    /// Chunk size per layout tag, computed once for `page_size`.
    chunk_sizes: [usize; NUM_PAGE_LAYOUTS],
}

// All shared mutable state is accessed through atomics in the page headers;
// payload access is gated by the chunk state machine.
unsafe impl Send for SharedMemoryAbi {}
unsafe impl Sync for SharedMemoryAbi {}

impl SharedMemoryAbi {
    /// Create an ABI view over an existing memory region.
    ///
    /// # Safety
    /// `start..start + size` must stay mapped and writable for as long as the
    /// returned value (and any `Chunk` borrowed from it) is alive. A freshly
    /// created region must be zero-filled.
    pub unsafe fn from_raw_parts(start: *mut u8, size: usize, page_size: usize) -> Result<Self> {
        if !is_valid_page_size(page_size) {
            return Err(AbiError::InvalidPageSize { page_size });
        }
        if size == 0 || size % page_size != 0 {
            return Err(AbiError::InvalidRegionSize { size, page_size });
        }
        let start = match NonNull::new(start) {
            Some(ptr) if (ptr.as_ptr() as usize) % MIN_PAGE_SIZE == 0 => ptr,
            _ => {
                return Err(AbiError::Misaligned {
                    address: start as usize,
                    alignment: MIN_PAGE_SIZE,
                })
            }
        };

        let mut chunk_sizes = [0usize; NUM_PAGE_LAYOUTS];
        for layout in PageLayout::DIVISORS {
            chunk_sizes[layout.tag() as usize] = layout.chunk_size(page_size);
        }

        Ok(Self {
            start,
            size,
            page_size,
            num_pages: size / page_size,
            chunk_sizes,
        })
    }

    #[inline]
    pub fn start(&self) -> *const u8 {
        self.start.as_ptr()
    }

    #[inline]
    pub fn end(&self) -> *const u8 {
        // One past the end of the mapping.
        unsafe { self.start.as_ptr().add(self.size) }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[inline]
    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    /// Geometry of a page partitioned with `layout`, for this page size.
    pub fn layout_for(&self, layout: PageLayout) -> ChunkLayout {
        ChunkLayout {
            num_chunks: layout.num_chunks(),
            chunk_size: self.chunk_sizes[layout.tag() as usize],
            free_mask: layout.free_mask(),
        }
    }

    #[inline]
    pub fn page_start(&self, page_idx: usize) -> *mut u8 {
        assert!(
            page_idx < self.num_pages,
            "page index {page_idx} out of range (num_pages = {})",
            self.num_pages
        );
        unsafe { self.start.as_ptr().add(page_idx * self.page_size) }
    }

    #[inline]
    pub fn page_header(&self, page_idx: usize) -> &PageHeader {
        // Pages start at multiples of MIN_PAGE_SIZE, PageHeader needs 8.
        unsafe { &*(self.page_start(page_idx) as *const PageHeader) }
    }

    #[inline]
    fn layout_word(&self, page_idx: usize) -> &AtomicU32 {
        &self.page_header(page_idx).layout
    }

    /// Snapshot of the page's state word.
    pub fn page_state(&self, page_idx: usize) -> PageState {
        PageState::from_raw(self.layout_word(page_idx).load(Acquire))
    }

    /// Apply `next` to the page word until the CAS sticks.
    ///
    /// `next` sees a fresh snapshot on every attempt and returns `None` to
    /// abort the transition without side effects. Returns the snapshot the
    /// successful CAS replaced.
    pub(crate) fn update_page_state<F>(&self, page_idx: usize, mut next: F) -> Option<PageState>
    where
        F: FnMut(PageState) -> Option<PageState>,
    {
        let word = self.layout_word(page_idx);
        let backoff = Backoff::new();
        let mut current = word.load(Acquire);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let prev = PageState::from_raw(current);
            let desired = next(prev)?;
            match word.compare_exchange_weak(current, desired.raw(), AcqRel, Acquire) {
                Ok(_) => return Some(prev),
                Err(actual) => {
                    current = actual;
                    backoff.spin();
                }
            }
        }

        tracing::warn!(page = page_idx, "page state transition gave up after {MAX_CAS_ATTEMPTS} attempts");
        None
    }

    // ---------------------------------------------------------------------
    // Page state machine
    // ---------------------------------------------------------------------

    /// Partition an unpartitioned page into `layout`, all chunks `Free`.
    ///
    /// Fails if the page is already partitioned, whatever its layout.
    pub fn try_partition_page(&self, page_idx: usize, layout: PageLayout) -> bool {
        if layout == PageLayout::NotPartitioned {
            return false;
        }
        let word = self.layout_word(page_idx);
        let partitioned = word
            .compare_exchange(
                PageState::UNPARTITIONED.raw(),
                PageState::partitioned(layout).raw(),
                AcqRel,
                Acquire,
            )
            .is_ok();
        if partitioned {
            tracing::debug!(page = page_idx, ?layout, "partitioned page");
        }
        partitioned
    }

    /// Bitmask of the chunks currently free (bit i = chunk i).
    ///
    /// Advisory only: a set bit must still be claimed with
    /// `try_acquire_chunk_for_writing`, which can fail.
    pub fn get_free_chunks(&self, page_idx: usize) -> u32 {
        self.page_state(page_idx).free_chunks()
    }

    pub fn get_chunk_state(&self, page_idx: usize, chunk_idx: usize) -> ChunkState {
        debug_assert!(chunk_idx < MAX_CHUNKS_PER_PAGE);
        self.page_state(page_idx).chunk_state(chunk_idx)
    }

    /// True if the page is unpartitioned or all of its chunks are free.
    pub fn is_page_free(&self, page_idx: usize) -> bool {
        self.page_state(page_idx).is_free()
    }

    /// True if the page is partitioned and all of its chunks are complete.
    pub fn is_page_complete(&self, page_idx: usize) -> bool {
        self.page_state(page_idx).is_complete()
    }

    // ---------------------------------------------------------------------
    // Per chunk transitions
    // ---------------------------------------------------------------------

    /// Move a chunk from `from` to `to`. Returns the layout the chunk was
    /// acquired under.
    fn try_transition_chunk(
        &self,
        page_idx: usize,
        chunk_idx: usize,
        from: ChunkState,
        to: ChunkState,
    ) -> Option<PageLayout> {
        let prev = self.update_page_state(page_idx, |state| {
            if chunk_idx >= state.num_chunks() || state.chunk_state(chunk_idx) != from {
                return None;
            }
            let next = state.with_chunk_state(chunk_idx, to);
            Some(if to == ChunkState::Free {
                next.departition_if_unused()
            } else {
                next
            })
        })?;
        prev.layout()
    }

    /// Claim a free chunk for writing and initialize its header from `meta`.
    ///
    /// Returns `None` if the page is not partitioned, `chunk_idx` is not a
    /// chunk of its layout, or the chunk is not `Free`.
    pub fn try_acquire_chunk_for_writing(
        &self,
        page_idx: usize,
        chunk_idx: usize,
        meta: &ChunkMeta,
    ) -> Option<Chunk<'_>> {
        debug_assert!(chunk_idx < MAX_CHUNKS_PER_PAGE);
        let layout = self.try_transition_chunk(
            page_idx,
            chunk_idx,
            ChunkState::Free,
            ChunkState::BeingWritten,
        )?;
        // Safe: we just won the Free -> BeingWritten transition for this slot.
        let chunk = unsafe { self.get_chunk_unchecked(page_idx, layout, chunk_idx) };
        chunk.header().store(meta);
        Some(chunk)
    }

    /// Hand a written chunk over to the reader.
    ///
    /// Returns the page index, so the caller can tell the reader where to
    /// look, or `None` if the chunk was not `BeingWritten`.
    pub fn release_chunk_as_complete(&self, chunk: Chunk<'_>) -> Option<usize> {
        self.release_chunk(chunk, ChunkState::BeingWritten, ChunkState::Complete)
    }

    /// Claim a complete chunk for reading.
    pub fn try_acquire_chunk_for_reading(
        &self,
        page_idx: usize,
        chunk_idx: usize,
    ) -> Option<Chunk<'_>> {
        debug_assert!(chunk_idx < MAX_CHUNKS_PER_PAGE);
        let layout = self.try_transition_chunk(
            page_idx,
            chunk_idx,
            ChunkState::Complete,
            ChunkState::BeingRead,
        )?;
        Some(unsafe { self.get_chunk_unchecked(page_idx, layout, chunk_idx) })
    }

    /// Give a read chunk back to the writers.
    ///
    /// When this frees the last chunk in use, the page goes back to
    /// unpartitioned in the same atomic step and can be partitioned again.
    pub fn release_chunk_as_free(&self, chunk: Chunk<'_>) -> Option<usize> {
        self.release_chunk(chunk, ChunkState::BeingRead, ChunkState::Free)
    }

    fn release_chunk(&self, chunk: Chunk<'_>, from: ChunkState, to: ChunkState) -> Option<usize> {
        let (page_idx, chunk_idx) = chunk.into_parts();
        match self.try_transition_chunk(page_idx, chunk_idx, from, to) {
            Some(_) => Some(page_idx),
            None => {
                tracing::debug!(
                    page = page_idx,
                    chunk = chunk_idx,
                    expected = ?from,
                    actual = ?self.get_chunk_state(page_idx, chunk_idx),
                    "chunk release refused"
                );
                None
            }
        }
    }

    /// Build a handle for a chunk without looking at or changing its state.
    ///
    /// # Safety
    /// The caller must already own the chunk, e.g. because it was moved to
    /// `BeingRead` by `try_acquire_all_chunks_for_reading`, and `layout` must
    /// be the page's current layout. Two live handles to the same chunk break
    /// the exclusivity of the payload.
    pub unsafe fn get_chunk_unchecked(
        &self,
        page_idx: usize,
        layout: PageLayout,
        chunk_idx: usize,
    ) -> Chunk<'_> {
        let chunk_layout = self.layout_for(layout);
        assert!(
            chunk_idx < chunk_layout.num_chunks,
            "chunk index {chunk_idx} out of range for {layout:?}"
        );
        let offset = PAGE_HEADER_SIZE + chunk_idx * chunk_layout.chunk_size;
        let begin = NonNull::new_unchecked(self.page_start(page_idx).add(offset));
        Chunk::new(begin, chunk_layout.chunk_size, page_idx, chunk_idx)
    }
}
