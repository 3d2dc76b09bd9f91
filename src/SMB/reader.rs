// Reader side of the shared memory buffer.
//
// The reader is the single consumer of complete chunks. It is nudged (or
// polls) from outside this crate; here it only moves chunks Complete ->
// BeingRead -> Free and lends the payload to a callback in between.

use crate::ABI::{ChunkMeta, ChunkState, SharedMemoryAbi};

/// A chunk lent to the reader callback. `payload` is only valid for the
/// duration of the callback: the chunk is freed right after.
#[derive(Debug)]
pub struct ChunkRecord<'c> {
    pub page_idx: usize,
    pub chunk_idx: usize,
    pub meta: ChunkMeta,
    pub payload: &'c [u8],
}

pub struct PageReader<'a> {
    abi: &'a SharedMemoryAbi,
}

impl<'a> PageReader<'a> {
    pub fn new(abi: &'a SharedMemoryAbi) -> Self {
        Self { abi }
    }

    /// Read every complete chunk of a page in one acquisition.
    ///
    /// Returns the number of chunks handed to `f`, or `None` if the page has
    /// a chunk being written or read (or is not partitioned). The drained
    /// chunks are freed one by one so that a chunk completed by a writer in
    /// the meantime stays Complete for the next pass.
    pub fn drain_page<F>(&self, page_idx: usize, mut f: F) -> Option<usize>
    where
        F: FnMut(&ChunkRecord<'_>),
    {
        if !self.abi.try_acquire_all_chunks_for_reading(page_idx) {
            return None;
        }

        // Every BeingRead chunk is ours now: only the reader moves chunks
        // into BeingRead and the bulk acquire refused pages that had any.
        let state = self.abi.page_state(page_idx);
        let layout = state.layout()?;
        let mut drained = 0;
        let mut acquired = state.chunks_in_state(ChunkState::BeingRead);
        while acquired != 0 {
            let chunk_idx = acquired.trailing_zeros() as usize;
            acquired &= acquired - 1;

            let chunk = unsafe { self.abi.get_chunk_unchecked(page_idx, layout, chunk_idx) };
            f(&ChunkRecord {
                page_idx,
                chunk_idx,
                meta: chunk.meta(),
                payload: chunk.payload(),
            });
            if self.abi.release_chunk_as_free(chunk).is_some() {
                drained += 1;
            }
        }
        Some(drained)
    }

    /// Read and free a single complete chunk. False if it was not Complete.
    pub fn read_chunk<F>(&self, page_idx: usize, chunk_idx: usize, f: F) -> bool
    where
        F: FnOnce(&ChunkRecord<'_>),
    {
        let chunk = match self.abi.try_acquire_chunk_for_reading(page_idx, chunk_idx) {
            Some(chunk) => chunk,
            None => return false,
        };
        f(&ChunkRecord {
            page_idx,
            chunk_idx,
            meta: chunk.meta(),
            payload: chunk.payload(),
        });
        self.abi.release_chunk_as_free(chunk).is_some()
    }

    /// Read the complete chunks of a page one at a time, leaving chunks that
    /// are still being written alone.
    pub fn read_complete_chunks<F>(&self, page_idx: usize, mut f: F) -> usize
    where
        F: FnMut(&ChunkRecord<'_>),
    {
        let mut complete = self
            .abi
            .page_state(page_idx)
            .chunks_in_state(ChunkState::Complete);
        let mut read = 0;
        while complete != 0 {
            let chunk_idx = complete.trailing_zeros() as usize;
            complete &= complete - 1;
            if self.read_chunk(page_idx, chunk_idx, &mut f) {
                read += 1;
            }
        }
        read
    }

    /// One pass over the whole buffer. Returns the number of chunks read.
    pub fn poll<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&ChunkRecord<'_>),
    {
        let mut read = 0;
        for page_idx in 0..self.abi.num_pages() {
            if self.abi.count_complete_chunks(page_idx) == 0 {
                continue;
            }
            read += match self.drain_page(page_idx, &mut f) {
                Some(drained) => drained,
                None => self.read_complete_chunks(page_idx, &mut f),
            };
        }
        read
    }

    /// Drop every complete chunk of the page unread and free the page if no
    /// writer is still using it.
    pub fn discard_page(&self, page_idx: usize) {
        self.abi.release_all_chunks_as_free(page_idx);
    }
}
