// Whole-page transitions used by the reader.
//
// Both operations rewrite every chunk state of the page in one CAS, so the
// reader never observes (or publishes) a half-drained page.

use super::abi::SharedMemoryAbi;
use super::state::{ChunkState, PageState};

impl SharedMemoryAbi {
    /// Acquire every complete chunk of the page for reading in one step.
    ///
    /// Succeeds only if no chunk is `BeingWritten` or `BeingRead`. On success
    /// all `Complete` chunks become `BeingRead` and `Free` chunks (never used
    /// by a writer) stay `Free`. Fails for unpartitioned pages.
    pub fn try_acquire_all_chunks_for_reading(&self, page_idx: usize) -> bool {
        self.update_page_state(page_idx, |state| {
            let num_chunks = state.num_chunks();
            if num_chunks == 0 {
                return None;
            }
            let mut next = state;
            for chunk_idx in 0..num_chunks {
                match state.chunk_state(chunk_idx) {
                    ChunkState::BeingWritten | ChunkState::BeingRead => return None,
                    ChunkState::Complete => {
                        next = next.with_chunk_state(chunk_idx, ChunkState::BeingRead)
                    }
                    ChunkState::Free => {}
                }
            }
            Some(next)
        })
        .is_some()
    }

    /// Free every `Complete` or `BeingRead` chunk of the page in one step.
    ///
    /// Chunks still `BeingWritten` are left alone. If no chunk remains in use
    /// the page becomes unpartitioned.
    pub fn release_all_chunks_as_free(&self, page_idx: usize) {
        let released = self.update_page_state(page_idx, |state| {
            let num_chunks = state.num_chunks();
            if num_chunks == 0 {
                return None;
            }
            let next = (0..num_chunks).fold(state, |next, chunk_idx| {
                match state.chunk_state(chunk_idx) {
                    ChunkState::Complete | ChunkState::BeingRead => {
                        next.with_chunk_state(chunk_idx, ChunkState::Free)
                    }
                    ChunkState::Free | ChunkState::BeingWritten => next,
                }
            });
            Some(next.departition_if_unused())
        });

        if let Some(prev) = released {
            tracing::trace!(page = page_idx, prev = ?prev, "released all chunks");
        }
    }

    /// Number of chunks of the page currently `Complete`.
    pub fn count_complete_chunks(&self, page_idx: usize) -> u32 {
        let state: PageState = self.page_state(page_idx);
        state.chunks_in_state(ChunkState::Complete).count_ones()
    }
}
