// Writer side of the shared memory buffer.
//
// One ChunkWriter per writer thread. It owns the writer id it was configured
// with, numbers the chunks it acquires and finds free chunks by scanning the
// pages round-robin. It never waits: when every chunk is taken, new_chunk()
// returns None and the caller decides whether to back off or drop data.

use crate::error::{AbiError, Result};
use crate::Core::id_allocator::MAX_WRITER_ID;
use crate::ABI::{Chunk, ChunkMeta, PageLayout, SharedMemoryAbi};

/// Per-writer configuration, injected by whoever allocates writer ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterConfig {
    pub writer_id: u16,
    /// Layout used when this writer partitions a free page.
    pub layout: PageLayout,
}

impl WriterConfig {
    pub fn new(writer_id: u16) -> Self {
        Self {
            writer_id,
            layout: PageLayout::Div4,
        }
    }

    pub fn with_layout(mut self, layout: PageLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.writer_id == 0 || self.writer_id > MAX_WRITER_ID {
            return Err(AbiError::InvalidWriterId(self.writer_id));
        }
        if self.layout == PageLayout::NotPartitioned {
            return Err(AbiError::InvalidLayout("writers cannot partition pages as NotPartitioned"));
        }
        Ok(())
    }
}

/// Acquires chunks for one writer and returns them once filled.
pub struct ChunkWriter<'a> {
    abi: &'a SharedMemoryAbi,
    config: WriterConfig,
    next_chunk_id: u16,
    page_cursor: usize,
    chunks_returned: u64,
}

impl<'a> ChunkWriter<'a> {
    pub fn new(abi: &'a SharedMemoryAbi, config: WriterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            abi,
            config,
            next_chunk_id: 0,
            page_cursor: 0,
            chunks_returned: 0,
        })
    }

    pub fn writer_id(&self) -> u16 {
        self.config.writer_id
    }

    pub fn layout(&self) -> PageLayout {
        self.config.layout
    }

    /// Chunk id the next acquired chunk will carry
    pub fn next_chunk_id(&self) -> u16 {
        self.next_chunk_id
    }

    pub fn chunks_returned(&self) -> u64 {
        self.chunks_returned
    }

    /// Acquire a free chunk anywhere in the buffer.
    ///
    /// Starts at the page where the previous search succeeded. Free pages are
    /// partitioned with the configured layout; partitioned pages are searched
    /// through their free-chunk mask. Returns `None` if no chunk could be
    /// acquired in one pass over all pages.
    pub fn new_chunk(&mut self) -> Option<Chunk<'a>> {
        let num_pages = self.abi.num_pages();
        let meta = ChunkMeta::new(self.next_chunk_id, self.config.writer_id);

        for i in 0..num_pages {
            let page_idx = (self.page_cursor + i) % num_pages;

            let free_chunks = if self.abi.try_partition_page(page_idx, self.config.layout) {
                self.config.layout.free_mask()
            } else {
                self.abi.get_free_chunks(page_idx)
            };

            let mut mask = free_chunks;
            while mask != 0 {
                let chunk_idx = mask.trailing_zeros() as usize;
                mask &= mask - 1;
                // The mask is a snapshot, another writer may win the slot.
                if let Some(chunk) = self.abi.try_acquire_chunk_for_writing(page_idx, chunk_idx, &meta) {
                    self.page_cursor = page_idx;
                    self.next_chunk_id = self.next_chunk_id.wrapping_add(1);
                    return Some(chunk);
                }
            }
        }

        tracing::trace!(writer_id = self.config.writer_id, "no free chunk in the buffer");
        None
    }

    /// Mark a filled chunk as complete. Returns the page it belongs to.
    pub fn return_chunk(&mut self, chunk: Chunk<'a>) -> Option<usize> {
        debug_assert_eq!(chunk.writer_id(), self.config.writer_id);
        let page_idx = self.abi.release_chunk_as_complete(chunk)?;
        self.chunks_returned += 1;
        Some(page_idx)
    }
}
