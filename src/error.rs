//! Error types for building and attaching shared memory buffers.
//!
//! State transitions on pages and chunks never produce these: they succeed or
//! fail with a plain `bool`/`Option`. `AbiError` covers construction, config
//! validation and the I/O underneath the region backends.

use crate::ABI::layout::{MAX_PAGE_SIZE, MIN_PAGE_SIZE};
use crate::Core::id_allocator::MAX_WRITER_ID;

/// Result type alias for fallible setup operations
pub type Result<T> = std::result::Result<T, AbiError>;

#[derive(Debug, thiserror::Error)]
pub enum AbiError {
    /// Page size is not a power of two in the supported range
    #[error("invalid page size {page_size}: must be a power of two between {min} and {max}", min = MIN_PAGE_SIZE, max = MAX_PAGE_SIZE)]
    InvalidPageSize { page_size: usize },

    /// Region is empty or not a whole number of pages
    #[error("invalid region size {size}: must be a non-zero multiple of the page size {page_size}")]
    InvalidRegionSize { size: usize, page_size: usize },

    /// Region start is not aligned for the page headers
    #[error("region start {address:#x} not aligned to {alignment}")]
    Misaligned { address: usize, alignment: usize },

    /// Writer ids are 1..=MAX_WRITER_ID, 0 is reserved
    #[error("invalid writer id {0}: must be in 1..={max}", max = MAX_WRITER_ID)]
    InvalidWriterId(u16),

    /// A writer cannot partition pages with the "not partitioned" layout
    #[error("invalid page layout for writer: {0}")]
    InvalidLayout(&'static str),

    /// Attaching requires a named region
    #[error("a shared memory name is required to attach to an existing region")]
    MissingName,

    /// I/O failures from the shared memory backends (open, ftruncate, mmap)
    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl AbiError {
    /// Wrap a backend I/O error with a description of what was being attempted
    pub fn from_io(source: std::io::Error, context: impl Into<String>) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
