use super::reader::PageReader;
use super::writer::{ChunkWriter, WriterConfig};
use crate::error::Result;
use crate::Core::SharedMemory::SharedMemoryBackend;
use crate::ABI::SharedMemoryAbi;
use std::fmt;

/// A shared memory buffer: the backing memory plus the ABI laid over it.
///
/// Owning both is what makes the safe API possible: chunks borrow the ABI,
/// the ABI never outlives the backend.
pub struct SharedRegion {
    // Declared first so it is dropped before the memory it points into.
    abi: SharedMemoryAbi,
    backend: Box<dyn SharedMemoryBackend>,
}

impl SharedRegion {
    /// Lay the ABI over `backend` with the given page size.
    pub fn new(backend: Box<dyn SharedMemoryBackend>, page_size: usize) -> Result<Self> {
        // The backend keeps the mapping alive for as long as self, and chunks
        // can only borrow &self.abi.
        let abi = unsafe { SharedMemoryAbi::from_raw_parts(backend.as_ptr(), backend.size(), page_size)? };
        Ok(Self { abi, backend })
    }

    pub fn abi(&self) -> &SharedMemoryAbi {
        &self.abi
    }

    pub fn backend(&self) -> &dyn SharedMemoryBackend {
        &*self.backend
    }

    pub fn writer(&self, config: WriterConfig) -> Result<ChunkWriter<'_>> {
        ChunkWriter::new(&self.abi, config)
    }

    pub fn reader(&self) -> PageReader<'_> {
        PageReader::new(&self.abi)
    }
}

impl fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_shared_region(self, f)
    }
}
