use super::{Chunk, PageState, SharedMemoryAbi};
use std::fmt;

// Debug proxy implementations that call the standalone debug functions
impl fmt::Debug for SharedMemoryAbi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_shared_memory_abi(self, f)
    }
}

impl fmt::Debug for Chunk<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_chunk(self, f)
    }
}

impl fmt::Debug for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_page_state(self, f)
    }
}
