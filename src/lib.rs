// Module naming follows project convention (ABI = the shared memory binary interface,
// SMB = Shared Memory Buffer as seen by writers and the reader)
#[allow(non_snake_case)]
pub mod ABI {
    pub mod abi;
    pub mod bulk;
    pub mod chunk;
    mod debug;
    pub mod header;
    pub mod layout;
    pub mod state;
    pub mod Structs {
        pub mod Chunk_Structs;
        pub use Chunk_Structs::ChunkMeta; // re-export for stable path
    }
    pub use abi::SharedMemoryAbi;
    pub use chunk::Chunk;
    pub use header::{ChunkFlags, ChunkHeader, Packets};
    pub use layout::{ChunkLayout, PageHeader, PageLayout};
    pub use Structs::ChunkMeta;
    pub use state::{ChunkState, PageState};
}
#[allow(non_snake_case)]
pub mod Core {
    pub mod SharedMemory;
    pub use SharedMemory::{HeapSharedMemory, RawHandle, SharedMemoryBackend};
    #[cfg(target_os = "linux")]
    pub use SharedMemory::LinuxSharedMemory;
    pub mod id_allocator;
    pub use id_allocator::WriterIdAllocator;
}
#[allow(non_snake_case)]
pub mod SMB {
    mod builder;
    mod reader;
    mod region;
    mod writer;

    pub use builder::RegionBuilder;
    pub use reader::{ChunkRecord, PageReader};
    pub use region::SharedRegion;
    pub use writer::{ChunkWriter, WriterConfig};
}
#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}
pub mod error;

pub use error::{AbiError, Result};
