use std::fmt;
use crate::ABI::{Chunk, ChunkState, PageState, SharedMemoryAbi};
use crate::SMB::SharedRegion;

/// Debug function for SharedMemoryAbi
///
/// Provides a safe debug representation that shows:
/// - Region start pointer and size
/// - Page geometry
/// - Number of pages currently partitioned
pub fn debug_shared_memory_abi(abi: &SharedMemoryAbi, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let partitioned = (0..abi.num_pages())
        .filter(|&page| abi.page_state(page).is_partitioned())
        .count();
    f.debug_struct("SharedMemoryAbi")
        .field("start", &format_args!("{:p}", abi.start()))
        .field("size", &abi.size())
        .field("page_size", &abi.page_size())
        .field("num_pages", &abi.num_pages())
        .field("partitioned_pages", &partitioned)
        .finish()
}

/// Debug function for Chunk
///
/// Shows the chunk's position and header, never the payload bytes.
pub fn debug_chunk(chunk: &Chunk<'_>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let (packet_count, flags) = chunk.get_packet_count_and_flags();
    f.debug_struct("Chunk")
        .field("page_idx", &chunk.page_idx())
        .field("chunk_idx", &chunk.chunk_idx())
        .field("begin", &format_args!("{:p}", chunk.begin()))
        .field("size", &chunk.size())
        .field("chunk_id", &chunk.chunk_id())
        .field("writer_id", &chunk.writer_id())
        .field("packet_count", &packet_count)
        .field("flags", &flags)
        .finish()
}

/// Debug function for PageState
///
/// Decodes the layout tag and prints one letter per chunk:
/// F = Free, W = BeingWritten, R = BeingRead, C = Complete
pub fn debug_page_state(state: &PageState, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let chunks: String = (0..state.num_chunks())
        .map(|idx| match state.chunk_state(idx) {
            ChunkState::Free => 'F',
            ChunkState::BeingWritten => 'W',
            ChunkState::BeingRead => 'R',
            ChunkState::Complete => 'C',
        })
        .collect();
    let mut s = f.debug_struct("PageState");
    s.field("raw", &format_args!("{:#010x}", state.raw()));
    match state.layout() {
        Some(layout) => s.field("layout", &layout),
        None => s.field("layout", &format_args!("Reserved({})", state.layout_tag())),
    };
    s.field("chunks", &chunks).finish()
}

/// Debug function for SharedRegion
///
/// Shows the backend handle as opaque and delegates to the ABI for geometry.
pub fn debug_shared_region(region: &SharedRegion, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SharedRegion")
        .field("backend", &region.backend().raw_handle())
        .field("abi", region.abi())
        .finish()
}
