// Page and chunk geometry of the shared memory buffer.
//
// A region is an array of equally sized pages. Every page starts with a
// `PageHeader` and is then split into 1, 2, 4, 7 or 14 equally sized chunks.
// Every chunk starts with a `ChunkHeader` (see header.rs) followed by payload.
//
//   page:  [ PageHeader | chunk 0 | chunk 1 | ... | chunk N-1 | tail padding ]
//   chunk: [ ChunkHeader | payload ............................. ]

use super::header::ChunkHeader;
use std::mem::size_of;
use std::sync::atomic::AtomicU32;

/// Smallest supported page size. Region starts must be aligned to it.
pub const MIN_PAGE_SIZE: usize = 4096;

/// Largest supported page size. Chunk sizes must fit the 16-bit range.
pub const MAX_PAGE_SIZE: usize = 65536;

/// Highest number of chunks a page can be divided into (`PageLayout::Div14`).
pub const MAX_CHUNKS_PER_PAGE: usize = 14;

/// Size of the header at the start of every page.
pub const PAGE_HEADER_SIZE: usize = size_of::<PageHeader>();

/// Size of the header at the start of every chunk.
pub const CHUNK_HEADER_SIZE: usize = size_of::<ChunkHeader>();

/// Number of distinct layout tags encodable in the page header (3 bits).
pub const NUM_PAGE_LAYOUTS: usize = 8;

/// The header located at the very beginning of every page.
///
/// The `layout` word is the only state shared between writers and the reader
/// for this page: the partitioning tag and the state of every chunk. See
/// `state::PageState` for its bit layout.
#[repr(C, align(8))]
pub struct PageHeader {
    /// Layout tag (bits 28..30) + 14 x 2-bit chunk states (bits 0..27).
    pub layout: AtomicU32,

    /// Reserved, keeps the first chunk 8-byte aligned.
    pub reserved: u32,
}

const _: () = assert!(size_of::<PageHeader>() == 8);
const _: () = assert!(size_of::<ChunkHeader>() == 8);

/// How a page is partitioned into chunks.
///
/// The discriminant is the tag stored in the page header. Tags 6 and 7 are
/// reserved and never produced by this crate.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageLayout {
    /// The page is not partitioned and not in use.
    NotPartitioned = 0,
    /// One chunk spanning the whole page.
    Div1 = 1,
    Div2 = 2,
    Div4 = 3,
    Div7 = 4,
    Div14 = 5,
}

impl PageLayout {
    /// Every layout that actually splits a page, smallest chunk count first.
    pub const DIVISORS: [PageLayout; 5] = [
        PageLayout::Div1,
        PageLayout::Div2,
        PageLayout::Div4,
        PageLayout::Div7,
        PageLayout::Div14,
    ];

    /// Decode a layout tag. Returns `None` for the reserved tags.
    pub const fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(PageLayout::NotPartitioned),
            1 => Some(PageLayout::Div1),
            2 => Some(PageLayout::Div2),
            3 => Some(PageLayout::Div4),
            4 => Some(PageLayout::Div7),
            5 => Some(PageLayout::Div14),
            _ => None,
        }
    }

    #[inline]
    pub const fn tag(self) -> u32 {
        self as u32
    }

    /// Number of chunks in a page with this layout.
    #[inline]
    pub const fn num_chunks(self) -> usize {
        match self {
            PageLayout::NotPartitioned => 0,
            PageLayout::Div1 => 1,
            PageLayout::Div2 => 2,
            PageLayout::Div4 => 4,
            PageLayout::Div7 => 7,
            PageLayout::Div14 => 14,
        }
    }

    /// Bitmask with one bit set per chunk of this layout (e.g. Div4 => 0x0F).
    #[inline]
    pub const fn free_mask(self) -> u32 {
        (1u32 << self.num_chunks()) - 1
    }

    /// Size of each chunk, header included, for the given page size.
    ///
    /// Rounded down to a multiple of 4 so that every chunk header stays
    /// aligned. Zero for `NotPartitioned`.
    #[inline]
    pub const fn chunk_size(self, page_size: usize) -> usize {
        let num_chunks = self.num_chunks();
        if num_chunks == 0 {
            return 0;
        }
        let size = (page_size - PAGE_HEADER_SIZE) / num_chunks;
        size - (size % 4)
    }
}

/// The geometry of a partitioned page: what `layout_for` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    pub num_chunks: usize,
    /// Chunk size in bytes, `ChunkHeader` included.
    pub chunk_size: usize,
    pub free_mask: u32,
}

impl ChunkLayout {
    pub const fn for_page_size(layout: PageLayout, page_size: usize) -> Self {
        Self {
            num_chunks: layout.num_chunks(),
            chunk_size: layout.chunk_size(page_size),
            free_mask: layout.free_mask(),
        }
    }

    /// Bytes available to the writer in each chunk.
    #[inline]
    pub const fn payload_size(&self) -> usize {
        self.chunk_size.saturating_sub(CHUNK_HEADER_SIZE)
    }
}

/// Whether `page_size` is one of the supported page sizes.
#[inline]
pub const fn is_valid_page_size(page_size: usize) -> bool {
    page_size.is_power_of_two() && page_size >= MIN_PAGE_SIZE && page_size <= MAX_PAGE_SIZE
}
