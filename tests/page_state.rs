// Tests for the packed page state word, independent of any memory region.
use trace_smb::ABI::state::{chunks_mask, ALL_CHUNKS_MASK, LAYOUT_SHIFT};
use trace_smb::ABI::{ChunkState, PageLayout, PageState};

#[test]
fn test_unpartitioned_word() {
    let state = PageState::UNPARTITIONED;
    assert_eq!(state.raw(), 0);
    assert!(!state.is_partitioned());
    assert_eq!(state.layout(), Some(PageLayout::NotPartitioned));
    assert_eq!(state.num_chunks(), 0);
    assert_eq!(state.free_chunks(), 0);
    assert!(state.is_free());
    assert!(!state.is_complete());
}

#[test]
fn test_partitioned_word() {
    for layout in PageLayout::DIVISORS {
        let state = PageState::partitioned(layout);
        assert_eq!(state.raw(), layout.tag() << LAYOUT_SHIFT);
        assert_eq!(state.layout(), Some(layout));
        assert_eq!(state.num_chunks(), layout.num_chunks());
        assert_eq!(state.free_chunks(), layout.free_mask());
        for chunk_idx in 0..layout.num_chunks() {
            assert_eq!(state.chunk_state(chunk_idx), ChunkState::Free);
        }
        assert!(!state.is_complete());
    }
}

#[test]
fn test_with_chunk_state_only_touches_one_slot() {
    let mut state = PageState::partitioned(PageLayout::Div14);
    state = state.with_chunk_state(3, ChunkState::Complete);
    state = state.with_chunk_state(13, ChunkState::BeingRead);
    state = state.with_chunk_state(0, ChunkState::BeingWritten);

    assert_eq!(state.layout(), Some(PageLayout::Div14));
    assert_eq!(state.chunk_state(0), ChunkState::BeingWritten);
    assert_eq!(state.chunk_state(3), ChunkState::Complete);
    assert_eq!(state.chunk_state(13), ChunkState::BeingRead);
    assert_eq!(state.free_chunks(), 0x3FFF & !(1 << 0 | 1 << 3 | 1 << 13));

    let state = state.with_chunk_state(3, ChunkState::Free);
    assert_eq!(state.chunk_state(3), ChunkState::Free);
    assert_eq!(state.chunk_state(0), ChunkState::BeingWritten);
}

#[test]
fn test_aggregate_predicates() {
    let layout = PageLayout::Div4;
    let mut state = PageState::partitioned(layout);
    for chunk_idx in 0..4 {
        assert!(!state.is_complete());
        state = state.with_chunk_state(chunk_idx, ChunkState::Complete);
    }
    assert!(state.is_complete());
    assert!(!state.is_free());
    assert_eq!(state.chunks_in_state(ChunkState::Complete), 0xF);

    // Garbage in the unused slots of a Div4 page does not matter.
    let noisy = PageState::from_raw(state.raw() | (0b11 << 20));
    assert!(noisy.is_complete());
}

#[test]
fn test_reserved_layout_tag_is_inert() {
    for tag in [6u32, 7] {
        let state = PageState::from_raw((tag << LAYOUT_SHIFT) | ALL_CHUNKS_MASK);
        assert_eq!(state.layout(), None);
        assert_eq!(state.num_chunks(), 0);
        assert_eq!(state.free_chunks(), 0);
        assert!(!state.is_free());
        assert!(!state.is_complete());
    }
}

#[test]
fn test_chunks_mask() {
    assert_eq!(chunks_mask(0), 0);
    assert_eq!(chunks_mask(1), 0b11);
    assert_eq!(chunks_mask(4), 0xFF);
    assert_eq!(chunks_mask(7), 0x3FFF);
    assert_eq!(chunks_mask(14), ALL_CHUNKS_MASK);
}

#[test]
fn test_debug_output() {
    let state = PageState::partitioned(PageLayout::Div4)
        .with_chunk_state(0, ChunkState::BeingRead)
        .with_chunk_state(3, ChunkState::Complete);
    let printed = format!("{:?}", state);
    println!("{printed}");
    assert!(printed.contains("Div4"));
    assert!(printed.contains("RFFC"));
}
