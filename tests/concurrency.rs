// Multi-threaded tests: every transition has exactly one winner, and chunks
// written by many writers reach a concurrent reader exactly once, intact.
//
// cargo test --test concurrency -- --nocapture
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};
use trace_smb::ABI::{ChunkMeta, ChunkState, PageLayout};
use trace_smb::Core::WriterIdAllocator;
use trace_smb::SMB::{RegionBuilder, WriterConfig};

const NUM_THREADS: usize = 8;

#[test]
fn test_single_winner_for_partition() {
    let region = RegionBuilder::new().with_num_pages(16).build().expect("heap region");
    let abi = region.abi();

    for page_idx in 0..abi.num_pages() {
        let winners = AtomicUsize::new(0);
        let barrier = Barrier::new(NUM_THREADS);
        thread::scope(|s| {
            for t in 0..NUM_THREADS {
                let (winners, barrier) = (&winners, &barrier);
                s.spawn(move || {
                    let layout = PageLayout::DIVISORS[t % PageLayout::DIVISORS.len()];
                    barrier.wait();
                    if abi.try_partition_page(page_idx, layout) {
                        winners.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
        });
        assert_eq!(winners.load(Ordering::Relaxed), 1, "page {page_idx}");
        assert!(abi.page_state(page_idx).is_partitioned());
    }
}

#[test]
fn test_single_winner_per_chunk() {
    let region = RegionBuilder::new().with_num_pages(4).build().expect("heap region");
    let abi = region.abi();
    for page_idx in 0..4 {
        assert!(abi.try_partition_page(page_idx, PageLayout::Div14));
    }

    let acquired = AtomicUsize::new(0);
    let barrier = Barrier::new(NUM_THREADS);
    let owners: Vec<Vec<(usize, usize)>> = thread::scope(|s| {
        let handles: Vec<_> = (0..NUM_THREADS)
            .map(|t| {
                let (acquired, barrier) = (&acquired, &barrier);
                s.spawn(move || {
                    let mut rng = fastrand::Rng::with_seed(t as u64);
                    let meta = ChunkMeta::new(0, t as u16 + 1);
                    let mut mine = Vec::new();
                    barrier.wait();
                    // Everybody races for every chunk, in a different order.
                    let mut slots: Vec<(usize, usize)> =
                        (0..4).flat_map(|p| (0..14).map(move |c| (p, c))).collect();
                    rng.shuffle(&mut slots);
                    for (page_idx, chunk_idx) in slots {
                        if let Some(chunk) = abi.try_acquire_chunk_for_writing(page_idx, chunk_idx, &meta) {
                            assert_eq!(chunk.writer_id(), t as u16 + 1);
                            acquired.fetch_add(1, Ordering::Relaxed);
                            mine.push((page_idx, chunk_idx));
                            assert_eq!(abi.release_chunk_as_complete(chunk), Some(page_idx));
                        }
                    }
                    mine
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("writer thread")).collect()
    });

    assert_eq!(acquired.load(Ordering::Relaxed), 4 * 14);
    let unique: HashSet<(usize, usize)> = owners.iter().flatten().copied().collect();
    assert_eq!(unique.len(), 4 * 14);
    for page_idx in 0..4 {
        assert!(abi.is_page_complete(page_idx));
        for chunk_idx in 0..14 {
            assert_eq!(abi.get_chunk_state(page_idx, chunk_idx), ChunkState::Complete);
        }
    }
}

#[test]
fn test_state_word_survives_concurrent_chunk_updates() {
    // All threads cycle different chunks of the same page, so every CAS
    // competes with the others. No update may be lost.
    let region = RegionBuilder::new().with_num_pages(1).build().expect("heap region");
    let abi = region.abi();
    let rounds = 2_000;

    for _ in 0..4 {
        assert!(abi.try_partition_page(0, PageLayout::Div14));
        // Chunk 0 stays BeingWritten for the whole round so the page never
        // goes back to unpartitioned under the workers.
        let pin = abi
            .try_acquire_chunk_for_writing(0, 0, &ChunkMeta::new(0, 1))
            .expect("free chunk");

        thread::scope(|s| {
            for t in 0..6usize {
                s.spawn(move || {
                    let (first, second) = (2 * t + 1, 2 * t + 2);
                    for chunk_idx in [first, second] {
                        for _ in 0..rounds {
                            let chunk = abi
                                .try_acquire_chunk_for_writing(0, chunk_idx, &ChunkMeta::new(0, 2))
                                .expect("own chunk is free");
                            chunk.increment_packet_count();
                            assert_eq!(abi.release_chunk_as_complete(chunk), Some(0));
                            let chunk = abi
                                .try_acquire_chunk_for_reading(0, chunk_idx)
                                .expect("own chunk is complete");
                            assert_eq!(abi.release_chunk_as_free(chunk), Some(0));
                        }
                    }
                    let chunk = abi
                        .try_acquire_chunk_for_writing(0, first, &ChunkMeta::new(1, 2))
                        .expect("own chunk is free");
                    assert_eq!(abi.release_chunk_as_complete(chunk), Some(0));
                });
            }
        });
        assert_eq!(abi.release_chunk_as_complete(pin), Some(0));

        let state = abi.page_state(0);
        println!("after round: {:?}", state);
        assert_eq!(state.chunk_state(0), ChunkState::Complete);
        for t in 0..6 {
            assert_eq!(state.chunk_state(2 * t + 1), ChunkState::Complete);
            assert_eq!(state.chunk_state(2 * t + 2), ChunkState::Free);
        }
        assert_eq!(state.chunk_state(13), ChunkState::Free);
        abi.release_all_chunks_as_free(0);
        assert_eq!(abi.page_state(0).raw(), 0);
    }
}

/// Payload pattern derived from the chunk identity, so the reader can check
/// it without side channels.
fn fill_byte(writer_id: u16, chunk_id: u16, i: usize) -> u8 {
    (writer_id as usize * 31 + chunk_id as usize * 7 + i) as u8
}

#[test]
fn test_writers_and_reader_stress() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    const CHUNKS_PER_WRITER: u16 = 2_000;
    let region = RegionBuilder::new()
        .with_page_size(4096)
        .with_num_pages(8)
        .build()
        .expect("heap region");
    let ids = WriterIdAllocator::default();
    let writers_done = AtomicBool::new(false);
    let start = Instant::now();

    let seen: HashSet<(u16, u16)> = thread::scope(|s| {
        let reader = s.spawn(|| {
            let reader = region.reader();
            let mut seen = HashSet::new();
            let mut check = |record: &trace_smb::SMB::ChunkRecord<'_>| {
                let meta = record.meta;
                assert_eq!(meta.packets.count, 1);
                let payload = record.payload;
                for (i, &b) in payload.iter().enumerate().take(64) {
                    assert_eq!(b, fill_byte(meta.writer_id, meta.chunk_id, i));
                }
                assert!(
                    seen.insert((meta.writer_id, meta.chunk_id)),
                    "chunk ({}, {}) read twice",
                    meta.writer_id,
                    meta.chunk_id
                );
            };
            loop {
                let done = writers_done.load(Ordering::Acquire);
                let read = reader.poll(&mut check);
                if done && read == 0 {
                    break;
                }
                if read == 0 {
                    thread::yield_now();
                }
            }
            seen
        });

        let writer_handles: Vec<_> = (0..NUM_THREADS)
            .map(|_| {
                let writer_id = ids.allocate().expect("free writer id");
                let layout = PageLayout::DIVISORS[writer_id as usize % PageLayout::DIVISORS.len()];
                let region = &region;
                s.spawn(move || {
                    let mut writer = region
                        .writer(WriterConfig::new(writer_id).with_layout(layout))
                        .expect("writer");
                    let mut rng = fastrand::Rng::with_seed(writer_id as u64);
                    let mut written = 0;
                    while written < CHUNKS_PER_WRITER {
                        let Some(mut chunk) = writer.new_chunk() else {
                            thread::yield_now();
                            continue;
                        };
                        let chunk_id = chunk.chunk_id();
                        for (i, b) in chunk.payload_mut().iter_mut().enumerate().take(64) {
                            *b = fill_byte(writer_id, chunk_id, i);
                        }
                        chunk.increment_packet_count();
                        if rng.u8(..) < 8 {
                            thread::yield_now();
                        }
                        assert!(writer.return_chunk(chunk).is_some());
                        written += 1;
                    }
                    writer.chunks_returned()
                })
            })
            .collect();

        let total: u64 = writer_handles
            .into_iter()
            .map(|h| h.join().expect("writer thread"))
            .sum();
        assert_eq!(total, NUM_THREADS as u64 * CHUNKS_PER_WRITER as u64);
        writers_done.store(true, Ordering::Release);
        reader.join().expect("reader thread")
    });

    println!(
        "{} chunks from {} writers read in {:?}",
        seen.len(),
        NUM_THREADS,
        start.elapsed()
    );
    assert_eq!(seen.len(), NUM_THREADS * CHUNKS_PER_WRITER as usize);
    for writer_id in 1..=NUM_THREADS as u16 {
        for chunk_id in 0..CHUNKS_PER_WRITER {
            assert!(seen.contains(&(writer_id, chunk_id)));
        }
    }
    for page_idx in 0..region.abi().num_pages() {
        assert!(region.abi().is_page_free(page_idx), "page {page_idx} left in use");
    }
    assert!(start.elapsed() < Duration::from_secs(60));
}
