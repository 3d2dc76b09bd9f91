// In demos/consumer.rs
//
// Attaches to the buffer created by demos/producer.rs, reads every complete
// chunk and checks each "<n>:<hash>" packet against sha256("message_<n>").
use sha2::{Digest, Sha256};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use trace_smb::SMB::{ChunkRecord, RegionBuilder};

const SHM_NAME: &str = "trace_smb_demo";
const PAGE_SIZE: usize = 4096;

#[derive(Default)]
struct Tally {
    received: usize,
    corrupted: usize,
}

/// Split a chunk payload back into its length-prefixed packets.
fn check_chunk(record: &ChunkRecord<'_>, tally: &mut Tally) {
    let mut offset = 0;
    for _ in 0..record.meta.packets.count {
        let Some(len_bytes) = record.payload.get(offset..offset + 2) else {
            tally.corrupted += 1;
            return;
        };
        let len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
        let Some(packet) = record.payload.get(offset + 2..offset + 2 + len) else {
            tally.corrupted += 1;
            return;
        };
        offset += 2 + len;

        let valid = std::str::from_utf8(packet)
            .ok()
            .and_then(|message| message.split_once(':'))
            .map(|(num, hash)| {
                let expected = format!("{:x}", Sha256::digest(format!("message_{}", num).as_bytes()));
                expected == hash
            })
            .unwrap_or(false);

        if valid {
            tally.received += 1;
            if tally.received % 1000 == 0 {
                println!("--- Received {} messages ---", tally.received);
            }
        } else {
            tally.corrupted += 1;
            eprintln!(
                "Bad packet in chunk {} of writer {}: {:?}",
                record.meta.chunk_id,
                record.meta.writer_id,
                String::from_utf8_lossy(packet)
            );
        }
    }
}

fn main() -> trace_smb::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <expected_messages>", args[0]);
        std::process::exit(1);
    }
    let expected_messages: usize = args[1].parse().expect("Invalid number of messages");

    println!("Consumer: Attaching to /dev/shm/{}...", SHM_NAME);
    let region = match RegionBuilder::new()
        .with_page_size(PAGE_SIZE)
        .with_name(SHM_NAME)
        .attach()
    {
        Ok(region) => region,
        Err(e) => {
            eprintln!("Failed to attach: {}", e);
            return Err(e);
        }
    };
    println!("Consumer: Attached, {} pages", region.abi().num_pages());

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);
    ctrlc::set_handler(move || {
        running_for_handler.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    let reader = region.reader();
    let mut tally = Tally::default();
    let mut chunks = 0;
    let start = Instant::now();
    let mut last_progress = Instant::now();

    while tally.received < expected_messages && running.load(Ordering::SeqCst) {
        let read = reader.poll(|record| check_chunk(record, &mut tally));
        chunks += read;
        if read > 0 {
            last_progress = Instant::now();
        } else if last_progress.elapsed() > Duration::from_secs(5) {
            eprintln!("Timeout waiting for chunks");
            break;
        } else {
            std::thread::yield_now();
        }
    }

    let elapsed = start.elapsed();
    println!(
        "Consumer: Received {} messages ({} corrupted) in {} chunks in {:.2?}",
        tally.received, tally.corrupted, chunks, elapsed
    );
    println!(
        "Average: {:.2} messages/second",
        tally.received as f64 / elapsed.as_secs_f64()
    );

    if tally.received == expected_messages && tally.corrupted == 0 {
        println!("All messages received successfully");
    } else {
        std::process::exit(1);
    }
    Ok(())
}
