// In demos/producer.rs
//
// Creates a named shared memory buffer and writes "<n>:<sha256 of message_n>"
// packets into it, several per chunk. Run demos/consumer.rs alongside it.
//
// cargo run --example producer -- 1000 --auto-exit
use sha2::{Digest, Sha256};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use trace_smb::ABI::{Chunk, PageLayout};
use trace_smb::SMB::{RegionBuilder, WriterConfig};

const SHM_NAME: &str = "trace_smb_demo";
const PAGE_SIZE: usize = 4096;
const NUM_PAGES: usize = 32;
const WRITER_ID: u16 = 1;

/// Append one length-prefixed packet. False if it does not fit.
fn write_packet(chunk: &mut Chunk<'_>, offset: &mut usize, packet: &[u8]) -> bool {
    let end = *offset + 2 + packet.len();
    if end > chunk.payload_size() {
        return false;
    }
    let payload = chunk.payload_mut();
    payload[*offset..*offset + 2].copy_from_slice(&(packet.len() as u16).to_le_bytes());
    payload[*offset + 2..end].copy_from_slice(packet);
    *offset = end;
    chunk.increment_packet_count();
    true
}

fn main() -> trace_smb::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <num_messages> [--auto-exit]", args[0]);
        std::process::exit(1);
    }

    let num_messages: usize = args[1].parse().expect("Invalid number of messages");
    let auto_exit = args.get(2).map(|s| s == "--auto-exit").unwrap_or(false);

    println!("Producer: Precomputing {} hashes...", num_messages);
    let start_precompute = Instant::now();
    let hashes: Vec<String> = (0..num_messages)
        .map(|i| format!("{:x}", Sha256::digest(format!("message_{}", i).as_bytes())))
        .collect();
    println!(
        "Producer: Precomputed {} hashes in {:.2?}",
        num_messages,
        start_precompute.elapsed()
    );

    let region = RegionBuilder::new()
        .with_page_size(PAGE_SIZE)
        .with_num_pages(NUM_PAGES)
        .with_name(SHM_NAME)
        .build()?;
    let mut writer = region.writer(WriterConfig::new(WRITER_ID).with_layout(PageLayout::Div4))?;

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);

    // Handle Ctrl+C to clean up
    ctrlc::set_handler(move || {
        running_for_handler.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    println!("Producer: Created /dev/shm/{} ({} pages)", SHM_NAME, NUM_PAGES);

    let start_send = Instant::now();
    let mut current: Option<Chunk<'_>> = None;
    let mut offset = 0;
    let mut sent = 0;
    let mut chunks = 0;

    'messages: for (i, hash) in hashes.iter().enumerate() {
        // Format: "message_number:hash"
        let message = format!("{}:{}", i, hash);

        loop {
            if let Some(chunk) = current.as_mut() {
                if write_packet(chunk, &mut offset, message.as_bytes()) {
                    break;
                }
            }
            // Current chunk is full (or there is none yet): hand it over.
            if let Some(full) = current.take() {
                writer.return_chunk(full);
                chunks += 1;
            }
            match writer.new_chunk() {
                Some(chunk) => {
                    current = Some(chunk);
                    offset = 0;
                }
                None => {
                    if !running.load(Ordering::SeqCst) {
                        break 'messages;
                    }
                    // Buffer full, wait for the consumer
                    std::thread::sleep(Duration::from_micros(50));
                }
            }
        }

        sent += 1;
        if sent % 1000 == 0 {
            println!("Sent {} messages", sent);
        }
    }

    if let Some(last) = current.take() {
        writer.return_chunk(last);
        chunks += 1;
    }

    let send_time = start_send.elapsed();
    println!(
        "Producer: Sent {} messages in {} chunks in {:.2?}",
        sent, chunks, send_time
    );
    println!(
        "Producer: Throughput: {:.2} messages/sec",
        sent as f64 / send_time.as_secs_f64()
    );

    let abi = region.abi();
    let drained = |abi: &trace_smb::ABI::SharedMemoryAbi| (0..abi.num_pages()).all(|p| abi.is_page_free(p));

    if auto_exit {
        println!("Producer: Auto-exit mode, waiting up to 5 seconds for consumer...");
        let deadline = Instant::now() + Duration::from_secs(5);
        while !drained(abi) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
    } else {
        println!("Waiting for consumer to finish processing (press Ctrl+C to exit)...");
        while running.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    println!(
        "Producer: Shutting down ({})",
        if drained(abi) { "buffer drained" } else { "chunks left unread" }
    );
    Ok(())
}
