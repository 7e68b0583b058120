use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use rand::Rng;
use sangeet_audio::ring::StreamBuffer;

#[test]
fn test_oversized_write_returns_short() {
    let buffer = StreamBuffer::new(4096);

    let start = Instant::now();
    let written = buffer.write(&[0xAB; 5000], Duration::from_millis(50));

    assert!(written < 5000);
    assert_eq!(written, 4096);
    assert!(start.elapsed() >= Duration::from_millis(40));
    assert_eq!(buffer.len(), 4096);
    assert_eq!(buffer.stats().full_events, 1);
}

#[test]
fn test_blocked_write_completes_when_consumer_drains() {
    let buffer = Arc::new(StreamBuffer::new(1024));
    buffer.write(&[1; 1024], Duration::ZERO);

    let consumer = {
        let buffer = buffer.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            buffer.read(512)
        })
    };

    let written = buffer.write(&[2; 512], Duration::from_secs(2));
    assert_eq!(written, 512);
    assert_eq!(consumer.join().unwrap(), vec![1; 512]);
    assert_eq!(buffer.len(), 1024);
}

#[test]
fn test_fill_never_exceeds_capacity_under_contention() {
    let capacity = 777;
    let buffer = Arc::new(StreamBuffer::new(capacity));
    let start = Arc::new(Barrier::new(3));
    let done = Arc::new(AtomicBool::new(false));
    let max_fill = Arc::new(AtomicUsize::new(0));
    let total = 200_000usize;

    let producer = {
        let buffer = buffer.clone();
        let start = start.clone();
        std::thread::spawn(move || {
            let mut rng = rand::thread_rng();
            let mut next = 0usize;
            start.wait();
            while next < total {
                let len = rng.gen_range(1..=1500).min(total - next);
                let chunk: Vec<u8> = (next..next + len).map(|i| (i % 253) as u8).collect();
                let timeout = Duration::from_micros(rng.gen_range(0..500));
                next += buffer.write(&chunk, timeout);
            }
        })
    };

    let watcher = {
        let buffer = buffer.clone();
        let start = start.clone();
        let done = done.clone();
        let max_fill = max_fill.clone();
        std::thread::spawn(move || {
            start.wait();
            while !done.load(Ordering::Relaxed) {
                max_fill.fetch_max(buffer.len(), Ordering::Relaxed);
                std::thread::yield_now();
            }
        })
    };

    let mut rng = rand::thread_rng();
    let mut received = Vec::with_capacity(total);
    start.wait();
    let deadline = Instant::now() + Duration::from_secs(20);
    while received.len() < total && Instant::now() < deadline {
        let mut dst = vec![0u8; rng.gen_range(1..=1200)];
        let n = buffer.read_timeout(&mut dst, Duration::from_millis(5));
        received.extend_from_slice(&dst[..n]);
    }

    producer.join().expect("producer should complete");
    done.store(true, Ordering::Relaxed);
    watcher.join().expect("watcher should complete");

    assert_eq!(received.len(), total);
    // FIFO, nothing lost or duplicated
    assert!(received.iter().enumerate().all(|(i, &b)| b == (i % 253) as u8));
    assert!(max_fill.load(Ordering::Relaxed) <= capacity);

    let stats = buffer.stats();
    assert_eq!(stats.bytes_written, total as u64);
    assert_eq!(stats.bytes_read, total as u64);
    assert_eq!(stats.fill, 0);
}

#[test]
fn test_clear_unblocks_writer() {
    let buffer = Arc::new(StreamBuffer::new(256));
    buffer.write(&[9; 256], Duration::ZERO);

    let writer = {
        let buffer = buffer.clone();
        std::thread::spawn(move || buffer.write(&[3; 100], Duration::from_secs(2)))
    };

    std::thread::sleep(Duration::from_millis(20));
    buffer.clear();

    assert_eq!(writer.join().unwrap(), 100);
    assert_eq!(buffer.read(1000), vec![3; 100]);
}
