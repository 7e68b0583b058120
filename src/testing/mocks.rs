use std::collections::HashMap;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::core::lock::lock_mutex;
use crate::core::{PlayerEvent, PlayerObserver};
use crate::storage::{AudioStream, Storage};

#[derive(Debug, Clone, Default)]
struct MockFile {
    bytes: Vec<u8>,
    fail_after: Option<u64>,
    read_delay: Duration,
    seek_fails: bool,
}

/// In-memory storage that counts open handles.
#[derive(Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<String, MockFile>>,
    open_handles: Arc<AtomicUsize>,
    max_open_handles: Arc<AtomicUsize>,
    opens: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, bytes: Vec<u8>) {
        self.insert_file(path, MockFile {
            bytes,
            ..MockFile::default()
        });
    }

    /// Reads past `fail_after` bytes fail with an I/O error.
    pub fn insert_failing(&self, path: &str, bytes: Vec<u8>, fail_after: u64) {
        self.insert_file(path, MockFile {
            bytes,
            fail_after: Some(fail_after),
            ..MockFile::default()
        });
    }

    /// Every read sleeps for `read_delay` first, like a slow SD card.
    pub fn insert_slow(&self, path: &str, bytes: Vec<u8>, read_delay: Duration) {
        self.insert_file(path, MockFile {
            bytes,
            read_delay,
            ..MockFile::default()
        });
    }

    /// Opens fine, but every seek fails.
    pub fn insert_unseekable(&self, path: &str, bytes: Vec<u8>) {
        self.insert_file(path, MockFile {
            bytes,
            seek_fails: true,
            ..MockFile::default()
        });
    }

    fn insert_file(&self, path: &str, file: MockFile) {
        lock_mutex(&self.files, "MemoryStorage::insert").insert(path.to_string(), file);
    }

    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open handles seen so far.
    pub fn max_open_handles(&self) -> usize {
        self.max_open_handles.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl Storage for MemoryStorage {
    fn open(&self, path: &str) -> io::Result<Box<dyn AudioStream>> {
        let file = lock_mutex(&self.files, "MemoryStorage::open")
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))?;

        self.opens.fetch_add(1, Ordering::SeqCst);
        let open = self.open_handles.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open_handles.fetch_max(open, Ordering::SeqCst);

        Ok(Box::new(TrackedStream {
            inner: Cursor::new(file.bytes),
            fail_after: file.fail_after,
            read_delay: file.read_delay,
            seek_fails: file.seek_fails,
            handles: self.open_handles.clone(),
        }))
    }
}

struct TrackedStream {
    inner: Cursor<Vec<u8>>,
    fail_after: Option<u64>,
    read_delay: Duration,
    seek_fails: bool,
    handles: Arc<AtomicUsize>,
}

impl Read for TrackedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }
        if let Some(limit) = self.fail_after {
            if self.inner.position() >= limit {
                return Err(io::Error::other("simulated card read failure"));
            }
        }
        self.inner.read(buf)
    }
}

impl Seek for TrackedStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if self.seek_fails {
            return Err(io::Error::other("simulated seek failure"));
        }
        self.inner.seek(pos)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.handles.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Observer that keeps every event it receives.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<PlayerEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<PlayerEvent> {
        lock_mutex(&self.events, "RecordingObserver::events").clone()
    }

    pub fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&PlayerEvent) -> bool,
    {
        lock_mutex(&self.events, "RecordingObserver::count")
            .iter().filter(|e| predicate(e)).count()
    }

    /// Polls until an event matching `predicate` arrives or `timeout` passes.
    pub fn wait_for<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&PlayerEvent) -> bool,
    {
        wait_until(timeout, || self.count(&predicate) > 0)
    }
}

impl PlayerObserver for RecordingObserver {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_event(&self, event: &PlayerEvent) -> Result<()> {
        lock_mutex(&self.events, "RecordingObserver::on_event").push(event.clone());
        Ok(())
    }
}

/// Polls `condition` every millisecond until it holds or `timeout` passes.
pub fn wait_until<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// A fake 44-byte header followed by `pcm_len` bytes of a repeating ramp.
pub fn wav_bytes(pcm_len: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(44 + pcm_len);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&((36 + pcm_len) as u32).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.resize(40, 0);
    bytes.extend_from_slice(&(pcm_len as u32).to_le_bytes());
    bytes.extend((0..pcm_len).map(|i| (i % 251) as u8));
    bytes
}
