use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::core::lock::{lock_mutex, wait_condvar_timeout};
use crate::core::logging::{ComponentLogger, LogContext};

/// Byte storage plus cursors. Only touched with the mutex held.
#[derive(Debug)]
struct Ring {
    data: Box<[u8]>,
    head: usize,
    len: usize,
}

impl Ring {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Copies as much of `src` as fits. Returns the number of bytes taken.
    fn push(&mut self, src: &[u8]) -> usize {
        let cap = self.capacity();
        let n = src.len().min(self.free());
        if n == 0 {
            return 0;
        }

        let tail = (self.head + self.len) % cap;
        let first = n.min(cap - tail);
        self.data[tail..tail + first].copy_from_slice(&src[..first]);
        self.data[..n - first].copy_from_slice(&src[first..n]);

        self.len += n;
        n
    }

    fn pop(&mut self, dst: &mut [u8]) -> usize {
        let cap = self.capacity();
        let n = dst.len().min(self.len);
        if n == 0 {
            return 0;
        }

        let first = n.min(cap - self.head);
        dst[..first].copy_from_slice(&self.data[self.head..self.head + first]);
        dst[first..n].copy_from_slice(&self.data[..n - first]);

        self.head = (self.head + n) % cap;
        self.len -= n;
        n
    }
}

/// Fixed-capacity byte ring between the reader worker (producer) and the
/// audio output (consumer).
///
/// The allocation is made once in [`StreamBuffer::new`] and never resized.
/// `write` blocks for free space up to a caller-supplied timeout, `read`
/// never blocks.
pub struct StreamBuffer {
    ring: Mutex<Ring>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
    full_events: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamBufferStats {
    pub capacity: usize,
    pub fill: usize,
    pub bytes_written: u64,
    pub bytes_read: u64,
    /// Writes that returned fewer bytes than requested.
    pub full_events: u64,
}

impl StreamBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        Self {
            ring: Mutex::new(Ring {
                data: vec![0u8; capacity].into_boxed_slice(),
                head: 0,
                len: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
            bytes_written: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            full_events: AtomicU64::new(0),
        }
    }

    /// Enqueues up to `bytes.len()` bytes, waiting at most `timeout` for the
    /// consumer to make room. Returns the number of bytes written, which is
    /// short (possibly 0) when the buffer stayed full until the deadline.
    pub fn write(&self, bytes: &[u8], timeout: Duration) -> usize {
        if bytes.is_empty() {
            return 0;
        }

        let deadline = Instant::now() + timeout;
        let mut written = 0;
        let mut ring = lock_mutex(&self.ring, "StreamBuffer::write");

        loop {
            let n = ring.push(&bytes[written..]);
            if n > 0 {
                written += n;
                self.not_empty.notify_one();
            }
            if written == bytes.len() {
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }

            let (guard, _) =
                wait_condvar_timeout(&self.not_full, ring, deadline - now, "StreamBuffer::write");
            ring = guard;
        }
        drop(ring);

        self.bytes_written.fetch_add(written as u64, Ordering::Relaxed);
        if written < bytes.len() {
            self.full_events.fetch_add(1, Ordering::Relaxed);
        }

        written
    }

    /// Drains up to `max_len` bytes. Returns an empty vector if nothing is
    /// buffered.
    pub fn read(&self, max_len: usize) -> Vec<u8> {
        let mut out = vec![0u8; max_len.min(self.capacity)];
        let n = self.read_into(&mut out);
        out.truncate(n);
        out
    }

    /// Non-allocating variant of [`StreamBuffer::read`].
    pub fn read_into(&self, dst: &mut [u8]) -> usize {
        let n = lock_mutex(&self.ring, "StreamBuffer::read").pop(dst);
        self.finish_read(n)
    }

    /// Like [`StreamBuffer::read_into`] but waits up to `timeout` for data
    /// when the buffer is empty.
    pub fn read_timeout(&self, dst: &mut [u8], timeout: Duration) -> usize {
        if dst.is_empty() {
            return 0;
        }

        let deadline = Instant::now() + timeout;
        let mut ring = lock_mutex(&self.ring, "StreamBuffer::read_timeout");
        while ring.len == 0 {
            let now = Instant::now();
            if now >= deadline {
                return 0;
            }
            let (guard, _) = wait_condvar_timeout(
                &self.not_empty,
                ring,
                deadline - now,
                "StreamBuffer::read_timeout",
            );
            ring = guard;
        }

        let n = ring.pop(dst);
        drop(ring);
        self.finish_read(n)
    }

    fn finish_read(&self, n: usize) -> usize {
        if n > 0 {
            self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
            self.not_full.notify_one();
        }
        n
    }

    /// Drops buffered bytes without releasing the allocation.
    pub fn clear(&self) {
        let dropped = {
            let mut ring = lock_mutex(&self.ring, "StreamBuffer::clear");
            let dropped = ring.len;
            ring.head = 0;
            ring.len = 0;
            dropped
        };
        self.not_full.notify_all();
        self.debug(&format!("cleared {} buffered bytes", dropped));
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        lock_mutex(&self.ring, "StreamBuffer::len").len
    }

    pub fn free(&self) -> usize {
        lock_mutex(&self.ring, "StreamBuffer::free").free()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StreamBufferStats {
        StreamBufferStats {
            capacity: self.capacity,
            fill: self.len(),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            full_events: self.full_events.load(Ordering::Relaxed),
        }
    }
}

impl ComponentLogger for StreamBuffer {
    fn log_context(&self) -> LogContext {
        LogContext::new("StreamBuffer", &format!("{}B", self.capacity))
    }
}
