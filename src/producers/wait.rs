use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::core::lock::{lock_mutex, wait_condvar_timeout};

/// Interruptible sleep for worker threads.
///
/// The condition is always re-checked with the lock held and `notify_all`
/// takes the same lock, so a flag set before `notify_all` is never missed.
pub struct StopWait {
    lock: Mutex<()>,
    condvar: Condvar,
}

impl StopWait {
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    /// Sleeps while `keep_waiting` returns true, for at most `duration`.
    /// Returns `true` if the condition cleared before the timeout.
    pub fn wait_while<F>(&self, duration: Duration, keep_waiting: F) -> bool
    where
        F: Fn() -> bool,
    {
        let deadline = Instant::now() + duration;
        let mut guard = lock_mutex(&self.lock, "StopWait::wait_while");

        loop {
            if !keep_waiting() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) =
                wait_condvar_timeout(&self.condvar, guard, deadline - now, "StopWait::wait_while");
            guard = next;
        }
    }

    pub fn notify_all(&self) {
        let _guard = lock_mutex(&self.lock, "StopWait::notify_all");
        self.condvar.notify_all();
    }
}

impl Default for StopWait {
    fn default() -> Self {
        Self::new()
    }
}
