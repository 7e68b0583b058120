use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

fn log_poisoned(lock_type: &str, context: &str) {
    log::error!("{} lock poisoned in {}", lock_type, context);
}

/// Locks a mutex, recovering the guard if a panicking thread poisoned it.
pub fn lock_mutex<'a, T>(mutex: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log_poisoned("Mutex", context);
            poisoned.into_inner()
        }
    }
}

/// Waits on `condvar` for at most `timeout`. Returns the guard and whether
/// the wait ended because the timeout elapsed.
pub fn wait_condvar_timeout<'a, T>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
    timeout: Duration,
    context: &str,
) -> (MutexGuard<'a, T>, bool) {
    match condvar.wait_timeout(guard, timeout) {
        Ok((guard, result)) => (guard, result.timed_out()),
        Err(poisoned) => {
            log_poisoned("Condvar", context);
            let (guard, result) = poisoned.into_inner();
            (guard, result.timed_out())
        }
    }
}
