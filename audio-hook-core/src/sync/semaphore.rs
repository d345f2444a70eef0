use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Upper bound on a single wait. `release` never takes the lock, so a
/// notification can slip between a waiter's check and its wait; the
/// timeout bounds how long such a miss can stall the waiter.
const WAIT_SLICE: Duration = Duration::from_millis(5);

/// Counting semaphore whose `release` and `try_acquire` are lock-free.
///
/// Producers in signal context may only call `release` or `try_acquire`.
/// `acquire` blocks and belongs on worker or blocking producer threads.
pub struct Semaphore {
    permits: AtomicUsize,
    lock: Mutex<()>,
    wakeup: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: AtomicUsize::new(permits),
            lock: Mutex::new(()),
            wakeup: Condvar::new(),
        }
    }

    /// Take a permit if one is available, without blocking.
    pub fn try_acquire(&self) -> bool {
        let mut current = self.permits.load(Ordering::Acquire);
        while current > 0 {
            match self.permits.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }

    /// Block until a permit is available and take it.
    pub fn acquire(&self) {
        while !self.try_acquire() {
            let mut guard = self.lock.lock();
            if self.permits.load(Ordering::Acquire) == 0 {
                self.wakeup.wait_for(&mut guard, WAIT_SLICE);
            }
        }
    }

    /// Return a permit and wake one waiter.
    pub fn release(&self) {
        self.permits.fetch_add(1, Ordering::AcqRel);
        self.wakeup.notify_one();
    }

    pub fn available(&self) -> usize {
        self.permits.load(Ordering::Acquire)
    }

    /// Force the permit count. Only valid while no thread waits on it.
    pub(crate) fn reset(&self, permits: usize) {
        self.permits.store(permits, Ordering::Release);
    }
}
