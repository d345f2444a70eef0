use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of capture timestamps. Values are opaque and passed downstream
/// unmodified.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Microseconds elapsed since the clock was created.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Clock that returns whatever it was last set to.
#[derive(Debug, Default)]
pub struct ManualClock {
    value: AtomicU64,
}

impl ManualClock {
    pub fn new(value: u64) -> Self {
        Self {
            value: AtomicU64::new(value),
        }
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}
