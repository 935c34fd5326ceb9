//! Monotonic request counter.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe, monotonically increasing counter.
///
/// Every call to [`AtomicCounter::increment`] observes a distinct value, so
/// concurrent requests within one session never share a request index.
#[derive(Debug, Default)]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    /// Create a counter starting at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Increment and return the post-increment value.
    pub fn increment(&self) -> u64 {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current value without incrementing.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}
