//! Mock time source for deterministic testing
//!
//! Lets tests drive debounce, hold and timeout deadlines precisely without
//! sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use peerchat_core::{TimeSource, Timestamp};

// ----------------------------------------------------------------------------
// Mock Time Source
// ----------------------------------------------------------------------------

/// Shared, manually advanced clock
///
/// Clones observe the same time, so a test can keep one handle while the
/// manager under test owns another.
#[derive(Debug, Clone)]
pub struct MockTimeSource {
    current_time: Arc<AtomicU64>,
}

impl MockTimeSource {
    /// Create a new mock time source starting at time 0
    pub fn new() -> Self {
        Self::new_at(0)
    }

    /// Create a new mock time source starting at a specific time
    pub fn new_at(start_time: u64) -> Self {
        Self {
            current_time: Arc::new(AtomicU64::new(start_time)),
        }
    }

    /// Advance time by the specified number of milliseconds
    pub fn advance(&self, millis: u64) {
        self.current_time.fetch_add(millis, Ordering::SeqCst);
    }

    /// Set the time to a specific value
    pub fn set_time(&self, millis: u64) {
        self.current_time.store(millis, Ordering::SeqCst);
    }

    pub fn current_time(&self) -> u64 {
        self.current_time.load(Ordering::SeqCst)
    }
}

impl Default for MockTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.current_time())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
