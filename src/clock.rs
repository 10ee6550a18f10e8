//! Logical clocks consumed by the fake queue.
//!
//! The queue never measures time itself. Every enqueue and dispatch pass reads
//! the instant from a [`Clock`], and tests move time forward explicitly with
//! [`MockClock::advance`].
//!
//! # Examples
//!
//! ```rust
//! use fakequeue::clock::{Clock, MockClock};
//! use chrono::Duration;
//!
//! let clock = MockClock::new();
//! let start = clock.now();
//!
//! clock.advance(Duration::seconds(10));
//!
//! assert_eq!((clock.now() - start).num_seconds(), 10);
//! ```

use chrono::{DateTime, Utc};
use std::{
    fmt::Debug,
    sync::{Arc, Mutex, PoisonError},
};

/// Source of the current instant.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock clock for controlling time in tests.
///
/// Clones share the same instant, so a test can keep one handle while the
/// queue holds another.
///
/// ```rust
/// use fakequeue::clock::{Clock, MockClock};
/// use chrono::{Duration, TimeZone, Utc};
///
/// let clock = MockClock::new();
/// let shared = clock.clone();
///
/// clock.set_time(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
/// shared.advance(Duration::minutes(30));
///
/// assert_eq!(clock.now(), Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap());
/// ```
#[derive(Clone, Debug)]
pub struct MockClock {
    current_time: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Create a mock clock frozen at `time`.
    pub fn starting_at(time: DateTime<Utc>) -> Self {
        Self {
            current_time: Arc::new(Mutex::new(time)),
        }
    }

    /// Advance the mock time by the given duration.
    pub fn advance(&self, duration: chrono::Duration) {
        let mut time = self
            .current_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *time += duration;
    }

    /// Set the mock time to a specific instant.
    pub fn set_time(&self, time: DateTime<Utc>) {
        *self
            .current_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = time;
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self
            .current_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}
