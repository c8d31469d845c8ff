//! Time management for the device
//!
//! Telemetry timestamps are whole seconds, matching the 32-bit field of the
//! wire frame. Sources:
//! - Monotonic counter (seconds since boot)
//! - System clock (when running on a host)
//! - Fixed time (tests)

use core::sync::atomic::{AtomicU32, Ordering};

/// Timestamp in seconds since epoch (or since boot for monotonic sources)
pub type Timestamp = u32;

/// Source of time for the system
pub trait TimeSource {
    /// Get current timestamp in seconds
    fn now(&self) -> Timestamp;

    /// Check if this source provides wall clock time (vs monotonic)
    fn is_wall_clock(&self) -> bool;
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn now(&self) -> Timestamp {
        (**self).now()
    }

    fn is_wall_clock(&self) -> bool {
        (**self).is_wall_clock()
    }
}

/// Monotonic time source driven by a tick handler
///
/// Starts at 0 on boot; the platform timer calls [`MonotonicTime::tick`]
/// once per second.
#[derive(Debug)]
pub struct MonotonicTime {
    seconds: AtomicU32,
}

impl MonotonicTime {
    pub const fn new() -> Self {
        Self { seconds: AtomicU32::new(0) }
    }

    /// Advance by one second
    pub fn tick(&self) {
        self.seconds.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    fn now(&self) -> Timestamp {
        self.seconds.load(Ordering::Relaxed)
    }

    fn is_wall_clock(&self) -> bool {
        false
    }
}

/// System time source (requires std)
#[cfg(feature = "std")]
#[derive(Debug, Clone, Default)]
pub struct SystemTime;

#[cfg(feature = "std")]
impl TimeSource for SystemTime {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime as StdSystemTime, UNIX_EPOCH};

        let secs = StdSystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        // Saturate instead of wrapping in 2106
        secs.min(Timestamp::MAX as u64) as Timestamp
    }

    fn is_wall_clock(&self) -> bool {
        true
    }
}

/// Fixed time source for testing
#[derive(Debug, Clone)]
pub struct FixedTime {
    timestamp: Timestamp,
}

impl FixedTime {
    pub fn new(timestamp: Timestamp) -> Self {
        Self { timestamp }
    }

    pub fn set(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    pub fn advance(&mut self, secs: u32) {
        self.timestamp = self.timestamp.saturating_add(secs);
    }
}

impl TimeSource for FixedTime {
    fn now(&self) -> Timestamp {
        self.timestamp
    }

    fn is_wall_clock(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_time_advances() {
        let mut time = FixedTime::new(1000);
        assert_eq!(time.now(), 1000);

        time.advance(5);
        assert_eq!(time.now(), 1005);

        time.set(Timestamp::MAX);
        time.advance(1);
        assert_eq!(time.now(), Timestamp::MAX);
    }

    #[test]
    fn monotonic_ticks() {
        let time = MonotonicTime::new();
        assert_eq!(time.now(), 0);
        time.tick();
        time.tick();
        assert_eq!(time.now(), 2);
        assert!(!time.is_wall_clock());
    }
}
