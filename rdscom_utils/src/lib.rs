//! Utilities shared by the `rdscom` crates.
//!
//! This crate provides the time sources the communication interface is driven by, and
//! small helpers for moving bytes through `rtrb` ring buffers.

pub mod queue;

use std::sync::{Arc, atomic};

/// A source of monotonic time, in milliseconds.
///
/// Successive readings must never decrease for the lifetime of the process. The origin
/// is arbitrary: only differences between readings are meaningful.
///
/// Closures returning `u64` implement this trait, so any platform clock can be plugged in
/// directly:
///
/// ```
/// use rdscom_utils::TimeSource;
///
/// let start = std::time::Instant::now();
/// let clock = move || start.elapsed().as_millis() as u64;
///
/// assert!(clock.now_ms() < 60_000);
/// ```
pub trait TimeSource {
    fn now_ms(&self) -> u64;
}

impl<F: Fn() -> u64> TimeSource for F {
    #[inline(always)]
    fn now_ms(&self) -> u64 {
        self()
    }
}

/// A [`TimeSource`] backed by [`std::time::Instant`], counting from its creation.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock(std::time::Instant);

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    /// Creates a new clock reading zero now.
    #[inline(always)]
    pub fn new() -> Self {
        Self(std::time::Instant::now())
    }

    /// Returns the amount of time elapsed since this clock was created.
    #[inline(always)]
    pub fn elapsed(&self) -> core::time::Duration {
        self.0.elapsed()
    }
}

impl TimeSource for MonotonicClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        // saturates after ~584 million years
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// A [`TimeSource`] that only moves when told to.
///
/// Clones share the same reading, so one handle can be given to a communication
/// interface while another drives time from the outside, typically in tests and
/// simulations.
///
/// ```
/// use rdscom_utils::{ManualClock, TimeSource};
///
/// fn elapsed_since(clock: &impl TimeSource, start: u64) -> u64 {
///     clock.now_ms() - start
/// }
///
/// let clock = ManualClock::starting_at(1000);
/// let owned = clock.clone();
///
/// clock.advance(1500);
/// assert_eq!(elapsed_since(&owned, 1000), 1500);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<atomic::AtomicU64>);

impl ManualClock {
    /// Creates a new clock reading zero.
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new clock with the given reading.
    #[inline(always)]
    pub fn starting_at(ms: u64) -> Self {
        Self(Arc::new(atomic::AtomicU64::new(ms)))
    }

    /// Moves the clock forward by `ms` milliseconds.
    #[inline(always)]
    pub fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, atomic::Ordering::Relaxed);
    }

    /// Sets the reading. Going backwards breaks the [`TimeSource`] contract, so the
    /// reading never decreases: earlier values are ignored.
    #[inline(always)]
    pub fn set(&self, ms: u64) {
        self.0.fetch_max(ms, atomic::Ordering::Relaxed);
    }
}

impl TimeSource for ManualClock {
    #[inline(always)]
    fn now_ms(&self) -> u64 {
        self.0.load(atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_is_shared_between_clones() {
        let clock = ManualClock::new();
        let handle = clock.clone();

        handle.advance(250);
        assert_eq!(clock.now_ms(), 250);

        handle.set(1000);
        assert_eq!(clock.now_ms(), 1000);

        // never goes backwards
        handle.set(10);
        assert_eq!(clock.now_ms(), 1000);
    }

    #[test]
    fn manual_clock_starting_point() {
        let clock = ManualClock::starting_at(5000);
        assert_eq!(clock.now_ms(), 5000);

        clock.advance(1);
        assert_eq!(clock.now_ms(), 5001);

        clock.set(4000);
        assert_eq!(clock.now_ms(), 5001);
    }

    #[test]
    fn closures_are_time_sources() {
        let clock = || 42;
        assert_eq!(clock.now_ms(), 42);
    }

    #[test]
    fn monotonic_clock_does_not_decrease() {
        let clock = MonotonicClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
