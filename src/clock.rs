//! Wall-clock seam for deadlines and backoff sleeps.
//!
//! Production code uses [`SystemClock`]. [`ManualClock`] advances a virtual
//! instant instead of sleeping and records every sleep it is asked for,
//! which makes the retry, backoff, and deadline behavior assertable without
//! real waiting. Hosts running the engine under simulation can inject their
//! own implementation.

use std::sync::Mutex;
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Real time: `Instant::now` and `thread::sleep`.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual time. `sleep` advances the clock instead of blocking.
pub struct ManualClock {
    now: Mutex<Instant>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().expect("clock mutex poisoned").clone()
    }

    /// Convenience for assertions: sleeps in whole milliseconds.
    pub fn sleeps_ms(&self) -> Vec<u64> {
        self.sleeps()
            .iter()
            .map(|d| d.as_millis() as u64)
            .collect()
    }

    /// Move the clock forward without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        *self.now.lock().expect("clock mutex poisoned") += duration;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().expect("clock mutex poisoned")
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .expect("clock mutex poisoned")
            .push(duration);
        *self.now.lock().expect("clock mutex poisoned") += duration;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
