//! Host wall clock
//!
//! Sampling-rate statistics use host time, independent of device timestamps.

use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Source of host time in seconds.
pub trait HostClock {
    /// Seconds since an arbitrary fixed origin.
    fn now_secs(&self) -> f64;
}

/// Monotonic system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl HostClock for SystemClock {
    fn now_secs(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Manually driven clock for tests and replay.
///
/// Clones share the same time, so a test can keep one handle and give the
/// other to the sampling loop.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new(start_secs: f64) -> Self {
        Self {
            now: Arc::new(Mutex::new(start_secs)),
        }
    }

    pub fn set(&self, secs: f64) {
        if let Ok(mut now) = self.now.lock() {
            *now = secs;
        }
    }

    pub fn advance(&self, secs: f64) {
        if let Ok(mut now) = self.now.lock() {
            *now += secs;
        }
    }
}

impl HostClock for ManualClock {
    fn now_secs(&self) -> f64 {
        self.now.lock().map(|now| *now).unwrap_or_default()
    }
}

impl<T: HostClock + ?Sized> HostClock for &T {
    fn now_secs(&self) -> f64 {
        (**self).now_secs()
    }
}
