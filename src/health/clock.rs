//! Time sources for health tracking.
//!
//! Production code reads [`SystemClock`]; tests drive an
//! [`AdjustableClock`] so window decay and ban expiry are deterministic.
//! Both sit behind the same [`Clock`] trait.

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime};

/// Point in time as seen by a [`Clock`].
pub type Timestamp = SystemTime;

/// A source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Timestamp;
}

/// Shared handle to a clock.
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock that never steps backwards.
///
/// The wall time is sampled once at construction; later readings add the
/// monotonic time elapsed since then.
#[derive(Debug, Clone)]
pub struct SystemClock {
    anchor_wall: SystemTime,
    anchor_mono: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            anchor_wall: SystemTime::now(),
            anchor_mono: Instant::now(),
        }
    }

    /// Convenience constructor returning a shared handle.
    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        self.anchor_wall + self.anchor_mono.elapsed()
    }
}

/// Clock whose current time is set explicitly.
#[derive(Debug)]
pub struct AdjustableClock {
    now: RwLock<Timestamp>,
}

impl AdjustableClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Overwrite the current time. Moving backwards is allowed.
    pub fn set(&self, t: Timestamp) {
        *self.now.write().expect("clock lock poisoned") = t;
    }

    /// Move the current time forward by `d`.
    pub fn advance(&self, d: Duration) {
        let mut now = self.now.write().expect("clock lock poisoned");
        *now += d;
    }
}

impl Clock for AdjustableClock {
    fn now(&self) -> Timestamp {
        *self.now.read().expect("clock lock poisoned")
    }
}
