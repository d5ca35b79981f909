//! Bucketed sliding window for per-backend signals.
//!
//! # Responsibilities
//! - Record values against the current time of a [`Clock`]
//! - Aggregate count, sum and average over the trailing window
//! - Evict expired buckets lazily on every access
//!
//! # Design Decisions
//! - Buckets are aligned to multiples of `bucket_size` since the UNIX epoch
//! - A bucket contributes while its start lies in `[now - window_length, now]`
//! - Buckets ahead of `now` (clock stepped back) are dropped for good
//! - Empty windows average to `0.0`

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, UNIX_EPOCH};

use thiserror::Error;

use crate::health::clock::{SharedClock, SystemClock, Timestamp};

/// Default trailing window.
pub const DEFAULT_WINDOW_LENGTH: Duration = Duration::from_secs(60);

/// Default bucket granularity.
pub const DEFAULT_BUCKET_SIZE: Duration = Duration::from_secs(1);

/// Invalid window construction parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("window length must be greater than zero")]
    ZeroWindowLength,

    #[error("bucket size must be greater than zero")]
    ZeroBucketSize,

    #[error("bucket size {bucket:?} exceeds window length {window:?}")]
    BucketLargerThanWindow { bucket: Duration, window: Duration },
}

/// Construction options for a [`SlidingWindow`].
#[derive(Debug, Clone)]
pub struct SlidingWindowOptions {
    /// Trailing span that contributes to aggregates.
    pub window_length: Duration,
    /// Aggregation granularity; smaller buckets cost memory, buy precision.
    pub bucket_size: Duration,
    /// Time source.
    pub clock: SharedClock,
}

impl Default for SlidingWindowOptions {
    fn default() -> Self {
        Self {
            window_length: DEFAULT_WINDOW_LENGTH,
            bucket_size: DEFAULT_BUCKET_SIZE,
            clock: SystemClock::shared(),
        }
    }
}

impl SlidingWindowOptions {
    pub fn with_window_length(mut self, window_length: Duration) -> Self {
        self.window_length = window_length;
        self
    }

    pub fn with_bucket_size(mut self, bucket_size: Duration) -> Self {
        self.bucket_size = bucket_size;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    fn validate(&self) -> Result<(), WindowError> {
        if self.window_length.is_zero() {
            return Err(WindowError::ZeroWindowLength);
        }
        if self.bucket_size.is_zero() {
            return Err(WindowError::ZeroBucketSize);
        }
        if self.bucket_size > self.window_length {
            return Err(WindowError::BucketLargerThanWindow {
                bucket: self.bucket_size,
                window: self.window_length,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    start: Timestamp,
    count: u64,
    total: f64,
}

#[derive(Debug, Default)]
struct Buckets {
    ring: VecDeque<Bucket>,
}

/// Time-windowed counter and average.
#[derive(Debug)]
pub struct SlidingWindow {
    window_length: Duration,
    bucket_size: Duration,
    clock: SharedClock,
    buckets: Mutex<Buckets>,
}

impl SlidingWindow {
    /// Build a window, rejecting invalid option combinations.
    pub fn new(options: SlidingWindowOptions) -> Result<Self, WindowError> {
        options.validate()?;
        let capacity = (options.window_length.as_nanos() / options.bucket_size.as_nanos())
            .saturating_add(1)
            .min(4096) as usize;

        Ok(Self {
            window_length: options.window_length,
            bucket_size: options.bucket_size,
            clock: options.clock,
            buckets: Mutex::new(Buckets {
                ring: VecDeque::with_capacity(capacity),
            }),
        })
    }

    /// Record `value` at the current time.
    pub fn increment(&self, value: f64) {
        let now = self.clock.now();
        let start = self.bucket_start(now);

        let mut buckets = self.buckets.lock().expect("sliding window mutex poisoned");
        self.evict(&mut buckets, now);

        match buckets.ring.back_mut() {
            Some(last) if last.start == start => {
                last.count += 1;
                last.total += value;
            }
            _ => buckets.ring.push_back(Bucket {
                start,
                count: 1,
                total: value,
            }),
        }
    }

    /// Record a positive observation.
    pub fn incr(&self) {
        self.increment(1.0);
    }

    /// Number of increments inside the window.
    pub fn count(&self) -> u64 {
        self.aggregate().0
    }

    /// Sum of values recorded inside the window.
    pub fn sum(&self) -> f64 {
        self.aggregate().1
    }

    /// Mean of values inside the window, `0.0` when empty.
    pub fn avg(&self) -> f64 {
        let (count, sum) = self.aggregate();
        if count == 0 {
            return 0.0;
        }
        sum / count as f64
    }

    pub fn window_length(&self) -> Duration {
        self.window_length
    }

    pub fn bucket_size(&self) -> Duration {
        self.bucket_size
    }

    fn aggregate(&self) -> (u64, f64) {
        let now = self.clock.now();
        let mut buckets = self.buckets.lock().expect("sliding window mutex poisoned");
        self.evict(&mut buckets, now);

        buckets
            .ring
            .iter()
            .fold((0, 0.0), |(count, sum), b| (count + b.count, sum + b.total))
    }

    fn evict(&self, buckets: &mut Buckets, now: Timestamp) {
        while buckets.ring.back().is_some_and(|b| b.start > now) {
            buckets.ring.pop_back();
        }

        let Some(cutoff) = now.checked_sub(self.window_length) else {
            return;
        };
        while buckets.ring.front().is_some_and(|b| b.start < cutoff) {
            buckets.ring.pop_front();
        }
    }

    fn bucket_start(&self, now: Timestamp) -> Timestamp {
        let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
        let size = self.bucket_size.as_nanos();
        let aligned = since_epoch - since_epoch % size;
        UNIX_EPOCH + Duration::new((aligned / 1_000_000_000) as u64, (aligned % 1_000_000_000) as u32)
    }
}
