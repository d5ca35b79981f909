//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream RPC node
//! - Own the block-height-zero sliding window and its threshold
//! - Track the latest polled chain head and poll errors
//! - Allow hot-swapping of the window and threshold

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::blockchain::{BlockHead, BlockSource, PollError};
use crate::health::{SlidingWindow, SlidingWindowOptions, Timestamp, WindowError};

/// Default fraction of anomalous polls that marks a backend unhealthy.
pub const DEFAULT_BLOCK_HEIGHT_ZERO_THRESHOLD: f64 = 0.1;

/// Default number of polls that must be in the window before the
/// threshold is considered.
pub const DEFAULT_BLOCK_HEIGHT_ZERO_MIN_SAMPLES: u64 = 5;

/// Errors raised while building or reconfiguring a backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("threshold {0} is outside [0, 1]")]
    InvalidThreshold(f64),

    #[error("invalid sliding window: {0}")]
    Window(#[from] WindowError),
}

/// Construction options for a [`Backend`].
#[derive(Debug, Clone)]
pub struct BackendOptions {
    pub block_height_zero_window: SlidingWindowOptions,
    pub block_height_zero_threshold: f64,
    pub block_height_zero_min_samples: u64,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            block_height_zero_window: SlidingWindowOptions::default(),
            block_height_zero_threshold: DEFAULT_BLOCK_HEIGHT_ZERO_THRESHOLD,
            block_height_zero_min_samples: DEFAULT_BLOCK_HEIGHT_ZERO_MIN_SAMPLES,
        }
    }
}

/// A single field swap applied by [`Backend::override_with`].
#[derive(Debug)]
pub enum BackendOverride {
    BlockHeightZeroSlidingWindow(SlidingWindow),
    BlockHeightZeroThreshold(f64),
    BlockHeightZeroMinSamples(u64),
}

/// Poll bookkeeping for one backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendHealth {
    /// Head reported by the last successful poll.
    pub latest: Option<BlockHead>,
    /// Error from the last poll, cleared by a successful one.
    pub last_error: Option<PollError>,
    /// Time of the last poll attempt.
    pub last_polled: Option<Timestamp>,
    /// Time the reported head last changed.
    pub last_advanced: Option<Timestamp>,
}

/// A single upstream node.
pub struct Backend {
    name: String,
    source: Arc<dyn BlockSource>,
    block_height_zero_window: ArcSwap<SlidingWindow>,
    /// f64 bits.
    block_height_zero_threshold: AtomicU64,
    block_height_zero_min_samples: AtomicU64,
    health: RwLock<BackendHealth>,
}

impl Backend {
    /// Create a new backend, validating its signal options.
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn BlockSource>,
        options: BackendOptions,
    ) -> Result<Self, BackendError> {
        check_threshold(options.block_height_zero_threshold)?;
        let window = SlidingWindow::new(options.block_height_zero_window)?;

        Ok(Self {
            name: name.into(),
            source,
            block_height_zero_window: ArcSwap::from_pointee(window),
            block_height_zero_threshold: AtomicU64::new(
                options.block_height_zero_threshold.to_bits(),
            ),
            block_height_zero_min_samples: AtomicU64::new(options.block_height_zero_min_samples),
            health: RwLock::new(BackendHealth::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &dyn BlockSource {
        self.source.as_ref()
    }

    /// Current block-height-zero window. Callers holding the returned
    /// handle keep reading the old window after an override.
    pub fn block_height_zero_window(&self) -> Arc<SlidingWindow> {
        self.block_height_zero_window.load_full()
    }

    pub fn block_height_zero_threshold(&self) -> f64 {
        f64::from_bits(self.block_height_zero_threshold.load(Ordering::Acquire))
    }

    pub fn block_height_zero_min_samples(&self) -> u64 {
        self.block_height_zero_min_samples.load(Ordering::Acquire)
    }

    /// True when enough polls are in the window and the fraction of
    /// zero-height polls reaches the threshold (inclusive).
    pub fn block_height_zero_above_threshold(&self) -> bool {
        let window = self.block_height_zero_window.load();
        let floor = self.block_height_zero_min_samples().max(1);
        window.count() >= floor && window.avg() >= self.block_height_zero_threshold()
    }

    /// Swap signal state in place. Every override is validated before any
    /// is applied.
    pub fn override_with(
        &self,
        overrides: impl IntoIterator<Item = BackendOverride>,
    ) -> Result<(), BackendError> {
        let overrides: Vec<BackendOverride> = overrides.into_iter().collect();
        for o in &overrides {
            if let BackendOverride::BlockHeightZeroThreshold(t) = o {
                check_threshold(*t)?;
            }
        }

        for o in overrides {
            match o {
                BackendOverride::BlockHeightZeroSlidingWindow(window) => {
                    self.block_height_zero_window.store(Arc::new(window));
                }
                BackendOverride::BlockHeightZeroThreshold(t) => {
                    self.block_height_zero_threshold
                        .store(t.to_bits(), Ordering::Release);
                }
                BackendOverride::BlockHeightZeroMinSamples(n) => {
                    self.block_height_zero_min_samples
                        .store(n, Ordering::Release);
                }
            }
        }
        tracing::debug!(backend = %self.name, "Backend signal state overridden");
        Ok(())
    }

    /// Snapshot of poll bookkeeping.
    pub fn health(&self) -> BackendHealth {
        self.health.read().expect("backend health lock poisoned").clone()
    }

    /// Record a successful poll.
    pub fn record_head(&self, now: Timestamp, head: BlockHead) {
        let mut health = self.health.write().expect("backend health lock poisoned");
        if health.latest != Some(head) || health.last_advanced.is_none() {
            health.last_advanced = Some(now);
        }
        health.latest = Some(head);
        health.last_error = None;
        health.last_polled = Some(now);
    }

    /// Record a failed poll. The last known head is kept.
    pub fn record_failure(&self, now: Timestamp, error: PollError) {
        let mut health = self.health.write().expect("backend health lock poisoned");
        health.last_error = Some(error);
        health.last_polled = Some(now);
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("threshold", &self.block_height_zero_threshold())
            .finish()
    }
}

fn check_threshold(t: f64) -> Result<(), BackendError> {
    if (0.0..=1.0).contains(&t) {
        Ok(())
    } else {
        Err(BackendError::InvalidThreshold(t))
    }
}
