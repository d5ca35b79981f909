//! Health signal subsystem.
//!
//! # Data Flow
//! ```text
//! Poll result (consensus poller):
//!     → Backend records observation
//!     → sliding_window.rs (bucketed, time-decaying aggregate)
//!     → Backend::block_height_zero_above_threshold()
//!     → consensus ban decision
//!
//! Time (clock.rs):
//!     SystemClock in production
//!     AdjustableClock under test
//! ```
//!
//! # Design Decisions
//! - Windows are per-backend and per-signal, never global
//! - Eviction is lazy: expired buckets drop on the next read or write
//! - Production and tests share the same `Clock` trait

pub mod clock;
pub mod sliding_window;

pub use clock::{AdjustableClock, Clock, SharedClock, SystemClock, Timestamp};
pub use sliding_window::{SlidingWindow, SlidingWindowOptions, WindowError};
