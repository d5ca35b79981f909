//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build backend pool → Spawn pollers
//!
//! Reload:
//!     Config change → Build new pool → Swap → Trigger old Shutdown generation
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Trigger generation → Pollers cancel in-flight polls → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then groups, then pollers
//! - A poller never outlives its generation's trigger

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
