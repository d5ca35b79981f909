//! Consensus subsystem.
//!
//! # Data Flow
//! ```text
//! scheduler.rs (fixed interval per group)
//!     → poller.rs update_backend() for every backend, concurrently
//!         → BlockSource::latest_block()
//!         → Backend window + health bookkeeping
//!     → poller.rs update_backend_group_consensus()
//!         → expire bans, evaluate predicates, ban via ban_policy.rs
//!         → canonical head among non-banned backends
//!         → listener.rs notifications (metrics, logging)
//!
//! Router:
//!     → Consensus::is_banned() before selecting a backend
//! ```
//!
//! # Design Decisions
//! - One lock guards ban map, strikes, head and listeners
//! - Per-backend state is locked independently of group state
//! - Unbanning never clears signal history
//! - Banned backends are not polled until their ban lapses

pub mod ban_policy;
pub mod listener;
pub mod poller;
pub mod scheduler;

pub use ban_policy::{BanPolicy, ExponentialBan, FixedBan, IndefiniteBan};
pub use listener::{BanEvent, BanState, ConsensusHead, ConsensusListener, TransitionReason};
pub use poller::{BanEntry, Consensus, ConsensusOptions, PollFailurePolicy};
pub use scheduler::ConsensusScheduler;
