//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! config backend_groups
//!     → backend.rs (one per upstream node, owns its health signals)
//!     → group.rs (ordered backends + consensus tracker)
//!     → pool.rs (all groups, keyed by name)
//!     → Router picks a group
//!     → round_robin.rs (rotate through backends that are not banned)
//! ```
//!
//! # Design Decisions
//! - Load balancer is stateless apart from its rotation counter
//! - Banned backends are excluded from selection
//! - Group order is routing priority

pub mod backend;
pub mod group;
pub mod pool;
pub mod round_robin;

use std::sync::Arc;

use crate::load_balancer::{backend::Backend, group::BackendGroup};

pub use backend::{BackendError, BackendHealth, BackendOptions, BackendOverride};
pub use group::GroupError;
pub use pool::{BackendPool, PoolError};
pub use round_robin::RoundRobin;

/// Backend selection strategy.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Pick the next backend from `group`, or `None` if none is eligible.
    fn next_backend(&self, group: &BackendGroup) -> Option<Arc<Backend>>;
}
