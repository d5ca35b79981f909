//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! Backend rpc_url (config)
//!     → source.rs (RpcBlockSource over alloy, per-call timeout)
//!     → types.rs (BlockHead or PollError)
//!     → consensus poller
//! ```
//!
//! # Design Decisions
//! - `BlockSource` is the transport seam; tests plug in scripted sources
//! - All RPC calls have configurable timeouts
//! - Failures are values, never panics

pub mod source;
pub mod types;

pub use source::{BlockSource, RpcBlockSource};
pub use types::{BlockHead, PollError, PollResult};
