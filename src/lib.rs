//! Backend health and consensus tracking for an RPC reverse proxy.

pub mod blockchain;
pub mod config;
pub mod consensus;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use consensus::{Consensus, ConsensusListener, ConsensusScheduler};
pub use health::{SlidingWindow, SlidingWindowOptions};
pub use lifecycle::Shutdown;
pub use load_balancer::{backend::Backend, group::BackendGroup, BackendPool};
