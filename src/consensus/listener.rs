//! Ban state transitions and their listeners.

use std::fmt;

use alloy::primitives::B256;

use crate::health::Timestamp;

/// Routing state of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BanState {
    Healthy,
    Banned,
}

/// Why a transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionReason {
    /// Too many polls reported a zero chain head.
    BlockHeightZero,
    /// The reported head stopped advancing.
    Stalled,
    /// The reported head fell too far behind the group.
    Lagging,
    /// The ban period elapsed.
    Expired,
    /// Administrative unban.
    Manual,
    /// The tracker was reset.
    Reset,
}

impl TransitionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionReason::BlockHeightZero => "block_height_zero",
            TransitionReason::Stalled => "stalled",
            TransitionReason::Lagging => "lagging",
            TransitionReason::Expired => "expired",
            TransitionReason::Manual => "manual",
            TransitionReason::Reset => "reset",
        }
    }
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single ban or unban.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanEvent {
    pub group: String,
    pub backend: String,
    pub state: BanState,
    pub reason: TransitionReason,
    /// End of the ban; `None` when unbanning or banned indefinitely.
    pub banned_until: Option<Timestamp>,
}

/// Canonical chain head agreed on by a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusHead {
    pub number: u64,
    pub hash: B256,
    pub updated_at: Timestamp,
}

/// Receives consensus transitions.
///
/// Called synchronously from the consensus tracker after its state lock
/// is released.
pub trait ConsensusListener: Send + Sync {
    fn on_ban_state_change(&self, event: &BanEvent);

    fn on_consensus_head(&self, _group: &str, _head: &ConsensusHead) {}
}

impl<F> ConsensusListener for F
where
    F: Fn(&BanEvent) + Send + Sync,
{
    fn on_ban_state_change(&self, event: &BanEvent) {
        self(event)
    }
}
