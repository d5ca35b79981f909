//! Chain head types and poll error definitions.

use std::fmt;
use std::time::Duration;

use alloy::primitives::B256;
use thiserror::Error;

/// A chain head as reported by one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHead {
    pub number: u64,
    pub hash: B256,
}

impl BlockHead {
    pub fn new(number: u64, hash: B256) -> Self {
        Self { number, hash }
    }

    /// True when the backend reported an empty chain.
    pub fn is_zero(&self) -> bool {
        self.number == 0
    }
}

impl fmt::Display for BlockHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.number, self.hash)
    }
}

/// Errors that can occur while polling a backend's chain head.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0:?}")]
    Timeout(Duration),

    /// The backend answered but the response was unusable.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The poll was cancelled before it completed.
    #[error("poll cancelled")]
    Cancelled,
}

/// Result type for block source operations.
pub type PollResult<T> = Result<T, PollError>;
