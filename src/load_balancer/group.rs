//! Backend groups.
//!
//! # Responsibilities
//! - Hold an ordered set of backends under one name
//! - Own the consensus tracker for those backends
//! - Reject duplicate backend names

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use crate::consensus::{Consensus, ConsensusOptions};
use crate::health::SharedClock;
use crate::load_balancer::backend::Backend;

/// Errors raised while assembling a group.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    #[error("group '{0}' has no backends")]
    Empty(String),

    #[error("backend '{backend}' appears more than once in group '{group}'")]
    DuplicateBackend { group: String, backend: String },
}

/// Named, ordered collection of backends sharing one consensus tracker.
#[derive(Debug)]
pub struct BackendGroup {
    name: String,
    backends: Vec<Arc<Backend>>,
    consensus: Consensus,
}

impl BackendGroup {
    /// Build a group; backend order is routing priority.
    pub fn new(
        name: impl Into<String>,
        backends: Vec<Backend>,
        clock: SharedClock,
        options: ConsensusOptions,
    ) -> Result<Self, GroupError> {
        let name = name.into();
        if backends.is_empty() {
            return Err(GroupError::Empty(name));
        }

        let mut seen = HashSet::new();
        for backend in &backends {
            if !seen.insert(backend.name()) {
                return Err(GroupError::DuplicateBackend {
                    group: name,
                    backend: backend.name().to_string(),
                });
            }
        }

        let backends: Vec<Arc<Backend>> = backends.into_iter().map(Arc::new).collect();
        let consensus = Consensus::new(name.clone(), backends.clone(), clock, options);

        Ok(Self {
            name,
            backends,
            consensus,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn backend(&self, name: &str) -> Option<&Arc<Backend>> {
        self.backends.iter().find(|b| b.name() == name)
    }

    pub fn consensus(&self) -> &Consensus {
        &self.consensus
    }

    /// Backends currently eligible for routing, in priority order.
    pub fn available_backends(&self) -> Vec<Arc<Backend>> {
        self.backends
            .iter()
            .filter(|b| !self.consensus.is_banned(b))
            .cloned()
            .collect()
    }
}
