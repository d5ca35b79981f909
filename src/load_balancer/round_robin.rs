//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::{backend::Backend, group::BackendGroup, LoadBalancer};

/// Round-robin selector.
/// Stores an internal counter to rotate through backends.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_backend(&self, group: &BackendGroup) -> Option<Arc<Backend>> {
        let backends = group.backends();
        if backends.is_empty() {
            return None;
        }

        // Bounded by one lap so a fully banned group returns None.
        let start_count = self.counter.fetch_add(1, Ordering::Relaxed);
        let len = backends.len();

        for i in 0..len {
            let index = start_count.wrapping_add(i) % len;
            let backend = &backends[index];
            if !group.consensus().is_banned(backend) {
                return Some(backend.clone());
            }
        }
        tracing::debug!(group = %group.name(), backend_count = len, "All backends in group are banned");
        None
    }
}
