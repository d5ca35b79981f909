//! Interval-driven consensus polling.
//!
//! # Responsibilities
//! - Tick every backend group on its poll interval
//! - Poll all backends of a group concurrently, then update consensus
//! - Cancel in-flight polls on shutdown

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::load_balancer::group::BackendGroup;

/// Drives one group's consensus cycle.
pub struct ConsensusScheduler {
    group: Arc<BackendGroup>,
    interval: Duration,
}

impl ConsensusScheduler {
    pub fn new(group: Arc<BackendGroup>, interval: Duration) -> Self {
        Self { group, interval }
    }

    /// Run until the shutdown signal fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            group = %self.group.name(),
            backends = self.group.backends().len(),
            interval_ms = self.interval.as_millis() as u64,
            "Consensus poller starting"
        );

        let cancel = CancellationToken::new();
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.group.consensus().poll_cycle(&cancel) => {}
                        _ = shutdown.recv() => {
                            cancel.cancel();
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!(group = %self.group.name(), "Consensus poller received shutdown signal, exiting loop");
    }
}
