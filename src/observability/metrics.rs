//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Install the Prometheus exporter
//! - Translate consensus transitions into counters and gauges
//!
//! # Metrics
//! - `consensus_backend_banned_total` (counter): bans by backend, reason
//! - `consensus_backend_unbanned_total` (counter): unbans by backend
//! - `consensus_backend_banned` (gauge): 1=banned, 0=healthy
//! - `consensus_head_height` (gauge): canonical head per group
//! - `consensus_poll_errors_total` (counter): failed polls by backend
//!
//! # Design Decisions
//! - The consensus core only sees a [`ConsensusListener`]; metrics are one
//!   subscriber among others
//! - Recording without an installed exporter is a no-op

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::consensus::{BanEvent, BanState, ConsensusHead, ConsensusListener};

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_poll_error(backend: &str) {
    ::metrics::counter!("consensus_poll_errors_total", "backend" => backend.to_string()).increment(1);
}

fn record_ban_event(event: &BanEvent) {
    let backend = event.backend.clone();
    match event.state {
        BanState::Banned => {
            ::metrics::counter!(
                "consensus_backend_banned_total",
                "backend" => backend.clone(),
                "reason" => event.reason.as_str()
            )
            .increment(1);
            ::metrics::gauge!("consensus_backend_banned", "backend" => backend).set(1.0);
        }
        BanState::Healthy => {
            ::metrics::counter!("consensus_backend_unbanned_total", "backend" => backend.clone())
                .increment(1);
            ::metrics::gauge!("consensus_backend_banned", "backend" => backend).set(0.0);
        }
    }
}

/// Consensus listener that feeds the metrics registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsListener;

impl ConsensusListener for MetricsListener {
    fn on_ban_state_change(&self, event: &BanEvent) {
        record_ban_event(event);
    }

    fn on_consensus_head(&self, group: &str, head: &ConsensusHead) {
        ::metrics::gauge!("consensus_head_height", "group" => group.to_string()).set(head.number as f64);
    }
}
