//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy's
//! consensus layer. All types derive Serde traits for deserialization from
//! TOML files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consensus::PollFailurePolicy;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Upstream node definitions.
    pub backends: Vec<BackendConfig>,

    /// Named groups of backends, each with its own consensus tracker.
    pub backend_groups: Vec<BackendGroupConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Upstream node configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Unique backend identifier.
    pub name: String,

    /// JSON-RPC endpoint (e.g., "http://127.0.0.1:8545").
    pub rpc_url: String,

    /// Sliding window span for the block-height-zero signal, in seconds.
    #[serde(default = "default_window_length_secs")]
    pub block_height_zero_window_length_secs: u64,

    /// Bucket granularity for the block-height-zero window, in seconds.
    #[serde(default = "default_bucket_size_secs")]
    pub block_height_zero_bucket_size_secs: u64,

    /// Fraction of zero-height polls in the window that triggers a ban.
    #[serde(default = "default_block_height_zero_threshold")]
    pub block_height_zero_threshold: f64,

    /// Polls required in the window before the threshold applies.
    #[serde(default = "default_block_height_zero_min_samples")]
    pub block_height_zero_min_samples: u64,
}

impl BackendConfig {
    /// Config with every optional field at its default.
    pub fn new(name: impl Into<String>, rpc_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rpc_url: rpc_url.into(),
            block_height_zero_window_length_secs: default_window_length_secs(),
            block_height_zero_bucket_size_secs: default_bucket_size_secs(),
            block_height_zero_threshold: default_block_height_zero_threshold(),
            block_height_zero_min_samples: default_block_height_zero_min_samples(),
        }
    }

    pub fn window_length(&self) -> Duration {
        Duration::from_secs(self.block_height_zero_window_length_secs)
    }

    pub fn bucket_size(&self) -> Duration {
        Duration::from_secs(self.block_height_zero_bucket_size_secs)
    }
}

fn default_window_length_secs() -> u64 {
    60
}

fn default_bucket_size_secs() -> u64 {
    1
}

fn default_block_height_zero_threshold() -> f64 {
    0.1
}

fn default_block_height_zero_min_samples() -> u64 {
    5
}

/// Backend group configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendGroupConfig {
    /// Group name routes refer to.
    pub name: String,

    /// Backend names in routing-priority order.
    pub backends: Vec<String>,

    /// Consensus polling and ban settings.
    #[serde(default)]
    pub consensus: ConsensusConfig,
}

/// Consensus poller configuration for one group.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Interval between poll cycles in milliseconds.
    pub poll_interval_ms: u64,

    /// Deadline for a single backend poll in milliseconds.
    pub poll_timeout_ms: u64,

    /// How long banned backends stay out of rotation.
    pub ban_policy: BanPolicyConfig,

    /// Whether failed polls count toward the block-height-zero signal.
    pub poll_failure_policy: PollFailurePolicy,

    /// Ban backends this many blocks behind the group's highest head.
    pub max_block_lag: Option<u64>,

    /// Ban backends whose head has not advanced for this many seconds.
    pub max_update_threshold_secs: Option<u64>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            poll_timeout_ms: 5000,
            ban_policy: BanPolicyConfig::default(),
            poll_failure_policy: PollFailurePolicy::Ignore,
            max_block_lag: None,
            max_update_threshold_secs: None,
        }
    }
}

/// Ban duration policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BanPolicyConfig {
    /// Every ban lasts `period_secs`.
    Fixed { period_secs: u64 },
    /// Ban length doubles per strike from `base_secs`, capped at `max_secs`.
    Exponential { base_secs: u64, max_secs: u64 },
    /// Bans last until an operator unbans.
    Indefinite,
}

impl Default for BanPolicyConfig {
    fn default() -> Self {
        BanPolicyConfig::Fixed { period_secs: 300 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
