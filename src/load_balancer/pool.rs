//! Backend pool management.
//!
//! # Responsibilities
//! - Build backend groups from configuration
//! - Look groups up by name
//! - Register consensus listeners on every group

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::blockchain::RpcBlockSource;
use crate::config::schema::{BackendConfig, BanPolicyConfig, ConsensusConfig, ProxyConfig};
use crate::consensus::{
    BanPolicy, ConsensusListener, ConsensusOptions, ExponentialBan, FixedBan, IndefiniteBan,
};
use crate::health::{SharedClock, SlidingWindowOptions};
use crate::load_balancer::backend::{Backend, BackendError, BackendOptions};
use crate::load_balancer::group::{BackendGroup, GroupError};

/// Errors raised while turning configuration into live groups.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("backend '{backend}': {source}")]
    Backend {
        backend: String,
        #[source]
        source: BackendError,
    },

    #[error("backend '{backend}': invalid rpc_url: {source}")]
    Url {
        backend: String,
        #[source]
        source: url::ParseError,
    },

    #[error("backend group '{group}' references unknown backend '{backend}'")]
    UnknownBackend { group: String, backend: String },

    #[error(transparent)]
    Group(#[from] GroupError),
}

/// All backend groups, keyed by name.
#[derive(Debug, Default)]
pub struct BackendPool {
    groups: HashMap<String, Arc<BackendGroup>>,
}

impl BackendPool {
    /// Build every configured group. Backends not listed in any group are
    /// ignored.
    pub fn from_config(config: &ProxyConfig, clock: SharedClock) -> Result<Self, PoolError> {
        let backends: HashMap<&str, &BackendConfig> = config
            .backends
            .iter()
            .map(|b| (b.name.as_str(), b))
            .collect();

        let mut groups = HashMap::new();
        for group_config in &config.backend_groups {
            let poll_timeout = Duration::from_millis(group_config.consensus.poll_timeout_ms);
            let mut members = Vec::with_capacity(group_config.backends.len());
            for name in &group_config.backends {
                let backend_config = backends.get(name.as_str()).ok_or_else(|| PoolError::UnknownBackend {
                    group: group_config.name.clone(),
                    backend: name.clone(),
                })?;
                members.push(build_backend(backend_config, &clock, poll_timeout)?);
            }

            let group = BackendGroup::new(
                group_config.name.clone(),
                members,
                clock.clone(),
                consensus_options(&group_config.consensus),
            )?;
            tracing::info!(
                group = %group.name(),
                backends = group.backends().len(),
                "Backend group loaded"
            );
            groups.insert(group_config.name.clone(), Arc::new(group));
        }

        Ok(Self { groups })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<BackendGroup>> {
        self.groups.get(name)
    }

    /// Groups in name order.
    pub fn groups(&self) -> Vec<Arc<BackendGroup>> {
        let mut groups: Vec<Arc<BackendGroup>> = self.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.name().cmp(b.name()));
        groups
    }

    /// Register `listener` with every group's consensus tracker.
    pub fn add_listener(&self, listener: Arc<dyn ConsensusListener>) {
        for group in self.groups.values() {
            group.consensus().add_listener(listener.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

fn build_backend(
    config: &BackendConfig,
    clock: &SharedClock,
    poll_timeout: Duration,
) -> Result<Backend, PoolError> {
    let url = Url::parse(&config.rpc_url).map_err(|source| PoolError::Url {
        backend: config.name.clone(),
        source,
    })?;
    let source = Arc::new(RpcBlockSource::new(url, poll_timeout));

    let options = BackendOptions {
        block_height_zero_window: SlidingWindowOptions::default()
            .with_window_length(config.window_length())
            .with_bucket_size(config.bucket_size())
            .with_clock(clock.clone()),
        block_height_zero_threshold: config.block_height_zero_threshold,
        block_height_zero_min_samples: config.block_height_zero_min_samples,
    };

    Backend::new(config.name.clone(), source, options).map_err(|source| PoolError::Backend {
        backend: config.name.clone(),
        source,
    })
}

/// Translate a group's consensus section into tracker options.
pub fn consensus_options(config: &ConsensusConfig) -> ConsensusOptions {
    let ban_policy: Arc<dyn BanPolicy> = match config.ban_policy {
        BanPolicyConfig::Fixed { period_secs } => Arc::new(FixedBan(Duration::from_secs(period_secs))),
        BanPolicyConfig::Exponential { base_secs, max_secs } => Arc::new(ExponentialBan {
            base: Duration::from_secs(base_secs),
            max: Duration::from_secs(max_secs),
        }),
        BanPolicyConfig::Indefinite => Arc::new(IndefiniteBan),
    };

    ConsensusOptions {
        ban_policy,
        poll_timeout: Duration::from_millis(config.poll_timeout_ms),
        poll_failure_policy: config.poll_failure_policy,
        max_block_lag: config.max_block_lag,
        max_update_threshold: config.max_update_threshold_secs.map(Duration::from_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_config;
    use crate::health::SystemClock;

    const CONFIG: &str = r#"
        [[backends]]
        name = "node1"
        rpc_url = "http://127.0.0.1:8545"

        [[backends]]
        name = "node2"
        rpc_url = "http://127.0.0.1:8546"
        block_height_zero_window_length_secs = 70
        block_height_zero_threshold = 0.5

        [[backends]]
        name = "spare"
        rpc_url = "http://127.0.0.1:8547"

        [[backend_groups]]
        name = "node"
        backends = ["node1", "node2"]

        [backend_groups.consensus]
        ban_policy = { kind = "indefinite" }
        max_block_lag = 16
    "#;

    #[test]
    fn test_pool_from_config() {
        let config = parse_config(CONFIG).unwrap();
        let pool = BackendPool::from_config(&config, SystemClock::shared()).unwrap();
        assert_eq!(pool.len(), 1);

        let group = pool.get("node").unwrap();
        assert_eq!(group.backends().len(), 2);

        let node1 = &group.backends()[0];
        assert_eq!(node1.block_height_zero_window().window_length(), Duration::from_secs(60));
        assert_eq!(node1.block_height_zero_threshold(), 0.1);

        let node2 = &group.backends()[1];
        assert_eq!(node2.block_height_zero_window().window_length(), Duration::from_secs(70));
        assert_eq!(node2.block_height_zero_threshold(), 0.5);

        let options = group.consensus().options();
        assert_eq!(options.ban_policy.ban_duration(1), None);
        assert_eq!(options.max_block_lag, Some(16));
        assert!(pool.get("spare").is_none());
    }

    #[test]
    fn test_consensus_options_translation() {
        let options = consensus_options(&ConsensusConfig {
            ban_policy: BanPolicyConfig::Exponential {
                base_secs: 30,
                max_secs: 100,
            },
            max_update_threshold_secs: Some(20),
            ..ConsensusConfig::default()
        });
        assert_eq!(options.ban_policy.ban_duration(3), Some(Duration::from_secs(100)));
        assert_eq!(options.max_update_threshold, Some(Duration::from_secs(20)));
        assert_eq!(options.poll_timeout, Duration::from_secs(5));
    }
}
