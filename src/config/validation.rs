//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (groups reference existing backends)
//! - Validate value ranges (thresholds in [0, 1], windows and intervals > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{BackendConfig, BanPolicyConfig, ConsensusConfig, ProxyConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("backend name must not be empty")]
    EmptyBackendName,

    #[error("duplicate backend '{0}'")]
    DuplicateBackend(String),

    #[error("backend '{backend}': invalid rpc_url '{url}'")]
    InvalidRpcUrl { backend: String, url: String },

    #[error("backend '{backend}': threshold {threshold} is outside [0, 1]")]
    ThresholdOutOfRange { backend: String, threshold: f64 },

    #[error("backend '{0}': window length must be greater than zero")]
    ZeroWindowLength(String),

    #[error("backend '{0}': bucket size must be greater than zero")]
    ZeroBucketSize(String),

    #[error("backend '{backend}': bucket size {bucket_secs}s exceeds window length {window_secs}s")]
    BucketLargerThanWindow {
        backend: String,
        bucket_secs: u64,
        window_secs: u64,
    },

    #[error("duplicate backend group '{0}'")]
    DuplicateGroup(String),

    #[error("backend group '{0}' has no backends")]
    EmptyGroup(String),

    #[error("backend group '{group}' references unknown backend '{backend}'")]
    UnknownBackend { group: String, backend: String },

    #[error("backend '{backend}' is in both '{first}' and '{second}'")]
    BackendInMultipleGroups {
        backend: String,
        first: String,
        second: String,
    },

    #[error("backend group '{group}': {field} must be greater than zero")]
    ZeroConsensusSetting { group: String, field: &'static str },

    #[error("backend group '{0}': exponential ban base exceeds its maximum")]
    BanBaseAboveMax(String),

    #[error("invalid log level '{0}'")]
    InvalidLogLevel(String),

    #[error("invalid metrics address '{0}'")]
    InvalidMetricsAddress(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut names = HashSet::new();
    for backend in &config.backends {
        if !names.insert(backend.name.as_str()) {
            errors.push(ValidationError::DuplicateBackend(backend.name.clone()));
        }
        validate_backend(backend, &mut errors);
    }

    let mut groups = HashSet::new();
    let mut membership: HashMap<&str, &str> = HashMap::new();
    for group in &config.backend_groups {
        if !groups.insert(group.name.as_str()) {
            errors.push(ValidationError::DuplicateGroup(group.name.clone()));
        }
        if group.backends.is_empty() {
            errors.push(ValidationError::EmptyGroup(group.name.clone()));
        }
        for member in &group.backends {
            if !names.contains(member.as_str()) {
                errors.push(ValidationError::UnknownBackend {
                    group: group.name.clone(),
                    backend: member.clone(),
                });
            }
            if let Some(first) = membership.insert(member.as_str(), group.name.as_str()) {
                errors.push(ValidationError::BackendInMultipleGroups {
                    backend: member.clone(),
                    first: first.to_string(),
                    second: group.name.clone(),
                });
            }
        }
        validate_consensus(&group.name, &group.consensus, &mut errors);
    }

    let level = config.observability.log_level.parse::<tracing::Level>();
    if level.is_err() {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_backend(backend: &BackendConfig, errors: &mut Vec<ValidationError>) {
    if backend.name.is_empty() {
        errors.push(ValidationError::EmptyBackendName);
    }
    if Url::parse(&backend.rpc_url).is_err() {
        errors.push(ValidationError::InvalidRpcUrl {
            backend: backend.name.clone(),
            url: backend.rpc_url.clone(),
        });
    }
    if !(0.0..=1.0).contains(&backend.block_height_zero_threshold) {
        errors.push(ValidationError::ThresholdOutOfRange {
            backend: backend.name.clone(),
            threshold: backend.block_height_zero_threshold,
        });
    }

    let window_secs = backend.block_height_zero_window_length_secs;
    let bucket_secs = backend.block_height_zero_bucket_size_secs;
    if window_secs == 0 {
        errors.push(ValidationError::ZeroWindowLength(backend.name.clone()));
    }
    if bucket_secs == 0 {
        errors.push(ValidationError::ZeroBucketSize(backend.name.clone()));
    }
    if window_secs > 0 && bucket_secs > window_secs {
        errors.push(ValidationError::BucketLargerThanWindow {
            backend: backend.name.clone(),
            bucket_secs,
            window_secs,
        });
    }
}

fn validate_consensus(group: &str, consensus: &ConsensusConfig, errors: &mut Vec<ValidationError>) {
    let zero = |field: &'static str| ValidationError::ZeroConsensusSetting {
        group: group.to_string(),
        field,
    };

    if consensus.poll_interval_ms == 0 {
        errors.push(zero("poll_interval_ms"));
    }
    if consensus.poll_timeout_ms == 0 {
        errors.push(zero("poll_timeout_ms"));
    }
    if consensus.max_update_threshold_secs == Some(0) {
        errors.push(zero("max_update_threshold_secs"));
    }
    match consensus.ban_policy {
        BanPolicyConfig::Fixed { period_secs: 0 } => errors.push(zero("ban_policy.period_secs")),
        BanPolicyConfig::Exponential { base_secs: 0, .. } => errors.push(zero("ban_policy.base_secs")),
        BanPolicyConfig::Exponential { base_secs, max_secs } if base_secs > max_secs => {
            errors.push(ValidationError::BanBaseAboveMax(group.to_string()));
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BackendGroupConfig;

    fn valid() -> ProxyConfig {
        ProxyConfig {
            backends: vec![
                BackendConfig::new("node1", "http://127.0.0.1:8545"),
                BackendConfig::new("node2", "http://127.0.0.1:8546"),
            ],
            backend_groups: vec![BackendGroupConfig {
                name: "node".into(),
                backends: vec!["node1".into(), "node2".into()],
                consensus: ConsensusConfig::default(),
            }],
            ..ProxyConfig::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert_eq!(validate_config(&valid()), Ok(()));
    }

    #[test]
    fn test_collects_all_backend_errors() {
        let mut config = valid();
        config.backends[0].block_height_zero_threshold = 1.2;
        config.backends[0].block_height_zero_bucket_size_secs = 120;
        config.backends[1].rpc_url = "not a url".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::ThresholdOutOfRange {
            backend: "node1".into(),
            threshold: 1.2
        }));
        assert!(errors.contains(&ValidationError::BucketLargerThanWindow {
            backend: "node1".into(),
            bucket_secs: 120,
            window_secs: 60
        }));
    }

    #[test]
    fn test_group_references() {
        let mut config = valid();
        config.backend_groups[0].backends.push("node3".into());
        config.backend_groups.push(BackendGroupConfig {
            name: "archive".into(),
            backends: vec!["node1".into()],
            consensus: ConsensusConfig::default(),
        });

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::UnknownBackend {
            group: "node".into(),
            backend: "node3".into()
        }));
        assert!(errors.contains(&ValidationError::BackendInMultipleGroups {
            backend: "node1".into(),
            first: "node".into(),
            second: "archive".into()
        }));
    }

    #[test]
    fn test_consensus_settings() {
        let mut config = valid();
        config.backend_groups[0].consensus.poll_interval_ms = 0;
        config.backend_groups[0].consensus.ban_policy = BanPolicyConfig::Exponential {
            base_secs: 600,
            max_secs: 60,
        };
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::ZeroConsensusSetting {
                    group: "node".into(),
                    field: "poll_interval_ms"
                },
                ValidationError::BanBaseAboveMax("node".into()),
            ]
        );
    }

    #[test]
    fn test_observability_settings() {
        let mut config = valid();
        config.observability.log_level = "loud".into();
        config.observability.metrics_address = "nowhere".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
