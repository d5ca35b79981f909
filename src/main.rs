//! RPC consensus daemon.
//!
//! Polls every configured backend group, bans backends that keep reporting
//! a zero chain head, and tracks each group's canonical head.
//!
//! ```text
//!   consensus.toml ──▶ load_config ──▶ BackendPool ──▶ ConsensusScheduler (one per group)
//!        │                                  ▲                   │
//!        ▼                                  │                   ▼
//!   ConfigWatcher ──▶ rebuild ──▶ ArcSwap ──┘         Consensus ──▶ MetricsListener
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use clap::Parser;

use rpc_consensus::config::{load_config, ConfigWatcher, ProxyConfig};
use rpc_consensus::consensus::ConsensusScheduler;
use rpc_consensus::health::{SharedClock, SystemClock};
use rpc_consensus::lifecycle::{wait_for_signal, Shutdown};
use rpc_consensus::load_balancer::BackendPool;
use rpc_consensus::observability::{logging, metrics, MetricsListener};

#[derive(Parser, Debug)]
#[command(name = "rpc-consensus", version, about = "Backend health and consensus tracking for RPC groups")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config/consensus.toml")]
    config: PathBuf,

    /// Log level, overriding the configured one
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.observability.log_level.clone());
    logging::init(&level)?;

    tracing::info!(
        config = ?cli.config,
        backends = config.backends.len(),
        groups = config.backend_groups.len(),
        "rpc-consensus v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let clock = SystemClock::shared();
    let pool = build_pool(&config, &clock)?;
    let mut shutdown = Arc::new(Shutdown::new());
    spawn_pollers(&pool, &config, &shutdown);
    let current = ArcSwap::from_pointee(pool);

    let (watcher, mut updates) = ConfigWatcher::new(&cli.config);
    let _watcher = match watcher.run() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
            None
        }
    };

    let signal = wait_for_signal();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            res = &mut signal => {
                if let Err(e) = res {
                    tracing::error!(error = %e, "Failed to install signal handlers");
                }
                break;
            }
            Some(new_config) = updates.recv() => {
                let pool = match build_pool(&new_config, &clock) {
                    Ok(pool) => pool,
                    Err(e) => {
                        tracing::error!(error = %e, "Rejected reloaded config, keeping current backend groups");
                        continue;
                    }
                };

                shutdown.trigger();
                let next = Arc::new(Shutdown::new());
                spawn_pollers(&pool, &new_config, &next);
                shutdown = next;

                let previous = current.swap(Arc::new(pool));
                for group in previous.groups() {
                    group.consensus().reset();
                }
                tracing::info!(groups = current.load().len(), "Backend groups reloaded");
            }
        }
    }

    shutdown.trigger();
    // Give pollers a moment to observe cancellation before the runtime drops.
    tokio::time::sleep(Duration::from_millis(100)).await;
    tracing::info!(pollers = shutdown.receiver_count(), "Shutdown complete");
    Ok(())
}

fn build_pool(config: &ProxyConfig, clock: &SharedClock) -> Result<BackendPool, Box<dyn std::error::Error>> {
    let pool = BackendPool::from_config(config, clock.clone())?;
    pool.add_listener(Arc::new(MetricsListener));
    Ok(pool)
}

fn spawn_pollers(pool: &BackendPool, config: &ProxyConfig, shutdown: &Shutdown) {
    for group_config in &config.backend_groups {
        let Some(group) = pool.get(&group_config.name) else {
            continue;
        };
        let interval = Duration::from_millis(group_config.consensus.poll_interval_ms);
        let scheduler = ConsensusScheduler::new(group.clone(), interval);
        tokio::spawn(scheduler.run(shutdown.subscribe()));
    }
}
