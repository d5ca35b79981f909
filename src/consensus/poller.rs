//! Consensus poller and ban tracker.
//!
//! # Responsibilities
//! - Poll each backend's latest block and record the observation
//! - Ban backends whose health predicates fail
//! - Expire bans and re-evaluate the backend in the same cycle
//! - Compute the group's canonical chain head
//! - Notify listeners of every transition
//!
//! # State Transitions
//! ```text
//! Healthy → Banned: block height zero above threshold, stalled head, or lag
//! Banned → Healthy: unban(), reset(), or ban expiry seen by a consensus update
//! ```
//!
//! # Design Decisions
//! - Mutations run one at a time and deliver their events before the next
//!   starts, so every listener sees transitions in state order
//! - Listeners may read the tracker but must not mutate it
//! - Backends agreeing on a height but not on its hash are logged; the
//!   first one in group order supplies the hash

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::blockchain::{BlockHead, PollError};
use crate::consensus::ban_policy::{BanPolicy, FixedBan};
use crate::consensus::listener::{
    BanEvent, BanState, ConsensusHead, ConsensusListener, TransitionReason,
};
use crate::health::{SharedClock, Timestamp};
use crate::load_balancer::backend::Backend;
use crate::observability::metrics;

/// Default deadline for a single poll.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// How a failed poll feeds the block-height-zero window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollFailurePolicy {
    /// A failed poll records nothing.
    #[default]
    Ignore,
    /// A failed poll counts as an anomalous observation.
    CountAsAnomaly,
}

/// Tunables for a [`Consensus`] tracker.
#[derive(Debug, Clone)]
pub struct ConsensusOptions {
    pub ban_policy: Arc<dyn BanPolicy>,
    pub poll_timeout: Duration,
    pub poll_failure_policy: PollFailurePolicy,
    /// Ban backends whose head is this many blocks behind the highest head.
    pub max_block_lag: Option<u64>,
    /// Ban backends whose head has not moved for this long.
    pub max_update_threshold: Option<Duration>,
}

impl Default for ConsensusOptions {
    fn default() -> Self {
        Self {
            ban_policy: Arc::new(FixedBan::default()),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            poll_failure_policy: PollFailurePolicy::Ignore,
            max_block_lag: None,
            max_update_threshold: None,
        }
    }
}

/// Ban record for one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BanEntry {
    pub reason: TransitionReason,
    pub banned_at: Timestamp,
    /// `None` bans until a manual unban.
    pub banned_until: Option<Timestamp>,
}

impl BanEntry {
    fn is_active(&self, now: Timestamp) -> bool {
        self.banned_until.map_or(true, |until| until > now)
    }
}

#[derive(Default)]
struct ConsensusState {
    bans: HashMap<String, BanEntry>,
    strikes: HashMap<String, u32>,
    listeners: Vec<Arc<dyn ConsensusListener>>,
    head: Option<ConsensusHead>,
}

impl ConsensusState {
    fn is_banned(&self, name: &str, now: Timestamp) -> bool {
        self.bans.get(name).is_some_and(|entry| entry.is_active(now))
    }
}

/// Notifications collected under the state lock and delivered after it.
#[derive(Default)]
struct Outbox {
    events: Vec<BanEvent>,
    head: Option<ConsensusHead>,
}

/// Tracks ban state and consensus for one backend group.
pub struct Consensus {
    group: String,
    backends: Vec<Arc<Backend>>,
    clock: SharedClock,
    options: ConsensusOptions,
    state: RwLock<ConsensusState>,
    /// Held from a mutation's state change through its dispatch.
    transitions: Mutex<()>,
}

impl Consensus {
    pub fn new(
        group: impl Into<String>,
        backends: Vec<Arc<Backend>>,
        clock: SharedClock,
        options: ConsensusOptions,
    ) -> Self {
        Self {
            group: group.into(),
            backends,
            clock,
            options,
            state: RwLock::new(ConsensusState::default()),
            transitions: Mutex::new(()),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn options(&self) -> &ConsensusOptions {
        &self.options
    }

    /// Register a listener for ban transitions and head updates.
    pub fn add_listener(&self, listener: Arc<dyn ConsensusListener>) {
        self.state
            .write()
            .expect("consensus lock poisoned")
            .listeners
            .push(listener);
    }

    /// Drop every registered listener.
    pub fn clear_listeners(&self) {
        self.state
            .write()
            .expect("consensus lock poisoned")
            .listeners
            .clear();
    }

    /// Whether `backend` is currently excluded from routing.
    pub fn is_banned(&self, backend: &Backend) -> bool {
        let now = self.clock.now();
        self.state
            .read()
            .expect("consensus lock poisoned")
            .is_banned(backend.name(), now)
    }

    /// Ban record for `backend`, including one that has expired but not
    /// yet been re-evaluated.
    pub fn ban_entry(&self, backend: &Backend) -> Option<BanEntry> {
        self.state
            .read()
            .expect("consensus lock poisoned")
            .bans
            .get(backend.name())
            .copied()
    }

    /// Last computed canonical head.
    pub fn consensus_head(&self) -> Option<ConsensusHead> {
        self.state.read().expect("consensus lock poisoned").head
    }

    /// Backends this tracker evaluates, in routing order.
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    /// Poll one backend and record what it reported.
    ///
    /// Banned backends are skipped. Errors, timeouts and cancellation are
    /// recorded as failed observations and never propagated.
    pub async fn update_backend(&self, cancel: &CancellationToken, backend: &Backend) {
        if self.is_banned(backend) {
            tracing::debug!(group = %self.group, backend = %backend.name(), "Skipping banned backend");
            return;
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PollError::Cancelled),
            polled = timeout(self.options.poll_timeout, backend.source().latest_block()) => {
                polled.unwrap_or(Err(PollError::Timeout(self.options.poll_timeout)))
            }
        };

        let now = self.clock.now();
        let window = backend.block_height_zero_window();
        match result {
            Ok(head) => {
                if head.is_zero() {
                    tracing::warn!(
                        group = %self.group,
                        backend = %backend.name(),
                        "Backend responded latest block as zero"
                    );
                    window.increment(1.0);
                } else {
                    window.increment(0.0);
                }
                tracing::trace!(
                    group = %self.group,
                    backend = %backend.name(),
                    head = %head,
                    "Backend polled"
                );
                backend.record_head(now, head);
            }
            Err(e) => {
                tracing::warn!(
                    group = %self.group,
                    backend = %backend.name(),
                    error = %e,
                    "Error polling backend"
                );
                metrics::record_poll_error(backend.name());
                if self.options.poll_failure_policy == PollFailurePolicy::CountAsAnomaly {
                    window.increment(1.0);
                }
                backend.record_failure(now, e);
            }
        }
    }

    /// Poll every backend concurrently, then update consensus.
    pub async fn poll_cycle(&self, cancel: &CancellationToken) {
        join_all(
            self.backends
                .iter()
                .map(|backend| self.update_backend(cancel, backend)),
        )
        .await;
        self.update_backend_group_consensus();
    }

    /// Apply ban policy and recompute the canonical head.
    ///
    /// Calling this again without new polls changes nothing.
    pub fn update_backend_group_consensus(&self) {
        let _serial = self.serialize();
        let now = self.clock.now();
        let mut outbox = Outbox::default();

        let listeners = {
            let mut state = self.state.write().expect("consensus lock poisoned");
            self.expire_bans(&mut state, now, &mut outbox);
            self.apply_ban_predicates(&mut state, now, &mut outbox);
            self.compute_head(&mut state, now, &mut outbox);
            state.listeners.clone()
        };

        self.dispatch(&listeners, outbox);
    }

    /// Lift a ban immediately. The backend's signal history is kept.
    pub fn unban(&self, backend: &Backend) {
        let _serial = self.serialize();
        let mut outbox = Outbox::default();
        let listeners = {
            let mut state = self.state.write().expect("consensus lock poisoned");
            if state.bans.remove(backend.name()).is_none() {
                return;
            }
            tracing::info!(group = %self.group, backend = %backend.name(), "Backend unbanned");
            outbox.events.push(self.event(backend.name(), BanState::Healthy, TransitionReason::Manual, None));
            state.listeners.clone()
        };
        self.dispatch(&listeners, outbox);
    }

    /// Clear every ban, strike, the canonical head and all listeners.
    ///
    /// Every ban on record is announced as lifted first: `Reset` for an
    /// active one, `Expired` for one whose period ran out unobserved.
    pub fn reset(&self) {
        let _serial = self.serialize();
        let now = self.clock.now();
        let mut outbox = Outbox::default();
        let listeners = {
            let mut state = self.state.write().expect("consensus lock poisoned");
            let mut lifted: Vec<(String, TransitionReason)> = state
                .bans
                .iter()
                .map(|(name, entry)| {
                    let reason = if entry.is_active(now) {
                        TransitionReason::Reset
                    } else {
                        TransitionReason::Expired
                    };
                    (name.clone(), reason)
                })
                .collect();
            lifted.sort_by(|a, b| a.0.cmp(&b.0));
            for (name, reason) in lifted {
                outbox.events.push(self.event(&name, BanState::Healthy, reason, None));
            }

            let ConsensusState { listeners, .. } = std::mem::take(&mut *state);
            listeners
        };
        tracing::info!(group = %self.group, "Consensus state reset");
        self.dispatch(&listeners, outbox);
    }

    fn expire_bans(&self, state: &mut ConsensusState, now: Timestamp, outbox: &mut Outbox) {
        for backend in &self.backends {
            let expired = state
                .bans
                .get(backend.name())
                .is_some_and(|entry| !entry.is_active(now));
            if expired {
                state.bans.remove(backend.name());
                tracing::info!(group = %self.group, backend = %backend.name(), "Backend ban expired");
                outbox.events.push(self.event(backend.name(), BanState::Healthy, TransitionReason::Expired, None));
            }
        }
    }

    fn apply_ban_predicates(&self, state: &mut ConsensusState, now: Timestamp, outbox: &mut Outbox) {
        let highest = self
            .backends
            .iter()
            .filter(|b| !state.is_banned(b.name(), now))
            .filter_map(|b| b.health().latest)
            .filter(|head| !head.is_zero())
            .map(|head| head.number)
            .max();

        for backend in &self.backends {
            if state.is_banned(backend.name(), now) {
                continue;
            }
            if let Some(reason) = self.ban_reason(backend, now, highest) {
                self.ban(state, backend, reason, now, outbox);
            }
        }
    }

    fn ban_reason(&self, backend: &Backend, now: Timestamp, highest: Option<u64>) -> Option<TransitionReason> {
        if backend.block_height_zero_above_threshold() {
            return Some(TransitionReason::BlockHeightZero);
        }

        let health = backend.health();
        if let (Some(limit), Some(advanced)) = (self.options.max_update_threshold, health.last_advanced) {
            let idle = now.duration_since(advanced).unwrap_or_default();
            if idle > limit {
                return Some(TransitionReason::Stalled);
            }
        }

        if let (Some(max_lag), Some(highest), Some(head)) = (self.options.max_block_lag, highest, health.latest) {
            if !head.is_zero() && highest.saturating_sub(head.number) > max_lag {
                return Some(TransitionReason::Lagging);
            }
        }
        None
    }

    fn ban(
        &self,
        state: &mut ConsensusState,
        backend: &Backend,
        reason: TransitionReason,
        now: Timestamp,
        outbox: &mut Outbox,
    ) {
        let strikes = {
            let count = state.strikes.entry(backend.name().to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let banned_until = self
            .options
            .ban_policy
            .ban_duration(strikes)
            .map(|d| now + d);

        tracing::warn!(
            group = %self.group,
            backend = %backend.name(),
            reason = %reason,
            strikes,
            "Backend banned"
        );

        state.bans.insert(
            backend.name().to_string(),
            BanEntry {
                reason,
                banned_at: now,
                banned_until,
            },
        );
        outbox.events.push(self.event(backend.name(), BanState::Banned, reason, banned_until));
    }

    fn compute_head(&self, state: &mut ConsensusState, now: Timestamp, outbox: &mut Outbox) {
        let candidates: Vec<BlockHead> = self
            .backends
            .iter()
            .filter(|b| !state.is_banned(b.name(), now))
            .map(|b| b.health())
            .filter(|health| health.last_error.is_none())
            .filter_map(|health| health.latest)
            .filter(|head| !head.is_zero())
            .collect();

        let Some(common) = candidates.iter().map(|head| head.number).min() else {
            tracing::warn!(group = %self.group, "No healthy backends to build consensus from");
            return;
        };
        let Some(agreed) = candidates.iter().find(|head| head.number == common) else {
            return;
        };
        if candidates
            .iter()
            .any(|head| head.number == common && head.hash != agreed.hash)
        {
            tracing::warn!(
                group = %self.group,
                number = common,
                hash = %agreed.hash,
                "Backends disagree on the hash at the common height"
            );
        }

        let changed = state
            .head
            .map_or(true, |prev| prev.number != agreed.number || prev.hash != agreed.hash);
        if !changed {
            return;
        }

        let head = ConsensusHead {
            number: agreed.number,
            hash: agreed.hash,
            updated_at: now,
        };
        tracing::debug!(
            group = %self.group,
            number = head.number,
            hash = %head.hash,
            candidates = candidates.len(),
            "Consensus head updated"
        );
        state.head = Some(head);
        outbox.head = Some(head);
    }

    fn serialize(&self) -> MutexGuard<'_, ()> {
        self.transitions.lock().expect("consensus transition lock poisoned")
    }

    fn event(
        &self,
        backend: &str,
        state: BanState,
        reason: TransitionReason,
        banned_until: Option<Timestamp>,
    ) -> BanEvent {
        BanEvent {
            group: self.group.clone(),
            backend: backend.to_string(),
            state,
            reason,
            banned_until,
        }
    }

    fn dispatch(&self, listeners: &[Arc<dyn ConsensusListener>], outbox: Outbox) {
        for listener in listeners {
            for event in &outbox.events {
                listener.on_ban_state_change(event);
            }
            if let Some(head) = &outbox.head {
                listener.on_consensus_head(&self.group, head);
            }
        }
    }
}

impl std::fmt::Debug for Consensus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consensus")
            .field("group", &self.group)
            .field("backends", &self.backends.len())
            .field("options", &self.options)
            .finish()
    }
}
