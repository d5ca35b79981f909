//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use alloy::primitives::B256;
use futures_util::future::{BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;

use rpc_consensus::blockchain::{BlockHead, BlockSource, PollError, PollResult};
use rpc_consensus::consensus::{BanEvent, ConsensusOptions};
use rpc_consensus::health::{AdjustableClock, SharedClock, SlidingWindowOptions};
use rpc_consensus::load_balancer::BackendOptions;
use rpc_consensus::{Backend, BackendGroup};

/// Block source whose answer is set by the test.
#[derive(Debug)]
pub struct MockBlockSource {
    response: Mutex<PollResult<BlockHead>>,
    calls: AtomicU64,
}

impl MockBlockSource {
    pub fn new(height: u64) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(Ok(head(height))),
            calls: AtomicU64::new(0),
        })
    }

    pub fn set_height(&self, height: u64) {
        *self.response.lock().unwrap() = Ok(head(height));
    }

    pub fn set_error(&self, message: &str) {
        *self.response.lock().unwrap() = Err(PollError::Rpc(message.to_string()));
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BlockSource for MockBlockSource {
    fn latest_block(&self) -> BoxFuture<'_, PollResult<BlockHead>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.response.lock().unwrap().clone();
        async move { response }.boxed()
    }
}

/// Head at `height` with a hash derived from the height.
pub fn head(height: u64) -> BlockHead {
    BlockHead::new(height, B256::left_padding_from(&height.to_be_bytes()))
}

/// A fixed start time, aligned to whole seconds.
pub fn epoch() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

/// Per-backend setup for [`TestGroup::build`].
pub struct BackendSpec {
    pub name: &'static str,
    pub height: u64,
    pub window_length: Duration,
    pub threshold: f64,
}

impl BackendSpec {
    pub fn new(name: &'static str, height: u64) -> Self {
        Self {
            name,
            height,
            window_length: Duration::from_secs(60),
            threshold: 0.1,
        }
    }

    pub fn window_length(mut self, window_length: Duration) -> Self {
        self.window_length = window_length;
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}

/// A backend group driven by an adjustable clock and mock sources.
pub struct TestGroup {
    pub clock: Arc<AdjustableClock>,
    pub group: BackendGroup,
    pub sources: Vec<Arc<MockBlockSource>>,
    pub events: Arc<Mutex<Vec<BanEvent>>>,
    cancel: CancellationToken,
}

impl TestGroup {
    pub fn build(specs: Vec<BackendSpec>, options: ConsensusOptions) -> Self {
        let clock = Arc::new(AdjustableClock::new(epoch()));
        let shared: SharedClock = clock.clone();

        let mut sources = Vec::new();
        let mut backends = Vec::new();
        for spec in specs {
            let source = MockBlockSource::new(spec.height);
            let options = BackendOptions {
                block_height_zero_window: SlidingWindowOptions::default()
                    .with_window_length(spec.window_length)
                    .with_clock(shared.clone()),
                block_height_zero_threshold: spec.threshold,
                ..BackendOptions::default()
            };
            backends.push(Backend::new(spec.name, source.clone(), options).unwrap());
            sources.push(source);
        }

        let group = BackendGroup::new("node", backends, shared, options).unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        group
            .consensus()
            .add_listener(Arc::new(move |e: &BanEvent| sink.lock().unwrap().push(e.clone())));

        Self {
            clock,
            group,
            sources,
            events,
            cancel: CancellationToken::new(),
        }
    }

    /// Two backends with default signal settings: `node1` and `node2`.
    pub fn pair() -> Self {
        Self::build(
            vec![BackendSpec::new("node1", 0x101), BackendSpec::new("node2", 0x101)],
            ConsensusOptions::default(),
        )
    }

    pub fn backend(&self, index: usize) -> &Arc<Backend> {
        &self.group.backends()[index]
    }

    pub fn source(&self, index: usize) -> &Arc<MockBlockSource> {
        &self.sources[index]
    }

    pub fn is_banned(&self, index: usize) -> bool {
        self.group.consensus().is_banned(self.backend(index))
    }

    /// One full poll-then-consensus cycle.
    pub async fn poll(&self) {
        self.group.consensus().poll_cycle(&self.cancel).await;
    }

    pub fn advance(&self, d: Duration) {
        self.clock.advance(d);
    }

    pub fn events(&self) -> Vec<BanEvent> {
        self.events.lock().unwrap().clone()
    }
}
