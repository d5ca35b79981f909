//! Block-height-zero detection across a backend group.

mod common;

use std::time::Duration;

use common::{epoch, BackendSpec, MockBlockSource, TestGroup};
use rpc_consensus::consensus::{BanState, ConsensusOptions, TransitionReason};
use rpc_consensus::health::{AdjustableClock, SharedClock, SlidingWindow, SlidingWindowOptions};
use rpc_consensus::load_balancer::{BackendOptions, BackendOverride};
use rpc_consensus::Backend;
use std::sync::Arc;

/// Poll `times` times, `spacing` apart, starting now.
async fn poll_every(t: &TestGroup, times: usize, spacing: Duration) {
    for i in 0..times {
        if i > 0 {
            t.advance(spacing);
        }
        t.poll().await;
    }
}

#[tokio::test]
async fn test_sparse_zero_polls_never_fill_the_window() {
    let t = TestGroup::pair();
    t.source(0).set_height(0);

    for i in 0..6 {
        if i > 0 {
            t.advance(Duration::from_secs(61));
        }
        t.poll().await;

        let window = t.backend(0).block_height_zero_window();
        assert_eq!(window.count(), 1, "poll {}", i);
        assert_eq!(window.avg(), 1.0, "poll {}", i);
        assert!(!t.is_banned(0), "poll {}", i);
    }
    assert!(t.events().is_empty());
}

#[tokio::test]
async fn test_repeated_zero_polls_ban_only_the_bad_backend() {
    let t = TestGroup::pair();
    t.source(0).set_height(0);

    let mut banned_at = None;
    for poll in 1..=10 {
        t.poll().await;
        if banned_at.is_none() && t.is_banned(0) {
            banned_at = Some(poll);
        }
        assert!(!t.is_banned(1));
        t.advance(Duration::from_secs(3));
    }

    assert_eq!(banned_at, Some(5));
    let events = t.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].backend, "node1");
    assert_eq!(events[0].state, BanState::Banned);
    assert_eq!(events[0].reason, TransitionReason::BlockHeightZero);
    assert_eq!(events[0].banned_until, Some(epoch() + Duration::from_secs(12 + 300)));
}

#[tokio::test]
async fn test_healthy_polls_do_not_lift_a_ban() {
    let t = TestGroup::pair();
    t.source(0).set_height(0);
    poll_every(&t, 5, Duration::from_secs(1)).await;
    assert!(t.is_banned(0));

    t.source(0).set_height(0x200);
    let calls = t.source(0).calls();
    for _ in 0..5 {
        t.advance(Duration::from_secs(1));
        t.poll().await;
        assert!(t.is_banned(0));
    }
    assert_eq!(t.source(0).calls(), calls, "banned backend must not be polled");
}

#[tokio::test]
async fn test_unban_then_bad_poll_rebans_in_same_cycle() {
    let t = TestGroup::pair();
    t.source(0).set_height(0);
    poll_every(&t, 5, Duration::from_secs(1)).await;
    assert!(t.is_banned(0));

    t.group.consensus().unban(t.backend(0));
    assert!(!t.is_banned(0));

    t.advance(Duration::from_secs(1));
    t.poll().await;
    assert!(t.is_banned(0));

    let reasons: Vec<(BanState, TransitionReason)> =
        t.events().iter().map(|e| (e.state, e.reason)).collect();
    assert_eq!(
        reasons,
        vec![
            (BanState::Banned, TransitionReason::BlockHeightZero),
            (BanState::Healthy, TransitionReason::Manual),
            (BanState::Banned, TransitionReason::BlockHeightZero),
        ]
    );
}

#[tokio::test]
async fn test_unban_after_window_drains_stays_healthy() {
    let t = TestGroup::pair();
    t.source(0).set_height(0);
    poll_every(&t, 5, Duration::from_secs(1)).await;
    assert!(t.is_banned(0));

    t.advance(Duration::from_secs(60) + Duration::from_secs(1));
    t.group.consensus().unban(t.backend(0));
    t.source(0).set_height(0x101);
    t.poll().await;

    assert!(!t.is_banned(0));
    assert!(!t.backend(0).block_height_zero_above_threshold());
    let window = t.backend(0).block_height_zero_window();
    assert_eq!(window.count(), 1);
    assert_eq!(window.avg(), 0.0);
}

#[tokio::test]
async fn test_consensus_update_is_idempotent() {
    let t = TestGroup::pair();
    t.source(0).set_height(0);
    poll_every(&t, 5, Duration::from_secs(1)).await;

    let entry = t.group.consensus().ban_entry(t.backend(0));
    let head = t.group.consensus().consensus_head();
    let events = t.events().len();

    for _ in 0..3 {
        t.group.consensus().update_backend_group_consensus();
    }

    assert_eq!(t.group.consensus().ban_entry(t.backend(0)), entry);
    assert_eq!(t.group.consensus().consensus_head(), head);
    assert_eq!(t.events().len(), events);
}

#[test]
fn test_backend_defaults() {
    let backend = Backend::new("node1", MockBlockSource::new(1), BackendOptions::default()).unwrap();
    let window = backend.block_height_zero_window();
    assert_eq!(window.window_length(), Duration::from_secs(60));
    assert_eq!(window.bucket_size(), Duration::from_secs(1));
    assert_eq!(backend.block_height_zero_threshold(), 0.1);
    assert_eq!(backend.block_height_zero_min_samples(), 5);
    assert!(!backend.block_height_zero_above_threshold());
}

#[tokio::test]
async fn test_per_backend_settings() {
    let t = TestGroup::build(
        vec![
            BackendSpec::new("node1", 0x101),
            BackendSpec::new("node2", 0x101)
                .window_length(Duration::from_secs(70))
                .threshold(0.5),
        ],
        ConsensusOptions::default(),
    );
    assert_eq!(t.backend(0).block_height_zero_window().window_length(), Duration::from_secs(60));
    assert_eq!(t.backend(1).block_height_zero_window().window_length(), Duration::from_secs(70));
    assert_eq!(t.backend(1).block_height_zero_threshold(), 0.5);

    // One zero poll out of five: 0.2 crosses 0.1 but not 0.5.
    t.source(0).set_height(0);
    t.source(1).set_height(0);
    t.poll().await;
    t.source(0).set_height(0x102);
    t.source(1).set_height(0x102);
    for _ in 0..4 {
        t.advance(Duration::from_secs(1));
        t.poll().await;
    }

    assert!(t.is_banned(0));
    assert!(!t.is_banned(1));
    assert_eq!(t.backend(1).block_height_zero_window().avg(), 0.2);

    t.backend(1)
        .override_with([BackendOverride::BlockHeightZeroThreshold(0.15)])
        .unwrap();
    t.group.consensus().update_backend_group_consensus();
    assert!(t.is_banned(1));
}

#[tokio::test]
async fn test_override_replaces_window() {
    let t = TestGroup::pair();
    t.source(0).set_height(0);
    poll_every(&t, 3, Duration::from_secs(1)).await;
    assert_eq!(t.backend(0).block_height_zero_window().count(), 3);

    let clock: SharedClock = t.clock.clone();
    let window = SlidingWindow::new(
        SlidingWindowOptions::default()
            .with_window_length(Duration::from_secs(90))
            .with_clock(clock),
    )
    .unwrap();
    t.backend(0)
        .override_with([
            BackendOverride::BlockHeightZeroSlidingWindow(window),
            BackendOverride::BlockHeightZeroMinSamples(1),
        ])
        .unwrap();

    let window = t.backend(0).block_height_zero_window();
    assert_eq!(window.window_length(), Duration::from_secs(90));
    assert_eq!(window.count(), 0);

    t.advance(Duration::from_secs(1));
    t.poll().await;
    assert!(t.is_banned(0));
}

#[test]
fn test_invalid_override_changes_nothing() {
    let clock: SharedClock = Arc::new(AdjustableClock::new(epoch()));
    let options = BackendOptions {
        block_height_zero_window: SlidingWindowOptions::default().with_clock(clock),
        ..BackendOptions::default()
    };
    let backend = Backend::new("node1", MockBlockSource::new(1), options).unwrap();

    let result = backend.override_with([
        BackendOverride::BlockHeightZeroMinSamples(1),
        BackendOverride::BlockHeightZeroThreshold(1.5),
    ]);
    assert!(result.is_err());
    assert_eq!(backend.block_height_zero_min_samples(), 5);
    assert_eq!(backend.block_height_zero_threshold(), 0.1);
}
