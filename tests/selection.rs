//! Engine-level tests: prober and poller feeding the state store, selector
//! reading it back out.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use pulse_proxy::balancer::{
    BackendStore, Outcome, ScoringPolicy, Selector, StaticPolicy,
};
use pulse_proxy::config::{BackendConfig, PollConfig, ProbeConfig, ScoringConfig};
use pulse_proxy::health::{HealthProber, MetricsPoller};

mod common;

fn store_for(endpoints: &[(&str, SocketAddr)]) -> Arc<BackendStore> {
    let configs: Vec<BackendConfig> = endpoints
        .iter()
        .map(|(id, addr)| BackendConfig {
            id: id.to_string(),
            endpoint: format!("http://{addr}"),
        })
        .collect();
    Arc::new(BackendStore::from_config(&configs))
}

fn fast_probe_config() -> ProbeConfig {
    ProbeConfig {
        interval_ms: 50,
        timeout_ms: 300,
        ..ProbeConfig::default()
    }
}

fn static_selector(store: Arc<BackendStore>) -> Selector {
    let config = ScoringConfig::default();
    Selector::with_rng(
        store,
        ScoringPolicy::Static(StaticPolicy::new(&config)),
        &config,
        StdRng::seed_from_u64(11),
    )
}

#[tokio::test]
async fn probes_rank_fast_backend_first() {
    let fast_addr: SocketAddr = "127.0.0.1:29301".parse().unwrap();
    let slow_addr: SocketAddr = "127.0.0.1:29302".parse().unwrap();
    common::start_mock_backend(fast_addr, "fast", Duration::from_millis(5)).await;
    common::start_mock_backend(slow_addr, "slow", Duration::from_millis(150)).await;

    let store = store_for(&[("slow", slow_addr), ("fast", fast_addr)]);
    let prober = HealthProber::new(store.clone(), fast_probe_config());
    for _ in 0..3 {
        prober.sweep().await;
    }

    for snap in store.snapshots() {
        assert!(snap.alive());
        assert_eq!(snap.stats.total_probes, 3);
        assert_eq!(
            snap.stats.total_probes,
            snap.stats.probe_successes + snap.stats.probe_failures
        );
        assert_eq!(snap.loss_percent(), 0.0);
    }

    let selector = static_selector(store);
    let selection = selector.select().unwrap();
    assert_eq!(selection.backend().id, "fast");
    selection.complete(Duration::from_millis(5), Outcome::Success);
}

#[tokio::test]
async fn timed_out_backend_is_unreachable_and_loses() {
    let healthy_addr: SocketAddr = "127.0.0.1:29303".parse().unwrap();
    let silent_addr: SocketAddr = "127.0.0.1:29304".parse().unwrap();
    common::start_mock_backend(healthy_addr, "ok", Duration::from_millis(5)).await;
    common::start_silent_backend(silent_addr).await;

    let store = store_for(&[("mute", silent_addr), ("ok", healthy_addr)]);
    let prober = HealthProber::new(
        store.clone(),
        ProbeConfig {
            interval_ms: 50,
            timeout_ms: 100,
            ..ProbeConfig::default()
        },
    );
    prober.sweep().await;

    let mute = store.get("mute").unwrap().snapshot();
    assert!(!mute.alive());
    assert_eq!(mute.stats.probe_failures, 1);
    assert_eq!(mute.loss_percent(), 100.0);

    let selector = static_selector(store.clone());
    assert_eq!(
        StaticPolicy::new(&ScoringConfig::default()).score(&mute),
        f64::NEG_INFINITY
    );
    assert_eq!(selector.select().unwrap().backend().id, "ok");
}

#[tokio::test]
async fn poller_updates_queue_and_tolerates_garbage() {
    let good_addr: SocketAddr = "127.0.0.1:29305".parse().unwrap();
    let bad_addr: SocketAddr = "127.0.0.1:29306".parse().unwrap();
    common::start_scripted_backend(good_addr, Duration::ZERO, |path| {
        if path == "/metrics" {
            (200, r#"{"queueLen": 8, "cpuBusyMs": 25, "memRss": 2048}"#.into())
        } else {
            (200, "ok".into())
        }
    })
    .await;
    common::start_scripted_backend(bad_addr, Duration::ZERO, |_| (200, "not json".into())).await;

    let store = store_for(&[("good", good_addr), ("bad", bad_addr)]);
    let poller = MetricsPoller::new(
        store.clone(),
        PollConfig {
            interval_ms: 50,
            ..PollConfig::default()
        },
    );
    poller.sweep().await;

    let good = store.get("good").unwrap().snapshot();
    assert_eq!(good.stats.queue_len, 8.0);
    assert_eq!(good.stats.queue_len_ewma, Some(8.0));
    assert_eq!(good.stats.cpu_busy_ms, 25.0);
    assert_eq!(good.stats.memory_used_bytes, 2048.0);

    // malformed payload: state keeps its defaults, no error surfaces
    let bad = store.get("bad").unwrap().snapshot();
    assert_eq!(bad.stats.queue_len, 0.0);
    assert_eq!(bad.stats.queue_len_ewma, None);
}

#[tokio::test]
async fn learned_loop_punishes_slow_errored_backend() {
    let addr: SocketAddr = "127.0.0.1:29307".parse().unwrap();
    common::start_mock_backend(addr, "ok", Duration::from_millis(5)).await;

    let store = store_for(&[("only", addr)]);
    let prober = HealthProber::new(store.clone(), fast_probe_config());
    prober.sweep().await;

    let mut config = ScoringConfig::default();
    config.epsilon = 0.0;
    let policy = ScoringPolicy::from_config(&ScoringConfig {
        policy: pulse_proxy::config::PolicyKind::Learned,
        ..config.clone()
    });
    let model = policy.model().unwrap().clone();
    let selector = Selector::with_rng(store, policy, &config, StdRng::seed_from_u64(5));

    let before = model.weights();
    for _ in 0..5 {
        let selection = selector.select().unwrap();
        selection.complete(Duration::from_millis(2000), Outcome::ServerError);
    }
    let after = model.weights();
    assert!(after.latency < before.latency);
    assert!(after.error < before.error);
}
