//! End-to-end tests for the sampling pipeline.
//!
//! These tests run the real sampler loop against a TCP probe pointed at a
//! local listener, and check what lands in the transition log and what
//! survives a restart.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

use std::time::Duration;

use netwatch_core::{ReachState, Timestamp, Transition};
use netwatchd::config::{Config, ProbeKind};
use netwatchd::context::Context;
use netwatchd::probe::{HostProbe, Probe, TcpProbe};
use netwatchd::sampler::{spawn_sampler, Sampler, TickOutcome};
use netwatchd::store::{RedbStore, TransitionStore};
use tokio::net::TcpListener;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Upper bound on how long a state change may take to be recorded
const SETTLE_TIMEOUT: Duration = Duration::from_secs(3);

const POLL: Duration = Duration::from_millis(10);

fn tcp_config(port: u16) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        probe: ProbeKind::Tcp,
        tcp_port: port,
        poll_interval_ms: 20,
        probe_timeout_ms: 200,
        ..Config::default()
    }
}

/// Polls the store until its latest record has `state`.
async fn wait_for_latest<S: TransitionStore>(store: &S, state: ReachState) -> Transition {
    let start = tokio::time::Instant::now();
    while start.elapsed() < SETTLE_TIMEOUT {
        if let Some(latest) = store.latest().unwrap() {
            if latest.state == state {
                return latest;
            }
        }
        sleep(POLL).await;
    }
    panic!("log never reached {state}");
}

#[tokio::test]
async fn test_sampler_records_up_then_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let db_dir = tempfile::tempdir().unwrap();
    let store = RedbStore::open(db_dir.path().join("uptime.redb")).unwrap();
    let config = tcp_config(port);
    let probe = HostProbe::from_config(&config).unwrap();
    assert_eq!(probe.target(), format!("tcp://127.0.0.1:{port}"));

    let ctx = Context::new(config, store, CancellationToken::new());
    let handle = spawn_sampler(probe, &ctx);

    let up = wait_for_latest(ctx.store.as_ref(), ReachState::Up).await;

    drop(listener);
    let down = wait_for_latest(ctx.store.as_ref(), ReachState::Down).await;
    assert!(down.at >= up.at);

    ctx.cancel.cancel();
    handle.await.unwrap();

    let history: Vec<_> = ctx.store.all().collect::<Result<_, _>>().unwrap();
    // Consecutive records in the log alternate
    for pair in history.windows(2) {
        assert_ne!(pair[0].state, pair[1].state);
    }
}

#[tokio::test]
async fn test_restart_resumes_from_logged_state() {
    let db_dir = tempfile::tempdir().unwrap();
    let db_path = db_dir.path().join("uptime.redb");

    // First run ends while the host is up
    {
        let store = RedbStore::open(&db_path).unwrap();
        let ctx = Context::new(Config::default(), store, CancellationToken::new());
        let mut sampler = Sampler::new(TcpProbe::new("127.0.0.1", 1).unwrap(), &ctx);
        assert_eq!(sampler.last_known(), ReachState::Down);

        let outcome = sampler
            .record_sample(ReachState::Up, Timestamp::from_secs(1_000))
            .await;
        assert!(matches!(outcome, TickOutcome::Changed { persisted: true, .. }));
    }

    // Second run seeds Up, so another Up sample is not a transition
    let store = RedbStore::open(&db_path).unwrap();
    let ctx = Context::new(Config::default(), store, CancellationToken::new());
    let mut sampler = Sampler::new(TcpProbe::new("127.0.0.1", 1).unwrap(), &ctx);
    assert_eq!(sampler.last_known(), ReachState::Up);

    let outcome = sampler
        .record_sample(ReachState::Up, Timestamp::from_secs(2_000))
        .await;
    assert_eq!(outcome, TickOutcome::Unchanged(ReachState::Up));

    let history: Vec<_> = ctx.store.all().collect::<Result<_, _>>().unwrap();
    assert_eq!(
        history,
        vec![Transition::new(Timestamp::from_secs(1_000), ReachState::Up)]
    );
}

#[tokio::test]
async fn test_unreachable_host_on_empty_log_writes_nothing() {
    // Bind then drop to get a port nobody listens on
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let db_dir = tempfile::tempdir().unwrap();
    let store = RedbStore::open(db_dir.path().join("uptime.redb")).unwrap();
    let config = tcp_config(port);
    let probe = HostProbe::from_config(&config).unwrap();
    let ctx = Context::new(config, store, CancellationToken::new());
    let handle = spawn_sampler(probe, &ctx);

    sleep(Duration::from_millis(200)).await;
    ctx.cancel.cancel();
    handle.await.unwrap();

    assert!(ctx.store.latest().unwrap().is_none());
}
