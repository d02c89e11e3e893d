//! Reachability sampler.
//!
//! Probes the host once per poll interval and records only edges: a
//! sample equal to the last known state is discarded; a different one is
//! appended to the transition log, announced on the relay, and becomes
//! the new last known state.
//!
//! # Ordering per transition
//!
//! 1. append to the log (waits for the store, never for subscribers)
//! 2. notify the relay (never waits)
//! 3. update `last_known`, even if 1 or 2 failed
//!
//! A failed append is logged and the transition is lost from history.
//! Updating the state anyway stops the next tick from retrying the same
//! write forever against a stuck store.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use netwatch_core::{ReachState, Timestamp, Transition};

use crate::context::Context;
use crate::probe::Probe;
use crate::relay::Relay;
use crate::store::TransitionStore;

/// State assumed when the log is empty.
pub const DEFAULT_STATE: ReachState = ReachState::Down;

/// What a single sample did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Sample matched the last known state; nothing written
    Unchanged(ReachState),

    /// Sample differed; a transition was recorded
    Changed {
        transition: Transition,
        /// Whether the append reached the store
        persisted: bool,
        /// Sessions that received the notification
        delivered: usize,
    },
}

impl TickOutcome {
    /// Returns the transition if this tick recorded one.
    pub fn transition(&self) -> Option<Transition> {
        match self {
            Self::Unchanged(_) => None,
            Self::Changed { transition, .. } => Some(*transition),
        }
    }
}

/// Polls a probe and records reachability edges.
///
/// Owns `last_known`; nothing else mutates it.
pub struct Sampler<P, S> {
    probe: P,
    store: Arc<S>,
    relay: Relay,
    poll_interval: Duration,
    probe_timeout: Duration,
    last_known: ReachState,
}

impl<P: Probe, S: TransitionStore> Sampler<P, S> {
    /// Creates a sampler seeded from the most recent logged transition.
    ///
    /// An empty (or unreadable) log seeds [`DEFAULT_STATE`]; no record is
    /// written for the seed.
    pub fn new(probe: P, ctx: &Context<S>) -> Self {
        let seed = ctx.status().latest();
        let last_known = seed.map(|t| t.state).unwrap_or(DEFAULT_STATE);

        info!(
            probe = %probe.target(),
            seeded_from = ?seed.map(|t| t.at.as_millis()),
            state = %last_known,
            "Sampler seeded"
        );

        Self {
            probe,
            store: Arc::clone(&ctx.store),
            relay: ctx.relay.clone(),
            poll_interval: ctx.config.poll_interval(),
            probe_timeout: ctx.config.probe_timeout(),
            last_known,
        }
    }

    /// Returns the last known reachability.
    pub fn last_known(&self) -> ReachState {
        self.last_known
    }

    /// Probes once and records the result at the current millisecond.
    pub async fn tick(&mut self) -> TickOutcome {
        let reachable = self.probe.probe(self.probe_timeout).await;
        self.record_sample(ReachState::from(reachable), Timestamp::now())
            .await
    }

    /// Applies one sample observed at `at`.
    pub async fn record_sample(&mut self, sample: ReachState, at: Timestamp) -> TickOutcome {
        if sample == self.last_known {
            return TickOutcome::Unchanged(sample);
        }

        let transition = Transition::new(at, sample);
        let persisted = self.persist(transition).await;
        let delivered = self.relay.notify(at);
        self.last_known = sample;

        info!(
            at = %at,
            state = %sample,
            persisted,
            delivered,
            "Connection state changed"
        );

        TickOutcome::Changed {
            transition,
            persisted,
            delivered,
        }
    }

    /// Appends on the blocking pool so a slow disk cannot stall the runtime.
    async fn persist(&self, transition: Transition) -> bool {
        let store = Arc::clone(&self.store);

        match tokio::task::spawn_blocking(move || store.append(transition)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(
                    at = %transition.at,
                    state = %transition.state,
                    error = %e,
                    "Failed to record transition"
                );
                false
            }
            Err(e) => {
                warn!(error = %e, "Transition write task failed");
                false
            }
        }
    }

    /// Samples every poll interval until `cancel` fires.
    ///
    /// Cancellation is observed between ticks; an in-flight probe is
    /// bounded by the probe timeout and always completes.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            probe = %self.probe.target(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            probe_timeout_ms = self.probe_timeout.as_millis() as u64,
            "Sampler started"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Sampler shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    let outcome = self.tick().await;
                    debug!(?outcome, "Sample taken");
                }
            }
        }

        debug!("Sampler task completed");
    }
}

/// Spawns the sampler on its own task, stopping on `ctx.cancel`.
pub fn spawn_sampler<P: Probe, S: TransitionStore>(probe: P, ctx: &Context<S>) -> JoinHandle<()> {
    let sampler = Sampler::new(probe, ctx);
    tokio::spawn(sampler.run(ctx.cancel.clone()))
}
