//! Read-through status queries over the transition log.
//!
//! Callers never see store errors: a failed read is logged and reported
//! as "not found", the same as a missing key.

use std::sync::Arc;

use tracing::warn;

use netwatch_core::{ReachState, Timestamp, Transition};

use crate::store::TransitionStore;

/// Thin read API used by the sampler (seeding) and sessions (fallback).
pub struct StatusQuery<S> {
    store: Arc<S>,
}

impl<S> Clone for StatusQuery<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: TransitionStore> StatusQuery<S> {
    /// Creates a query service over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// State recorded at exactly `at`.
    pub fn get(&self, at: Timestamp) -> Option<ReachState> {
        match self.store.get(at) {
            Ok(state) => state,
            Err(e) => {
                warn!(at = %at, error = %e, "Status lookup failed");
                None
            }
        }
    }

    /// Most recent transition, or `None` if nothing was ever recorded.
    pub fn latest(&self) -> Option<Transition> {
        match self.store.latest() {
            Ok(latest) => latest,
            Err(e) => {
                warn!(error = %e, "Latest status lookup failed");
                None
            }
        }
    }

    /// The transition at exactly `at`, falling back to [`Self::latest`]
    /// when there is no such record.
    pub fn resolve(&self, at: Timestamp) -> Option<Transition> {
        match self.get(at) {
            Some(state) => Some(Transition::new(at, state)),
            None => self.latest(),
        }
    }
}
