//! Wiring shared by the sampler and the server.
//!
//! Built once at startup and handed to each task's constructor. It lives
//! from process start until the cancellation token fires.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::relay::Relay;
use crate::status::StatusQuery;
use crate::store::TransitionStore;

/// Handles every long-lived task needs.
pub struct Context<S> {
    /// Validated configuration
    pub config: Arc<Config>,

    /// Transition log (sampler writes, everyone reads)
    pub store: Arc<S>,

    /// Sampler -> session notification handoff
    pub relay: Relay,

    /// Process-wide shutdown signal
    pub cancel: CancellationToken,
}

impl<S> Clone for Context<S> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            store: Arc::clone(&self.store),
            relay: self.relay.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<S: TransitionStore> Context<S> {
    /// Creates the context, building the relay from `config.delivery`.
    pub fn new(config: Config, store: S, cancel: CancellationToken) -> Self {
        let relay = Relay::new(config.delivery);
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            relay,
            cancel,
        }
    }

    /// Read API over the transition log.
    pub fn status(&self) -> StatusQuery<S> {
        StatusQuery::new(Arc::clone(&self.store))
    }
}
