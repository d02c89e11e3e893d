//! Non-blocking handoff of transition notifications to live sessions.
//!
//! A session that wants the next notification calls [`Relay::wait`],
//! which parks a one-shot slot in the relay. The sampler calls
//! [`Relay::notify`], which hands the timestamp to whoever is parked
//! *right now* and returns immediately. Nobody parked means the
//! notification is dropped; the record is already in the log and every
//! session catches up on its next heartbeat.
//!
//! In [`DeliveryMode::Single`] at most one parked session receives each
//! notification (oldest first). [`DeliveryMode::Fanout`] hands it to
//! every parked session instead.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::trace;

use netwatch_core::Timestamp;

/// How many parked sessions receive each notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// At most one waiter per notification
    #[default]
    Single,

    /// Every waiter parked at notification time
    Fanout,
}

/// Cheap-to-clone handle to the shared relay slot.
#[derive(Clone)]
pub struct Relay {
    waiters: Arc<Mutex<VecDeque<oneshot::Sender<Timestamp>>>>,
    mode: DeliveryMode,
}

impl Relay {
    /// Creates a relay with the given delivery mode.
    pub fn new(mode: DeliveryMode) -> Self {
        Self {
            waiters: Arc::new(Mutex::new(VecDeque::new())),
            mode,
        }
    }

    /// Hands `at` to parked waiters without ever waiting.
    ///
    /// Returns how many sessions received it (0 means dropped).
    pub fn notify(&self, at: Timestamp) -> usize {
        let mut waiters = self.lock();
        let mut delivered = 0;

        while let Some(slot) = waiters.pop_front() {
            // A closed slot belongs to a session that stopped waiting
            if slot.send(at).is_ok() {
                delivered += 1;
                if self.mode == DeliveryMode::Single {
                    break;
                }
            }
        }

        trace!(at = %at, delivered, "Relay notify");
        delivered
    }

    /// Parks a slot for the next notification.
    ///
    /// The slot is registered when this is called, not when the returned
    /// future is first polled. Dropping the future gives the slot up.
    pub fn wait(&self) -> Notification {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.lock();
        waiters.retain(|slot| !slot.is_closed());
        waiters.push_back(tx);
        Notification { rx }
    }

    /// Number of sessions currently parked.
    pub fn waiting(&self) -> usize {
        self.lock().iter().filter(|slot| !slot.is_closed()).count()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<oneshot::Sender<Timestamp>>> {
        // The queue holds no invariant a panicking holder could break
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(DeliveryMode::default())
    }
}

/// A parked slot; resolves to the announced timestamp.
///
/// Resolves to `None` only if every relay handle has been dropped.
pub struct Notification {
    rx: oneshot::Receiver<Timestamp>,
}

impl Future for Notification {
    type Output = Option<Timestamp>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(Result::ok)
    }
}
