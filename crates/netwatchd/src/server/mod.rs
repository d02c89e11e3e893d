//! Unix socket server for the netwatch daemon.
//!
//! The server:
//! - Listens on a Unix socket for subscriber connections
//! - Spawns a SubscriberSession for each client
//! - Caps the number of concurrent sessions
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  StatusServer   │
//! │                 │
//! │  UnixListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌───────────────────┐     ┌─────────────────┐
//! │ SubscriberSession │◀────│      Relay      │
//! │   (per client)    │     │  (notify/wait)  │
//! └───────────────────┘     └─────────────────┘
//!         │
//!         │ status lines
//!         ▼
//! ┌─────────────────┐
//! │     Clients     │
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Per-connection errors are logged and allow continued operation

mod session;

pub use session::{SessionEnd, SessionError, SubscriberSession, MAX_MESSAGE_SIZE};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::store::TransitionStore;

/// Default socket path
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/netwatch.sock";

/// Unix socket server pushing status lines to subscribers.
pub struct StatusServer<S> {
    /// Path to the Unix socket
    socket_path: PathBuf,

    /// Shared daemon wiring
    ctx: Context<S>,

    /// Connection counter for generating client IDs
    connection_counter: AtomicU64,

    /// Number of live sessions
    active: Arc<AtomicUsize>,
}

impl<S: TransitionStore> StatusServer<S> {
    /// Creates a server listening on `ctx.config.socket_path`.
    pub fn new(ctx: Context<S>) -> Self {
        Self {
            socket_path: ctx.config.socket_path.clone(),
            ctx,
            connection_counter: AtomicU64::new(0),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Returns the number of live sessions.
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Runs the server.
    ///
    /// Listens for connections until the context's cancellation token is
    /// triggered. This method does not return until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        // Remove stale socket file left by a previous run
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| self.setup_error(e))?;
        }

        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| self.setup_error(e))?;
            }
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| self.setup_error(e))?;

        info!(
            socket = %self.socket_path.display(),
            max_subscribers = self.ctx.config.max_subscribers,
            "Status server listening"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.ctx.cancel.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        self.cleanup();
        Ok(())
    }

    /// Spawns a session for a new client, or turns it away at capacity.
    fn handle_connection(&self, stream: UnixStream, connection_number: u64) {
        let client_id = format!("subscriber-{connection_number}");
        let max = self.ctx.config.max_subscribers;

        let previous = self.active.fetch_add(1, Ordering::AcqRel);
        if previous >= max {
            self.active.fetch_sub(1, Ordering::AcqRel);
            warn!(client_id = %client_id, max, "Too many subscribers, dropping connection");
            return;
        }
        let guard = ActiveGuard(Arc::clone(&self.active));

        debug!(client_id = %client_id, active = previous + 1, "Subscriber connected");

        let (reader, writer) = stream.into_split();
        let session = SubscriberSession::new(client_id, &self.ctx, reader, writer);
        let cancel = self.ctx.cancel.clone();

        tokio::spawn(async move {
            let _guard = guard;
            session.run(cancel).await;
        });
    }

    fn setup_error(&self, e: std::io::Error) -> ServerError {
        ServerError::SocketSetup {
            path: self.socket_path.clone(),
            error: e.to_string(),
        }
    }

    /// Removes the socket file.
    fn cleanup(&self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(
                    socket = %self.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            }
        }

        info!("Server cleanup complete");
    }
}

/// Decrements the live-session count when a session task ends.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to setup socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },
}
