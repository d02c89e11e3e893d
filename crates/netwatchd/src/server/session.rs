//! Per-client subscriber session.
//!
//! Each connected client gets one `SubscriberSession` that loops over a
//! race between:
//! - a notification from the relay (a transition just happened)
//! - the heartbeat interval elapsing
//! - a line from the client (EOF ends the session; `init` may ask for
//!   history when enabled)
//!
//! A notification or heartbeat pushes exactly one status frame. Other
//! client lines are ignored.
//! A failed or timed-out write ends the session; the client reconnects.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Transport errors end the session instead of propagating

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use netwatch_core::Timestamp;
use netwatch_protocol::{is_init_request, HistoryPayload, PushFrame};

use crate::context::Context;
use crate::relay::Relay;
use crate::status::StatusQuery;
use crate::store::TransitionStore;

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum client line size (1 MB)
pub const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// What woke the session up.
#[derive(Debug)]
enum Trigger {
    Notified(Timestamp),
    Heartbeat,
    Request(String),
}

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// Client closed its side of the connection
    ClientClosed,

    /// Pushing a frame failed; the connection is presumed dead
    WriteFailed(SessionError),

    /// Client sent something the session will not buffer
    BadRequest(SessionError),

    /// Daemon is shutting down
    Shutdown,
}

/// One long-lived client connection.
pub struct SubscriberSession<S, R, W> {
    client_id: String,
    store: Arc<S>,
    status: StatusQuery<S>,
    relay: Relay,
    reader: BufReader<R>,
    pending: Vec<u8>,
    writer: BufWriter<W>,
    heartbeat_interval: Duration,
    history_on_init: bool,
}

impl<S, R, W> SubscriberSession<S, R, W>
where
    S: TransitionStore,
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a session over a split connection.
    ///
    /// # Arguments
    ///
    /// * `client_id` - Name used in logs
    /// * `ctx` - Shared daemon context (store, relay, settings)
    /// * `reader` - Read half of the client stream
    /// * `writer` - Write half of the client stream
    pub fn new(client_id: impl Into<String>, ctx: &Context<S>, reader: R, writer: W) -> Self {
        Self {
            client_id: client_id.into(),
            store: Arc::clone(&ctx.store),
            status: ctx.status(),
            relay: ctx.relay.clone(),
            reader: BufReader::new(reader),
            pending: Vec::new(),
            writer: BufWriter::new(writer),
            heartbeat_interval: ctx.config.heartbeat_interval(),
            history_on_init: ctx.config.history_on_init,
        }
    }

    /// Runs until the client goes away, a write fails, or `cancel` fires.
    ///
    /// Nothing is sent on connect; the first frame is the first
    /// transition or heartbeat.
    pub async fn run(mut self, cancel: CancellationToken) -> SessionEnd {
        let period = self.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(client_id = %self.client_id, "Subscriber session started");

        let end = loop {
            let trigger = tokio::select! {
                biased;

                _ = cancel.cancelled() => break SessionEnd::Shutdown,

                // `None` only if the relay is gone; that disables this branch
                Some(at) = self.relay.wait() => Trigger::Notified(at),

                _ = heartbeat.tick() => Trigger::Heartbeat,

                read = read_request(&mut self.reader, &mut self.pending) => match read {
                    Ok(Some(line)) => Trigger::Request(line),
                    Ok(None) => break SessionEnd::ClientClosed,
                    Err(e @ SessionError::MessageTooLarge { .. }) => {
                        warn!(client_id = %self.client_id, error = %e, "Client line too large");
                        break SessionEnd::BadRequest(e);
                    }
                    Err(e) => {
                        debug!(client_id = %self.client_id, error = %e, "Read failed");
                        break SessionEnd::ClientClosed;
                    }
                },
            };

            if let Err(e) = self.handle(trigger).await {
                break SessionEnd::WriteFailed(e);
            }
        };

        info!(client_id = %self.client_id, reason = ?end, "Subscriber session ended");
        end
    }

    async fn handle(&mut self, trigger: Trigger) -> Result<(), SessionError> {
        match trigger {
            Trigger::Notified(at) => {
                debug!(client_id = %self.client_id, at = %at, "Pushing transition");
                let frame = self.resolve_frame(Some(at));
                self.send_line(&frame.render()).await
            }
            Trigger::Heartbeat => {
                debug!(client_id = %self.client_id, "Pushing heartbeat");
                let frame = self.resolve_frame(None);
                self.send_line(&frame.render()).await
            }
            Trigger::Request(line) if self.history_on_init && is_init_request(&line) => {
                self.send_history().await
            }
            Trigger::Request(line) => {
                debug!(client_id = %self.client_id, request = %line, "Ignoring client message");
                Ok(())
            }
        }
    }

    /// Exact record for a notification, otherwise the latest record.
    fn resolve_frame(&self, announced: Option<Timestamp>) -> PushFrame {
        let found = match announced {
            Some(at) => self.status.resolve(at),
            None => self.status.latest(),
        };
        match found {
            Some(transition) => PushFrame::Status(transition),
            None => PushFrame::NoHistory {
                at: Timestamp::now(),
            },
        }
    }

    /// Sends every recorded transition as one JSON line.
    async fn send_history(&mut self) -> Result<(), SessionError> {
        let mut transitions = Vec::new();
        for record in self.store.all() {
            match record {
                Ok(transition) => transitions.push(transition),
                Err(e) => {
                    warn!(client_id = %self.client_id, error = %e, "History read failed");
                    break;
                }
            }
        }

        info!(
            client_id = %self.client_id,
            records = transitions.len(),
            "Sending history"
        );

        let payload = HistoryPayload::from_transitions(transitions);
        let json = payload
            .to_json()
            .map_err(|e| SessionError::Encode(e.to_string()))?;
        self.send_line(&json).await
    }

    /// Writes one newline-terminated frame.
    async fn send_line(&mut self, line: &str) -> Result<(), SessionError> {
        let writer = &mut self.writer;
        match timeout(WRITE_TIMEOUT, async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SessionError::Io(e.to_string())),
            Err(_) => Err(SessionError::WriteTimeout),
        }
    }
}

/// Reads one newline-terminated client line of at most
/// [`MAX_MESSAGE_SIZE`] bytes.
///
/// Cancel safe: bytes read before cancellation stay in `pending` and the
/// next call continues the same line. Returns `Ok(None)` on EOF.
async fn read_request<R>(
    reader: &mut BufReader<R>,
    pending: &mut Vec<u8>,
) -> Result<Option<String>, SessionError>
where
    R: AsyncRead + Unpin,
{
    loop {
        // One byte past the limit is enough to detect an oversized line
        let budget = (MAX_MESSAGE_SIZE + 1).saturating_sub(pending.len()) as u64;
        let n = (&mut *reader)
            .take(budget)
            .read_until(b'\n', pending)
            .await
            .map_err(|e| SessionError::Io(e.to_string()))?;

        if pending.last() == Some(&b'\n') {
            let line = String::from_utf8_lossy(pending).trim_end().to_string();
            pending.clear();
            return Ok(Some(line));
        }
        if pending.len() > MAX_MESSAGE_SIZE {
            let size = pending.len();
            pending.clear();
            return Err(SessionError::MessageTooLarge {
                size,
                max: MAX_MESSAGE_SIZE,
            });
        }
        if n == 0 {
            return Ok(None);
        }
    }
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Failed to encode frame: {0}")]
    Encode(String),

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::MemoryStore;
    use netwatch_core::{ReachState, Transition};
    use tokio::io::{duplex, DuplexStream, Lines, ReadHalf, WriteHalf};

    const HEARTBEAT: Duration = Duration::from_secs(300);

    type TestSession =
        SubscriberSession<MemoryStore, ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    fn context(store: MemoryStore, history_on_init: bool) -> Context<MemoryStore> {
        let config = Config {
            heartbeat_interval_secs: HEARTBEAT.as_secs(),
            history_on_init,
            ..Config::default()
        };
        Context::new(config, store, CancellationToken::new())
    }

    /// Returns the session and the client's end of the connection.
    fn session(ctx: &Context<MemoryStore>) -> (TestSession, DuplexStream) {
        let (client, server) = duplex(4096);
        let (reader, writer) = tokio::io::split(server);
        (SubscriberSession::new("test-client", ctx, reader, writer), client)
    }

    async fn read_frame(lines: &mut Lines<BufReader<DuplexStream>>) -> String {
        lines.next_line().await.unwrap().expect("frame")
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_gets_one_heartbeat_per_period() {
        let ctx = context(
            MemoryStore::with_transitions([Transition::new(
                Timestamp::from_secs(1_700_000_000),
                ReachState::Up,
            )]),
            false,
        );
        let (session, client) = session(&ctx);
        tokio::spawn(session.run(ctx.cancel.clone()));
        let mut lines = BufReader::new(client).lines();

        // Nothing before the period elapses
        assert!(timeout(HEARTBEAT - Duration::from_secs(1), lines.next_line())
            .await
            .is_err());

        let frame = timeout(Duration::from_secs(2), read_frame(&mut lines))
            .await
            .expect("heartbeat at period expiry");
        assert_eq!(
            frame,
            PushFrame::Status(Transition::new(
                Timestamp::from_secs(1_700_000_000),
                ReachState::Up
            ))
            .render()
        );

        // Exactly one: the next is a full period away
        assert!(timeout(HEARTBEAT - Duration::from_secs(2), lines.next_line())
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_on_empty_log_reports_no_history() {
        let ctx = context(MemoryStore::new(), false);
        let (session, client) = session(&ctx);
        tokio::spawn(session.run(ctx.cancel.clone()));
        let mut lines = BufReader::new(client).lines();

        let frame = read_frame(&mut lines).await;
        assert!(frame.ends_with("no connection transitions have been recorded yet."));
    }

    #[tokio::test]
    async fn test_notification_pushes_exact_record() {
        let down = Transition::new(Timestamp::from_secs(200), ReachState::Down);
        let ctx = context(
            MemoryStore::with_transitions([
                Transition::new(Timestamp::from_secs(100), ReachState::Up),
                down,
            ]),
            false,
        );
        let (session, client) = session(&ctx);
        tokio::spawn(session.run(ctx.cancel.clone()));
        let mut lines = BufReader::new(client).lines();

        wait_for_waiter(&ctx.relay).await;
        let older = Transition::new(Timestamp::from_secs(100), ReachState::Up);
        assert_eq!(ctx.relay.notify(older.at), 1);

        let frame = read_frame(&mut lines).await;
        assert_eq!(frame, PushFrame::Status(older).render());
        assert!(frame.ends_with("came up."));
    }

    #[tokio::test]
    async fn test_notification_miss_falls_back_to_latest() {
        let latest = Transition::new(Timestamp::from_secs(200), ReachState::Down);
        let ctx = context(MemoryStore::with_transitions([latest]), false);
        let (session, client) = session(&ctx);
        tokio::spawn(session.run(ctx.cancel.clone()));
        let mut lines = BufReader::new(client).lines();

        wait_for_waiter(&ctx.relay).await;
        ctx.relay.notify(Timestamp::from_secs(999));

        assert_eq!(read_frame(&mut lines).await, PushFrame::Status(latest).render());
    }

    #[tokio::test]
    async fn test_client_close_ends_session() {
        let ctx = context(MemoryStore::new(), false);
        let (session, client) = session(&ctx);
        let handle = tokio::spawn(session.run(ctx.cancel.clone()));

        drop(client);

        let end = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(matches!(
            end,
            SessionEnd::ClientClosed | SessionEnd::WriteFailed(_)
        ));
    }

    /// Writer whose peer has gone away.
    struct BrokenWriter;

    impl AsyncWrite for BrokenWriter {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::task::Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_write_failure_ends_session() {
        let ctx = context(MemoryStore::new(), false);
        // Keep the client end alive so reads stay pending
        let (_client, server) = duplex(64);
        let session = SubscriberSession::new("broken", &ctx, server, BrokenWriter);
        let handle = tokio::spawn(session.run(ctx.cancel.clone()));

        wait_for_waiter(&ctx.relay).await;
        ctx.relay.notify(Timestamp::from_secs(1));

        let end = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(matches!(end, SessionEnd::WriteFailed(SessionError::Io(_))));
    }

    #[tokio::test]
    async fn test_cancel_ends_session() {
        let ctx = context(MemoryStore::new(), false);
        let (session, _client) = session(&ctx);
        let handle = tokio::spawn(session.run(ctx.cancel.clone()));

        ctx.cancel.cancel();
        let end = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(matches!(end, SessionEnd::Shutdown));
    }

    #[tokio::test]
    async fn test_init_request_sends_history_when_enabled() {
        let ctx = context(
            MemoryStore::with_transitions([
                Transition::new(Timestamp::from_secs(1), ReachState::Up),
                Transition::new(Timestamp::from_secs(2), ReachState::Down),
            ]),
            true,
        );
        let (session, client) = session(&ctx);
        tokio::spawn(session.run(ctx.cancel.clone()));

        let (client_reader, mut client_writer) = tokio::io::split(client);
        client_writer.write_all(b"init\n").await.unwrap();

        let mut lines = BufReader::new(client_reader).lines();
        let frame = lines.next_line().await.unwrap().unwrap();
        assert_eq!(frame, r#"[["1000","2000"],["true","false"]]"#);
    }

    #[tokio::test]
    async fn test_init_request_ignored_when_disabled() {
        let ctx = context(
            MemoryStore::with_transitions([Transition::new(
                Timestamp::from_secs(1),
                ReachState::Up,
            )]),
            false,
        );
        let (session, client) = session(&ctx);
        tokio::spawn(session.run(ctx.cancel.clone()));

        let (client_reader, mut client_writer) = tokio::io::split(client);
        client_writer.write_all(b"init\n").await.unwrap();

        let mut lines = BufReader::new(client_reader).lines();
        assert!(timeout(Duration::from_millis(100), lines.next_line())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_oversized_client_line_ends_session() {
        let ctx = context(MemoryStore::new(), true);
        let (session, client) = session(&ctx);
        let handle = tokio::spawn(session.run(ctx.cancel.clone()));

        let (_client_reader, mut client_writer) = tokio::io::split(client);
        tokio::spawn(async move {
            // No newline: the session must not keep buffering
            let chunk = vec![b'x'; 64 * 1024];
            while client_writer.write_all(&chunk).await.is_ok() {}
        });

        let end = timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert!(matches!(
            end,
            SessionEnd::BadRequest(SessionError::MessageTooLarge { max: MAX_MESSAGE_SIZE, .. })
        ));
    }

    #[tokio::test]
    async fn test_read_request_resumes_partial_line() {
        let (mut client, server) = duplex(64);
        let mut reader = BufReader::new(server);
        let mut pending = Vec::new();

        client.write_all(b"in").await.unwrap();
        // Cancelled mid-line; the partial bytes are kept
        assert!(timeout(
            Duration::from_millis(50),
            read_request(&mut reader, &mut pending)
        )
        .await
        .is_err());
        assert_eq!(pending, b"in");

        client.write_all(b"it\nnext").await.unwrap();
        let line = read_request(&mut reader, &mut pending).await.unwrap();
        assert_eq!(line.as_deref(), Some("init"));

        drop(client);
        assert_eq!(read_request(&mut reader, &mut pending).await.unwrap(), None);
    }

    #[test]
    fn test_message_too_large_display() {
        let err = SessionError::MessageTooLarge {
            size: 2_000_000,
            max: MAX_MESSAGE_SIZE,
        };
        assert!(err.to_string().contains("2000000"));
    }

    /// Waits until the session has parked on the relay.
    async fn wait_for_waiter(relay: &Relay) {
        for _ in 0..100 {
            if relay.waiting() > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("session never waited on the relay");
    }
}
