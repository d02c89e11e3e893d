//! netwatch - command-line client for the netwatch daemon
//!
//! Connects to the daemon's Unix socket and prints what it pushes.
//!
//! # Usage
//!
//! ```text
//! netwatch             # Same as `netwatch watch`
//! netwatch watch       # Print status lines as they arrive
//! netwatch history     # Print every recorded transition and exit
//! ```
//!
//! `history` needs the daemon started with `--history-on-init`.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::{timeout_at, Instant};

use netwatch_protocol::{is_history_frame, HistoryPayload, PushFrame, INIT_REQUEST};
use netwatchd::server::DEFAULT_SOCKET_PATH;

/// How long `history` waits for the daemon's reply
const HISTORY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// CLI Arguments
// ============================================================================

/// netwatch - follow network reachability reported by netwatchd
#[derive(Parser, Debug)]
#[command(name = "netwatch")]
#[command(about = "Follow network up/down transitions in real time")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Daemon socket (default: $NETWATCH_SOCKET or /tmp/netwatch.sock)
    #[arg(long, short = 's', global = true)]
    socket: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print status lines as the daemon pushes them
    Watch,
    /// Print the full transition history
    History,
}

// ============================================================================
// Commands
// ============================================================================

async fn connect(socket: &Path) -> Result<UnixStream> {
    UnixStream::connect(socket).await.with_context(|| {
        format!(
            "Failed to connect to {} (is netwatchd running?)",
            socket.display()
        )
    })
}

async fn watch(socket: &Path) -> Result<()> {
    let stream = connect(socket).await?;
    let mut lines = BufReader::new(stream).lines();

    while let Some(line) = lines.next_line().await? {
        println!("{line}");
    }

    eprintln!("Daemon closed the connection.");
    Ok(())
}

async fn history(socket: &Path) -> Result<()> {
    let stream = connect(socket).await?;
    let (reader, mut writer) = stream.into_split();

    writer.write_all(INIT_REQUEST.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    // A transition or heartbeat may be pushed ahead of the reply
    let deadline = Instant::now() + HISTORY_TIMEOUT;
    let mut lines = BufReader::new(reader).lines();
    let reply = loop {
        match timeout_at(deadline, lines.next_line()).await {
            Ok(Ok(Some(line))) if is_history_frame(&line) => break line,
            Ok(Ok(Some(_status))) => continue,
            Ok(Ok(None)) => bail!("Daemon closed the connection without replying"),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => bail!("No history reply; start netwatchd with --history-on-init"),
        }
    };

    let payload = HistoryPayload::from_json(&reply)
        .with_context(|| format!("Unexpected reply from daemon: {reply}"))?;

    if payload.is_empty() {
        println!("No connection transitions have been recorded yet.");
        return Ok(());
    }

    for transition in payload.to_transitions()? {
        println!("{}", PushFrame::Status(transition).render());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let socket = args
        .socket
        .or_else(|| env::var_os("NETWATCH_SOCKET").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH));

    match args.command.unwrap_or(Command::Watch) {
        Command::Watch => watch(&socket).await,
        Command::History => history(&socket).await,
    }
}
