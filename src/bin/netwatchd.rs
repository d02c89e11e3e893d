//! netwatch daemon - reachability sampler and status push server
//!
//! This binary probes a host at a fixed cadence, records every up/down
//! transition, and pushes status lines to clients on a Unix socket.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! netwatchd start
//!
//! # Start the daemon (background/daemonized) against a specific host
//! netwatchd start -d --host 1.1.1.1
//!
//! # Stop the daemon
//! netwatchd stop
//!
//! # Check daemon status
//! netwatchd status
//! ```

use std::env;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use netwatchd::config::{Config, ProbeKind};
use netwatchd::context::Context;
use netwatchd::probe::{HostProbe, Probe};
use netwatchd::sampler::spawn_sampler;
use netwatchd::server::StatusServer;
use netwatchd::store::RedbStore;

/// Environment variable overriding the socket path
const SOCKET_ENV: &str = "NETWATCH_SOCKET";

/// netwatch daemon - network reachability monitor
#[derive(Parser, Debug)]
#[command(name = "netwatchd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        #[command(flatten)]
        overrides: Overrides,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

/// Command-line settings applied on top of the config file.
#[derive(clap::Args, Debug, Default)]
struct Overrides {
    /// Config file (default: $XDG_CONFIG_HOME/netwatch/config.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to probe
    #[arg(long)]
    host: Option<String>,

    /// Probe backend (icmp or tcp)
    #[arg(long, value_parser = parse_probe_kind)]
    probe: Option<ProbeKind>,

    /// Transition log file
    #[arg(long)]
    db: Option<PathBuf>,

    /// Unix socket path
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Answer `init` requests with the full history
    #[arg(long)]
    history_on_init: bool,
}

fn parse_probe_kind(s: &str) -> Result<ProbeKind, String> {
    match s {
        "icmp" => Ok(ProbeKind::Icmp),
        "tcp" => Ok(ProbeKind::Tcp),
        other => Err(format!("unknown probe {other:?} (expected icmp or tcp)")),
    }
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("netwatch")
}

fn pid_file_path() -> PathBuf {
    state_dir().join("netwatchd.pid")
}

fn log_file_path() -> PathBuf {
    state_dir().join("netwatch.log")
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("netwatch").join("config.toml"))
}

/// Loads the config file (if any) and applies overrides.
fn load_config(overrides: &Overrides) -> Result<Config> {
    let mut config = match &overrides.config {
        Some(path) => Config::load(path)?,
        None => match default_config_path().filter(|p| p.exists()) {
            Some(path) => Config::load(&path)?,
            None => Config::default(),
        },
    };

    if let Some(host) = &overrides.host {
        config.host = host.clone();
    }
    if let Some(probe) = overrides.probe {
        config.probe = probe;
    }
    if let Some(db) = &overrides.db {
        config.database_path = db.clone();
    }
    if let Ok(socket) = env::var(SOCKET_ENV) {
        config.socket_path = PathBuf::from(socket);
    }
    if let Some(socket) = &overrides.socket {
        config.socket_path = socket.clone();
    }
    if overrides.history_on_init {
        config.history_on_init = true;
    }

    config.validate()?;
    Ok(config)
}

fn socket_path_for_status() -> PathBuf {
    env::var(SOCKET_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| Config::default().socket_path)
}

fn read_pid() -> Option<u32> {
    let path = pid_file_path();
    let mut file = File::open(&path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

fn is_process_running(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        remove_pid_file();
    }
    None
}

fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        overrides: Overrides::default(),
    });

    match command {
        Command::Start { daemon, overrides } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'netwatchd stop' to stop it first.");
                process::exit(1);
            }

            // Fail on a bad config before forking so the error reaches the terminal
            let config = load_config(&overrides)?;

            if daemon {
                daemonize()?;
            }

            write_pid()?;

            let result = run_daemon(config);

            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping daemon (PID {pid})...");
                stop_daemon(pid)?;

                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Daemon is running (PID {pid})");

                let socket_path = socket_path_for_status();
                if socket_path.exists() {
                    println!("Socket: {}", socket_path.display());
                }

                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
    }
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = File::create(&log_path).context("Failed to create log file for stderr")?;

    let daemonize = Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr);

    daemonize.start().context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_daemon(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("netwatchd=info".parse()?)
                .add_directive("netwatch_core=info".parse()?)
                .add_directive("netwatch_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "netwatch daemon starting"
    );

    // Probe and log are both required; there is nothing to serve without them
    let probe = HostProbe::from_config(&config).context("Failed to set up probe")?;
    let store = RedbStore::open(&config.database_path).with_context(|| {
        format!(
            "Failed to open transition log at {}",
            config.database_path.display()
        )
    })?;

    info!(
        probe = %probe.target(),
        database = %store.path().display(),
        "Transition log opened"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let ctx = Context::new(config, store, cancel_token);

    let sampler_handle = spawn_sampler(probe, &ctx);
    info!("Sampler started");

    let server = StatusServer::new(ctx.clone());

    info!(socket = %server.socket_path().display(), "Starting server");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        ctx.cancel.cancel();
        let _ = sampler_handle.await;
        return Err(e.into());
    }

    let _ = sampler_handle.await;

    info!("netwatch daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
