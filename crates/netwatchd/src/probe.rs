//! Reachability probes.
//!
//! A probe answers a single question: did the host respond within the
//! timeout? Failures of any kind (unreachable, timeout, spawn error) are
//! reported as `false`. Only constructing a probe can fail.
//!
//! - [`PingProbe`] sends one ICMP echo request via the system `ping`
//! - [`TcpProbe`] attempts one TCP connect to `host:port`

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::config::{Config, ProbeKind};

/// Name of the system ping utility.
const PING_PROGRAM: &str = "ping";

/// Binary up/down check against a single host.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    /// Makes exactly one attempt. Must return within `limit`.
    async fn probe(&self, limit: Duration) -> bool;

    /// Human-readable description of what is probed.
    fn target(&self) -> String;
}

/// Errors that can occur while constructing a probe.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Invalid host {host:?}: {reason}")]
    InvalidHost { host: String, reason: &'static str },

    #[error("The `ping` utility was not found in PATH")]
    PingUnavailable,
}

/// Checks that `host` is a plausible hostname or IP literal.
///
/// Rejects anything that could be mistaken for a command-line flag.
pub fn validate_host(host: &str) -> Result<(), ProbeError> {
    let invalid = |reason| ProbeError::InvalidHost {
        host: host.to_string(),
        reason,
    };

    if host.is_empty() {
        return Err(invalid("host is empty"));
    }
    if host.starts_with('-') {
        return Err(invalid("host must not start with '-'"));
    }
    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '_' | '%'))
    {
        return Err(invalid("host contains invalid characters"));
    }
    Ok(())
}

/// Returns the path of the `ping` utility, if it is on `PATH`.
fn find_ping() -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(PING_PROGRAM))
        .find(|candidate| candidate.is_file())
}

// ============================================================================
// ICMP
// ============================================================================

/// One ICMP echo request per attempt, via the system `ping`.
#[derive(Debug, Clone)]
pub struct PingProbe {
    host: String,
    program: PathBuf,
}

impl PingProbe {
    /// Creates a probe for `host`.
    ///
    /// # Errors
    ///
    /// - `ProbeError::InvalidHost` if the host is malformed
    /// - `ProbeError::PingUnavailable` if `ping` is not installed
    pub fn new(host: impl Into<String>) -> Result<Self, ProbeError> {
        let host = host.into();
        validate_host(&host)?;
        let program = find_ping().ok_or(ProbeError::PingUnavailable)?;
        Ok(Self { host, program })
    }
}

#[async_trait]
impl Probe for PingProbe {
    async fn probe(&self, limit: Duration) -> bool {
        // iputils `-W` takes whole seconds
        let wait_secs = limit.as_secs().max(1).to_string();

        let mut cmd = Command::new(&self.program);
        cmd.args(["-n", "-q", "-c", "1", "-W", wait_secs.as_str(), self.host.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let up = match timeout(limit, cmd.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!(host = %self.host, error = %e, "Failed to run ping");
                false
            }
            Err(_) => false,
        };

        trace!(host = %self.host, up, "ICMP probe");
        up
    }

    fn target(&self) -> String {
        format!("icmp://{}", self.host)
    }
}

// ============================================================================
// TCP
// ============================================================================

/// One TCP connect per attempt. Needs no privileges.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
}

impl TcpProbe {
    /// Creates a probe for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, ProbeError> {
        let host = host.into();
        validate_host(&host)?;
        Ok(Self { host, port })
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn probe(&self, limit: Duration) -> bool {
        // Name resolution happens inside connect, so the timeout covers it
        let up = matches!(
            timeout(limit, TcpStream::connect((self.host.as_str(), self.port))).await,
            Ok(Ok(_))
        );

        trace!(host = %self.host, port = self.port, up, "TCP probe");
        up
    }

    fn target(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Configured probe
// ============================================================================

/// The probe selected by configuration.
#[derive(Debug, Clone)]
pub enum HostProbe {
    Icmp(PingProbe),
    Tcp(TcpProbe),
}

impl HostProbe {
    /// Builds the probe named by `config.probe`.
    pub fn from_config(config: &Config) -> Result<Self, ProbeError> {
        match config.probe {
            ProbeKind::Icmp => PingProbe::new(config.host.clone()).map(Self::Icmp),
            ProbeKind::Tcp => TcpProbe::new(config.host.clone(), config.tcp_port).map(Self::Tcp),
        }
    }
}

#[async_trait]
impl Probe for HostProbe {
    async fn probe(&self, limit: Duration) -> bool {
        match self {
            Self::Icmp(p) => p.probe(limit).await,
            Self::Tcp(p) => p.probe(limit).await,
        }
    }

    fn target(&self) -> String {
        match self {
            Self::Icmp(p) => p.target(),
            Self::Tcp(p) => p.target(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_validate_host() {
        assert!(validate_host("8.8.8.8").is_ok());
        assert!(validate_host("example.com").is_ok());
        assert!(validate_host("::1").is_ok());
        assert!(validate_host("fe80::1%eth0").is_ok());

        assert!(validate_host("").is_err());
        assert!(validate_host("-c1000").is_err());
        assert!(validate_host("host name").is_err());
        assert!(validate_host("a;rm").is_err());
    }

    #[test]
    fn test_invalid_host_error_mentions_host() {
        let err = TcpProbe::new("bad host", 80).unwrap_err();
        assert!(err.to_string().contains("bad host"));
    }

    #[tokio::test]
    async fn test_tcp_probe_open_port_is_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpProbe::new("127.0.0.1", port).unwrap();
        assert!(probe.probe(Duration::from_secs(1)).await);
        assert_eq!(probe.target(), format!("tcp://127.0.0.1:{port}"));
    }

    #[tokio::test]
    async fn test_tcp_probe_closed_port_is_down() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let probe = TcpProbe::new("127.0.0.1", port).unwrap();
        assert!(!probe.probe(Duration::from_secs(1)).await);
    }

    #[test]
    fn test_host_probe_from_config_tcp() {
        let config = Config {
            probe: ProbeKind::Tcp,
            host: "localhost".to_string(),
            tcp_port: 8080,
            ..Config::default()
        };
        let probe = HostProbe::from_config(&config).unwrap();
        assert_eq!(probe.target(), "tcp://localhost:8080");
    }

    #[test]
    fn test_host_probe_from_config_rejects_bad_host() {
        let config = Config {
            host: "-f".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            HostProbe::from_config(&config),
            Err(ProbeError::InvalidHost { .. })
        ));
    }
}
