//! Connectivity probes used by the database check.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

/// Why a probe failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("invalid target '{0}'")]
    InvalidTarget(String),

    #[error("{target} unreachable: {reason}")]
    Unreachable { target: String, reason: String },

    #[error("{target} did not answer within {timeout_ms}ms")]
    Timeout { target: String, timeout_ms: u64 },
}

/// Checks whether an endpoint accepts connections.
///
/// A single attempt; callers wrap it in a retry policy.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    fn name(&self) -> &str;

    async fn probe(&self, target: &str) -> Result<(), ProbeError>;
}

/// Opens a TCP connection to `host[:port]`.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    default_port: u16,
    connect_timeout: Duration,
}

impl TcpProbe {
    pub const DEFAULT_PORT: u16 = 5432;

    pub fn new() -> Self {
        Self {
            default_port: Self::DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Split `target` into host and port, falling back to the default port.
    ///
    /// IPv6 literals are accepted bare (`::1`, always the default port) or
    /// bracketed (`[::1]:5433`); the brackets are stripped.
    pub fn address(&self, target: &str) -> Result<(String, u16), ProbeError> {
        let target = target.trim();
        let invalid = || ProbeError::InvalidTarget(target.to_string());
        if target.is_empty() {
            return Err(invalid());
        }

        if let Some(rest) = target.strip_prefix('[') {
            let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
            if host.is_empty() {
                return Err(invalid());
            }
            let port = match after {
                "" => self.default_port,
                _ => after
                    .strip_prefix(':')
                    .and_then(|p| p.parse::<u16>().ok())
                    .ok_or_else(invalid)?,
            };
            return Ok((host.to_string(), port));
        }

        match target.rsplit_once(':') {
            // More than one colon: an unbracketed IPv6 address
            Some((host, _)) if host.contains(':') => Ok((target.to_string(), self.default_port)),
            Some((host, port)) if !host.is_empty() => {
                let port = port.parse::<u16>().map_err(|_| invalid())?;
                Ok((host.to_string(), port))
            }
            Some(_) => Err(invalid()),
            None => Ok((target.to_string(), self.default_port)),
        }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectivityProbe for TcpProbe {
    fn name(&self) -> &str {
        "tcp"
    }

    async fn probe(&self, target: &str) -> Result<(), ProbeError> {
        let (host, port) = self.address(target)?;
        debug!("TCP probe {}:{}", host, port);

        match tokio::time::timeout(self.connect_timeout, TcpStream::connect((host.as_str(), port))).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(ProbeError::Unreachable {
                target: target.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(ProbeError::Timeout {
                target: target.to_string(),
                timeout_ms: self.connect_timeout.as_millis() as u64,
            }),
        }
    }
}

/// Probe with a fixed answer, for dry runs.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    failure: Option<String>,
}

impl StaticProbe {
    pub fn reachable() -> Self {
        Self { failure: None }
    }

    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
        }
    }
}

#[async_trait]
impl ConnectivityProbe for StaticProbe {
    fn name(&self) -> &str {
        "static"
    }

    async fn probe(&self, target: &str) -> Result<(), ProbeError> {
        match &self.failure {
            None => Ok(()),
            Some(reason) => Err(ProbeError::Unreachable {
                target: target.to_string(),
                reason: reason.clone(),
            }),
        }
    }
}
