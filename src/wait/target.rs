//! The query interface a wait strategy uses to reach its target.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a [`StrategyTarget`].
///
/// The polling engine treats all of these as "not ready yet": a container
/// that has just been started may not have published its ports.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetError {
    /// A port identifier could not be parsed.
    #[error("Invalid port '{value}': {reason}")]
    InvalidPort {
        /// The rejected identifier.
        value: String,
        /// Reason for rejection.
        reason: String,
    },

    /// The port exists but has no externally reachable binding yet.
    #[error("Port {port} is not bound on the host")]
    NotBound {
        /// The internal port.
        port: Port,
    },

    /// The instance is not running.
    #[error("Target is not running: {reason}")]
    NotRunning {
        /// Reason reported by the runtime.
        reason: String,
    },

    /// The runtime could not be queried.
    #[error("Target unavailable: {reason}")]
    Unavailable {
        /// Reason for failure.
        reason: String,
    },
}

/// Transport protocol of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Tcp,
    Udp,
    Sctp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Sctp => "sctp",
        }
    }
}

/// A port declared inside the target, e.g. `3000/tcp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Port {
    pub number: u16,
    pub protocol: Protocol,
}

impl Port {
    /// A TCP port.
    pub fn tcp(number: u16) -> Self {
        Self {
            number,
            protocol: Protocol::Tcp,
        }
    }

    /// A UDP port.
    pub fn udp(number: u16) -> Self {
        Self {
            number,
            protocol: Protocol::Udp,
        }
    }
}

impl FromStr for Port {
    type Err = TargetError;

    /// Parses `3000/tcp`, `53/udp`, or a bare `3000` (tcp).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| TargetError::InvalidPort {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let (number, protocol) = match s.trim().split_once('/') {
            Some((number, protocol)) => (number, protocol),
            None => (s.trim(), "tcp"),
        };

        let number = number
            .parse::<u16>()
            .map_err(|_| invalid("port number must be between 0 and 65535"))?;
        if number == 0 {
            return Err(invalid("port number must be positive"));
        }

        let protocol = match protocol.to_ascii_lowercase().as_str() {
            "tcp" => Protocol::Tcp,
            "udp" => Protocol::Udp,
            "sctp" => Protocol::Sctp,
            _ => return Err(invalid("protocol must be tcp, udp or sctp")),
        };

        Ok(Self { number, protocol })
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.number, self.protocol.as_str())
    }
}

/// Externally reachable address of a target port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or IP address.
    pub host: String,
    /// Port on the host.
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port`, with IPv6 literals bracketed.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

/// Read-only access to a running instance.
///
/// Implementations must tolerate concurrent queries from independent
/// strategies and must never change the instance's state.
#[async_trait]
pub trait StrategyTarget: Send + Sync {
    /// Resolve the host address and published port for an internal port.
    async fn resolve_address(&self, port: &Port) -> Result<Endpoint, TargetError>;

    /// Ports the instance declares, in a stable order.
    async fn exposed_ports(&self) -> Result<Vec<Port>, TargetError>;
}

/// A target with a fixed host and port table.
///
/// Useful for services that are not managed through Docker, or whose
/// mappings are known up front.
#[derive(Debug, Clone)]
pub struct StaticTarget {
    host: String,
    ports: Vec<(Port, u16)>,
}

impl StaticTarget {
    /// Create a target on `host` with no ports.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ports: Vec::new(),
        }
    }

    /// Map an internal port to an external one. Mapping the same internal
    /// port twice replaces the earlier mapping.
    pub fn with_port(mut self, port: Port, external: u16) -> Self {
        match self.ports.iter_mut().find(|(p, _)| *p == port) {
            Some(entry) => entry.1 = external,
            None => self.ports.push((port, external)),
        }
        self
    }

    /// A target whose internal and external ports are identical.
    pub fn localhost(port: u16) -> Self {
        Self::new("localhost").with_port(Port::tcp(port), port)
    }
}

#[async_trait]
impl StrategyTarget for StaticTarget {
    async fn resolve_address(&self, port: &Port) -> Result<Endpoint, TargetError> {
        self.ports
            .iter()
            .find(|(p, _)| p == port)
            .map(|(_, external)| Endpoint::new(self.host.clone(), *external))
            .ok_or(TargetError::NotBound { port: *port })
    }

    async fn exposed_ports(&self) -> Result<Vec<Port>, TargetError> {
        Ok(self.ports.iter().map(|(p, _)| *p).collect())
    }
}
