//! Docker container as a wait strategy target.
//!
//! [`DockerTarget`] only ever inspects the container. Starting, stopping and
//! removing it is left to whoever created it.

use async_trait::async_trait;
use bollard::Docker;
use bollard::errors::Error as DockerError;
use bollard::models::{ContainerInspectResponse, PortMap};
use url::{Host, Url};

use crate::wait::{Endpoint, Port, StrategyTarget, TargetError};

const DEFAULT_HOST: &str = "localhost";

/// A running container reached through its published ports.
#[derive(Debug, Clone)]
pub struct DockerTarget {
    docker: Docker,
    container_id: String,
    host: String,
}

impl DockerTarget {
    /// Wrap an existing Docker handle. The host for published ports is taken
    /// from `DOCKER_HOST` when it names a remote daemon, else `localhost`.
    pub fn new(docker: Docker, container_id: impl Into<String>) -> Self {
        let docker_host = std::env::var("DOCKER_HOST").ok();
        Self {
            docker,
            container_id: container_id.into(),
            host: host_from_docker_url(docker_host.as_deref()),
        }
    }

    /// Connect to the local daemon and check that it answers.
    pub async fn connect(container_id: impl Into<String>) -> Result<Self, TargetError> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| TargetError::Unavailable {
                reason: format!("failed to connect to Docker: {e}"),
            })?;
        docker.ping().await.map_err(|e| TargetError::Unavailable {
            reason: format!("Docker daemon not responding: {e}"),
        })?;
        Ok(Self::new(docker, container_id))
    }

    /// Override the host published ports are reached on.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    async fn inspect(&self) -> Result<ContainerInspectResponse, TargetError> {
        self.docker
            .inspect_container(&self.container_id, None)
            .await
            .map_err(|e| match e {
                DockerError::DockerResponseServerError {
                    status_code: 404, ..
                } => TargetError::NotRunning {
                    reason: format!("container {} not found", self.container_id),
                },
                other => TargetError::Unavailable {
                    reason: other.to_string(),
                },
            })
    }
}

#[async_trait]
impl StrategyTarget for DockerTarget {
    async fn resolve_address(&self, port: &Port) -> Result<Endpoint, TargetError> {
        let info = self.inspect().await?;

        let state = info.state.unwrap_or_default();
        if state.running != Some(true) {
            return Err(TargetError::NotRunning {
                reason: state
                    .status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unknown state".to_string()),
            });
        }

        info.network_settings
            .and_then(|settings| settings.ports)
            .and_then(|ports| binding_endpoint(&ports, port, &self.host))
            .ok_or(TargetError::NotBound { port: *port })
    }

    async fn exposed_ports(&self) -> Result<Vec<Port>, TargetError> {
        let info = self.inspect().await?;
        let declared = info
            .config
            .and_then(|config| config.exposed_ports)
            .unwrap_or_default();

        let mut ports = declared
            .keys()
            .map(|key| key.parse::<Port>())
            .collect::<Result<Vec<_>, _>>()?;
        ports.sort();
        Ok(ports)
    }
}

/// Host address and published port for `port` in a container's port map.
///
/// Wildcard bindings are reached on `default_host`; a binding on a specific
/// address is used as is. IPv4 bindings win over IPv6 ones.
pub(crate) fn binding_endpoint(
    ports: &PortMap,
    port: &Port,
    default_host: &str,
) -> Option<Endpoint> {
    let bindings = ports.get(&port.to_string())?.as_ref()?;

    let mut ipv6 = None;
    for binding in bindings {
        let Some(host_port) = binding
            .host_port
            .as_deref()
            .and_then(|p| p.parse::<u16>().ok())
            .filter(|p| *p != 0)
        else {
            continue;
        };

        let ip = binding.host_ip.as_deref().unwrap_or("");
        let host = match ip {
            "" | "0.0.0.0" | "::" => default_host,
            ip => ip,
        };
        let endpoint = Endpoint::new(host, host_port);

        if ip.contains(':') {
            ipv6.get_or_insert(endpoint);
        } else {
            return Some(endpoint);
        }
    }
    ipv6
}

/// Host to reach published ports on, given the value of `DOCKER_HOST`.
///
/// Remote daemons (`tcp://`, `http://`, `https://`) publish ports on their
/// own address; unix sockets and named pipes publish on this machine.
pub(crate) fn host_from_docker_url(docker_host: Option<&str>) -> String {
    docker_host
        .and_then(|raw| Url::parse(raw).ok())
        .filter(|url| matches!(url.scheme(), "tcp" | "http" | "https"))
        .and_then(|url| {
            url.host().map(|host| match host {
                Host::Ipv6(addr) => addr.to_string(),
                other => other.to_string(),
            })
        })
        .unwrap_or_else(|| DEFAULT_HOST.to_string())
}
