use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::ContainerSummary;
use bollard::{API_DEFAULT_VERSION, Docker};

use crate::error::ShimError;

pub const SERVICE_NAME_LABEL: &str = "ServiceName";
pub const ENVIRONMENT_NAME_LABEL: &str = "EnvironmentName";
pub const PROXY_MODE_LABEL: &str = "ProxyMode";

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// What a registration needs to know about the container behind a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerFields {
    pub service_name: String,
    pub environment_name: String,
    pub proxy_mode: String,
}

#[async_trait]
pub trait ContainerDiscovery: Send + Sync {
    /// Finds the container publishing `port` on the host.
    async fn container_fields_for_port(&self, port: u16) -> Result<ContainerFields, ShimError>;
}

/// Talks to the Docker Engine API over its Unix socket.
#[derive(Debug, Clone)]
pub struct DockerClient {
    socket: PathBuf,
}

impl DockerClient {
    /// Accepts `unix:///var/run/docker.sock` or a bare socket path.
    pub fn new(host: &str) -> Result<Self, ShimError> {
        if let Some(path) = host.strip_prefix("unix://") {
            return Ok(Self { socket: path.into() });
        }
        if host.contains("://") {
            return Err(ShimError::Config(format!(
                "unsupported docker host '{host}', only unix sockets are handled"
            )));
        }
        Ok(Self { socket: host.into() })
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, String> {
        let socket = self.socket.to_string_lossy();
        let docker = Docker::connect_with_unix(&socket, LOOKUP_TIMEOUT.as_secs(), API_DEFAULT_VERSION)
            .map_err(|e| format!("connect {socket}: {e}"))?;
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        docker
            .list_containers(Some(options))
            .await
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ContainerDiscovery for DockerClient {
    async fn container_fields_for_port(&self, port: u16) -> Result<ContainerFields, ShimError> {
        let lookup_failed = |reason: String| ShimError::Lookup { port, reason };

        let containers = tokio::time::timeout(LOOKUP_TIMEOUT, self.list_containers())
            .await
            .map_err(|_| lookup_failed("docker did not answer in time".to_string()))?
            .map_err(lookup_failed)?;
        tracing::debug!(count = containers.len(), port, "listed containers");

        fields_for_port(&containers, port)
            .ok_or_else(|| lookup_failed("no container publishes this port".to_string()))
    }
}

/// First container with `port` as a public port wins. A missing
/// `ProxyMode` label means http.
pub(crate) fn fields_for_port(containers: &[ContainerSummary], port: u16) -> Option<ContainerFields> {
    let container = containers.iter().find(|c| {
        c.ports
            .iter()
            .flatten()
            .any(|p| p.public_port == Some(port))
    })?;

    let label = |name: &str| {
        container
            .labels
            .as_ref()
            .and_then(|labels| labels.get(name))
            .cloned()
            .unwrap_or_default()
    };
    let mode = label(PROXY_MODE_LABEL).to_lowercase();

    Some(ContainerFields {
        service_name: label(SERVICE_NAME_LABEL),
        environment_name: label(ENVIRONMENT_NAME_LABEL),
        proxy_mode: if mode.is_empty() { "http".to_string() } else { mode },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"[
        {"Id": "a1", "Ports": [{"PrivatePort": 80, "Type": "tcp"}], "Labels": {}},
        {"Id": "b2", "Ports": null, "Labels": null},
        {"Id": "c3",
         "Ports": [{"IP": "0.0.0.0", "PrivatePort": 80, "PublicPort": 32768, "Type": "tcp"}],
         "Labels": {"ServiceName": "awesome-svc", "EnvironmentName": "dev", "ProxyMode": "TCP"}},
        {"Id": "d4",
         "Ports": [{"IP": "0.0.0.0", "PrivatePort": 8080, "PublicPort": 32769, "Type": "tcp"}],
         "Labels": {"ServiceName": "web", "EnvironmentName": "prod"}}
    ]"#;

    fn listing() -> Vec<ContainerSummary> {
        serde_json::from_str(LISTING).unwrap()
    }

    #[test]
    fn finds_container_by_public_port() {
        let containers = listing();
        assert_eq!(
            fields_for_port(&containers, 32768),
            Some(ContainerFields {
                service_name: "awesome-svc".into(),
                environment_name: "dev".into(),
                proxy_mode: "tcp".into(),
            })
        );
        assert_eq!(
            fields_for_port(&containers, 32769).unwrap().proxy_mode,
            "http"
        );
        assert_eq!(fields_for_port(&containers, 80), None);
    }

    #[test]
    fn unlabelled_container_has_empty_names() {
        let containers: Vec<ContainerSummary> = serde_json::from_str(
            r#"[{"Id": "e5", "Ports": [{"PrivatePort": 53, "PublicPort": 5353, "Type": "udp"}]}]"#,
        )
        .unwrap();
        let fields = fields_for_port(&containers, 5353).unwrap();
        assert!(fields.service_name.is_empty());
        assert!(fields.environment_name.is_empty());
        assert_eq!(fields.proxy_mode, "http");
    }

    #[test]
    fn docker_host_forms() {
        assert_eq!(
            DockerClient::new("unix:///var/run/docker.sock").unwrap().socket,
            PathBuf::from("/var/run/docker.sock")
        );
        assert_eq!(
            DockerClient::new("/tmp/docker.sock").unwrap().socket,
            PathBuf::from("/tmp/docker.sock")
        );
        assert!(DockerClient::new("tcp://127.0.0.1:2375").is_err());
    }

    #[tokio::test]
    async fn unreachable_docker_is_a_lookup_error() {
        let client = DockerClient::new("/nonexistent/docker.sock").unwrap();
        let err = client.container_fields_for_port(8080).await.unwrap_err();
        assert!(matches!(err, ShimError::Lookup { port: 8080, .. }));
    }
}
