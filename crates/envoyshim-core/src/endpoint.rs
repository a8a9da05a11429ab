use std::borrow::Borrow;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::RegistryError;

/// Transport semantics the sidecar should apply in front of an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    #[default]
    Http,
    Tcp,
}

impl ProxyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyMode::Http => "http",
            ProxyMode::Tcp => "tcp",
        }
    }
}

impl fmt::Display for ProxyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxyMode {
    type Err = RegistryError;

    /// An empty mode means the container carried no label, which is `http`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "http" => Ok(ProxyMode::Http),
            "tcp" => Ok(ProxyMode::Tcp),
            _ => Err(RegistryError::InvalidProxyMode(s.to_string())),
        }
    }
}

/// Stands in for a missing service or environment label.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Canonical service key: `{service}-{environment}-{frontend_port}`.
///
/// Used both as the registry's map key and as the public cluster/service
/// name handed to the proxy, so two entries sharing it replace each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ServiceKey(String);

impl ServiceKey {
    /// Containers without labels still get a readable key: an empty service
    /// or environment becomes `unknown`.
    pub fn new(service_name: &str, environment_name: &str, frontend_port: u16) -> Self {
        let service = label_or_unknown(service_name);
        let environment = label_or_unknown(environment_name);
        Self(format!("{service}-{environment}-{frontend_port}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn label_or_unknown(label: &str) -> &str {
    if label.trim().is_empty() {
        UNKNOWN_LABEL
    } else {
        label
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ServiceKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One registered frontend → backend mapping plus its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointEntry {
    /// Address the proxy listens on
    pub frontend: SocketAddr,
    /// The container's real address
    pub backend: SocketAddr,
    pub service_name: String,
    pub environment_name: String,
    pub proxy_mode: ProxyMode,
}

impl EndpointEntry {
    pub fn new(
        frontend: SocketAddr,
        backend: SocketAddr,
        service_name: impl Into<String>,
        environment_name: impl Into<String>,
        proxy_mode: ProxyMode,
    ) -> Self {
        Self {
            frontend,
            backend,
            service_name: service_name.into(),
            environment_name: environment_name.into(),
            proxy_mode,
        }
    }

    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(&self.service_name, &self.environment_name, self.frontend.port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_joins_service_environment_and_port() {
        let key = ServiceKey::new("alpha", "dev", 8080);
        assert_eq!(key.as_str(), "alpha-dev-8080");
        assert_eq!(key.to_string(), "alpha-dev-8080");
    }

    #[test]
    fn empty_labels_key_as_unknown() {
        assert_eq!(ServiceKey::new("", "", 8080).as_str(), "unknown-unknown-8080");
        assert_eq!(ServiceKey::new("web", " ", 8080).as_str(), "web-unknown-8080");
        assert_eq!(ServiceKey::new("", "prod", 443).as_str(), "unknown-prod-443");
    }

    #[test]
    fn entry_key_ignores_backend() {
        let a = EndpointEntry::new(
            "192.168.1.10:8080".parse().unwrap(),
            "10.0.0.1:80".parse().unwrap(),
            "alpha",
            "dev",
            ProxyMode::Http,
        );
        let mut b = a.clone();
        b.backend = "10.0.0.2:9090".parse().unwrap();
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn proxy_mode_parsing() {
        assert_eq!("".parse::<ProxyMode>().unwrap(), ProxyMode::Http);
        assert_eq!("HTTP".parse::<ProxyMode>().unwrap(), ProxyMode::Http);
        assert_eq!("tcp".parse::<ProxyMode>().unwrap(), ProxyMode::Tcp);
        assert!(matches!(
            "grpc".parse::<ProxyMode>(),
            Err(RegistryError::InvalidProxyMode(m)) if m == "grpc"
        ));
    }
}
