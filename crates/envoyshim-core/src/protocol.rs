use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::endpoint::{EndpointEntry, ProxyMode, ServiceKey};
use crate::errors::RegistryError;

/// What a registration request asks the registrar to do.
///
/// Unrecognised or missing values decode as `Unknown` so the registrar can
/// answer them with an explicit failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum Action {
    #[default]
    Unknown,
    Register,
    Deregister,
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        match value.as_str() {
            "REGISTER" => Action::Register,
            "DEREGISTER" => Action::Deregister,
            _ => Action::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub frontend_addr: String,
    pub frontend_port: u16,
    pub backend_addr: String,
    pub backend_port: u16,
    pub service_name: String,
    pub environment_name: String,
    #[serde(default)]
    pub proxy_mode: String,
    #[serde(default)]
    pub action: Action,
}

impl RegistrationRequest {
    pub fn new(
        frontend: SocketAddr,
        backend: SocketAddr,
        service_name: impl Into<String>,
        environment_name: impl Into<String>,
        proxy_mode: impl Into<String>,
    ) -> Self {
        Self {
            frontend_addr: frontend.ip().to_string(),
            frontend_port: frontend.port(),
            backend_addr: backend.ip().to_string(),
            backend_port: backend.port(),
            service_name: service_name.into(),
            environment_name: environment_name.into(),
            proxy_mode: proxy_mode.into(),
            action: Action::Unknown,
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    /// Identity only depends on service, environment and frontend port, so a
    /// deregistration never needs valid addresses.
    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(&self.service_name, &self.environment_name, self.frontend_port)
    }

    pub fn to_entry(&self) -> Result<EndpointEntry, RegistryError> {
        let frontend_ip = parse_ip("frontend", &self.frontend_addr)?;
        let backend_ip = parse_ip("backend", &self.backend_addr)?;
        let proxy_mode: ProxyMode = self.proxy_mode.parse()?;

        Ok(EndpointEntry::new(
            SocketAddr::new(frontend_ip, self.frontend_port),
            SocketAddr::new(backend_ip, self.backend_port),
            self.service_name.clone(),
            self.environment_name.clone(),
            proxy_mode,
        ))
    }
}

fn parse_ip(field: &'static str, value: &str) -> Result<IpAddr, RegistryError> {
    value.trim().parse().map_err(|_| RegistryError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationReply {
    pub status_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RegistrationReply {
    pub const STATUS_OK: i32 = 1;
    pub const STATUS_FAILED: i32 = 0;

    pub fn ok() -> Self {
        Self {
            status_code: Self::STATUS_OK,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status_code: Self::STATUS_FAILED,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == Self::STATUS_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RegistrationRequest {
        RegistrationRequest::new(
            "192.168.1.10:8080".parse().unwrap(),
            "10.0.0.1:80".parse().unwrap(),
            "alpha",
            "dev",
            "",
        )
    }

    #[test]
    fn action_decodes_unknown_values() {
        let json = r#"{"frontend_addr":"1.2.3.4","frontend_port":1,"backend_addr":"1.2.3.4",
            "backend_port":2,"service_name":"a","environment_name":"b","action":"RESTART"}"#;
        let req: RegistrationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.action, Action::Unknown);
        assert_eq!(req.proxy_mode, "");

        let json = r#"{"frontend_addr":"1.2.3.4","frontend_port":1,"backend_addr":"1.2.3.4",
            "backend_port":2,"service_name":"a","environment_name":"b"}"#;
        let req: RegistrationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.action, Action::Unknown);
    }

    #[test]
    fn action_encodes_as_upper_case() {
        let req = request().with_action(Action::Deregister);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["action"], "DEREGISTER");
    }

    #[test]
    fn to_entry_defaults_mode_to_http() {
        let entry = request().to_entry().unwrap();
        assert_eq!(entry.proxy_mode, ProxyMode::Http);
        assert_eq!(entry.frontend, "192.168.1.10:8080".parse().unwrap());
        assert_eq!(entry.backend, "10.0.0.1:80".parse().unwrap());
        assert_eq!(entry.key(), request().key());
    }

    #[test]
    fn to_entry_rejects_bad_addresses() {
        let mut req = request();
        req.backend_addr = "not-an-ip".into();
        assert!(matches!(
            req.to_entry(),
            Err(RegistryError::InvalidAddress { field: "backend", .. })
        ));

        let mut req = request();
        req.frontend_addr = String::new();
        assert!(matches!(
            req.to_entry(),
            Err(RegistryError::InvalidAddress { field: "frontend", .. })
        ));
    }

    #[test]
    fn reply_omits_error_on_success() {
        let json = serde_json::to_string(&RegistrationReply::ok()).unwrap();
        assert_eq!(json, r#"{"status_code":1}"#);
        assert!(!RegistrationReply::failed("nope").is_success());
    }
}
