use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

pub const DEFAULT_LISTEN_ADDR: &str = "unix:///tmp/docker-envoy.sock";
pub const DEFAULT_API_ADDR: &str = "0.0.0.0:7776";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Registration channel socket
    pub socket_path: PathBuf,
    /// Discovery API listener
    pub api_addr: SocketAddr,
}

impl Config {
    /// Reads `SHIM_LISTEN_ADDR` and `SHIM_API_ADDR`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let listen = lookup("SHIM_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let api = lookup("SHIM_API_ADDR").unwrap_or_else(|| DEFAULT_API_ADDR.to_string());

        Ok(Self {
            socket_path: envoyshim_wire::socket_path(&listen),
            api_addr: parse_api_addr(&api)?,
        })
    }
}

/// `:7776` binds every interface.
fn parse_api_addr(value: &str) -> anyhow::Result<SocketAddr> {
    let value = value.trim();
    let full = if value.starts_with(':') {
        format!("0.0.0.0{value}")
    } else {
        value.to_string()
    };
    full.parse()
        .with_context(|| format!("invalid SHIM_API_ADDR '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/docker-envoy.sock"));
        assert_eq!(config.api_addr, "0.0.0.0:7776".parse().unwrap());
    }

    #[test]
    fn bare_port_and_plain_path() {
        let config = Config::from_lookup(lookup(&[
            ("SHIM_LISTEN_ADDR", "/run/envoyshim.sock"),
            ("SHIM_API_ADDR", ":9901"),
        ]))
        .unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/run/envoyshim.sock"));
        assert_eq!(config.api_addr.port(), 9901);
    }

    #[test]
    fn rejects_garbage_api_addr() {
        let err = Config::from_lookup(lookup(&[("SHIM_API_ADDR", "localhost")])).unwrap_err();
        assert!(err.to_string().contains("SHIM_API_ADDR"));
    }
}
