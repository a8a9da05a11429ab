use std::ffi::OsString;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use clap::Parser;
use envoyshim_wire::DEFAULT_SOCKET_PATH;

use crate::error::ShimError;

pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

/// Invoked by the container runtime in place of its own userland proxy.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "envoyshim",
    version,
    about = "Registers published container ports with the envoyshim registry"
)]
pub struct Cli {
    /// Proxy protocol: tcp or udp
    #[arg(long, default_value = "tcp")]
    pub proto: String,

    /// Host address the port is published on
    #[arg(long = "host-ip", default_value = "")]
    pub host_ip: String,

    #[arg(long = "host-port")]
    pub host_port: Option<u16>,

    /// Container address traffic should end up at
    #[arg(long = "container-ip", default_value = "")]
    pub container_ip: String,

    #[arg(long = "container-port")]
    pub container_port: Option<u16>,

    /// Register and exit without waiting for a stop signal
    #[arg(long)]
    pub reload: bool,

    /// Registration channel of the envoyshim server
    #[arg(long, env = "SHIM_SOCKET_PATH", default_value = DEFAULT_SOCKET_PATH)]
    pub socket: String,

    /// Docker Engine API endpoint
    #[arg(long = "docker-socket", env = "DOCKER_HOST", default_value = DEFAULT_DOCKER_HOST)]
    pub docker_socket: String,
}

impl Cli {
    pub fn transport(&self) -> Result<Transport, ShimError> {
        self.proto.parse()
    }

    pub fn frontend(&self) -> Result<SocketAddr, ShimError> {
        socket_addr("host-ip", &self.host_ip, "host-port", self.host_port)
    }

    pub fn backend(&self) -> Result<SocketAddr, ShimError> {
        socket_addr(
            "container-ip",
            &self.container_ip,
            "container-port",
            self.container_port,
        )
    }
}

fn socket_addr(
    ip_field: &'static str,
    ip: &str,
    port_field: &'static str,
    port: Option<u16>,
) -> Result<SocketAddr, ShimError> {
    let ip: IpAddr = ip.parse().map_err(|_| ShimError::InvalidAddress {
        field: ip_field,
        reason: format!("'{ip}' is not an IP address"),
    })?;
    let port = port.ok_or(ShimError::InvalidAddress {
        field: port_field,
        reason: "missing".to_string(),
    })?;
    Ok(SocketAddr::new(ip, port))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

impl FromStr for Transport {
    type Err = ShimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Transport::Tcp),
            "udp" => Ok(Transport::Udp),
            other => Err(ShimError::UnsupportedProtocol(other.to_string())),
        }
    }
}

/// The runtime passes long flags with a single dash (`-host-ip`).
/// Rewrites them to `--host-ip` so clap can read them, leaving short
/// flags and negative numbers alone.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args = args.into_iter();
    let mut out: Vec<OsString> = args.next().into_iter().collect();
    for arg in args {
        out.push(match arg.to_str() {
            Some(s) if is_single_dash_long(s) => OsString::from(format!("-{s}")),
            _ => arg,
        });
    }
    out
}

fn is_single_dash_long(arg: &str) -> bool {
    let mut chars = arg.chars();
    chars.next() == Some('-')
        && arg.len() > 2
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let args = std::iter::once("envoyshim")
            .chain(args.iter().copied())
            .map(OsString::from);
        Cli::try_parse_from(normalize_args(args)).unwrap()
    }

    #[test]
    fn runtime_style_flags() {
        let cli = parse(&[
            "-proto",
            "tcp",
            "-host-ip",
            "0.0.0.0",
            "-host-port",
            "8080",
            "-container-ip",
            "172.17.0.2",
            "-container-port=80",
        ]);
        assert_eq!(cli.transport().unwrap(), Transport::Tcp);
        assert_eq!(cli.frontend().unwrap(), "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cli.backend().unwrap(), "172.17.0.2:80".parse().unwrap());
        assert!(!cli.reload);
    }

    #[test]
    fn double_dash_and_reload() {
        let cli = parse(&[
            "--proto",
            "udp",
            "--host-ip",
            "::1",
            "--host-port",
            "53",
            "--container-ip",
            "172.17.0.3",
            "--container-port",
            "53",
            "-reload",
        ]);
        assert_eq!(cli.transport().unwrap(), Transport::Udp);
        assert_eq!(cli.frontend().unwrap(), "[::1]:53".parse().unwrap());
        assert!(cli.reload);
    }

    #[test]
    fn normalization_leaves_short_flags_and_values() {
        let out = normalize_args(
            ["envoyshim", "-h", "-1", "value", "--already", "-proto"]
                .into_iter()
                .map(OsString::from),
        );
        assert_eq!(
            out,
            vec!["envoyshim", "-h", "-1", "value", "--already", "--proto"]
                .into_iter()
                .map(OsString::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn unsupported_protocol() {
        let err = "sctp".parse::<Transport>().unwrap_err();
        assert_eq!(err.to_string(), "unsupported protocol sctp");
    }

    #[test]
    fn missing_or_bad_addresses() {
        let cli = parse(&["-host-ip", "nope", "-host-port", "1"]);
        assert!(matches!(
            cli.frontend(),
            Err(ShimError::InvalidAddress { field: "host-ip", .. })
        ));
        assert!(matches!(
            cli.backend(),
            Err(ShimError::InvalidAddress { field: "container-ip", .. })
        ));

        let cli = parse(&["-host-ip", "127.0.0.1"]);
        assert!(matches!(
            cli.frontend(),
            Err(ShimError::InvalidAddress { field: "host-port", .. })
        ));
    }
}
