//! Container-side half of envoyshim.
//!
//! The container runtime launches this binary once per published port, in
//! place of its userland proxy. TCP ports are registered with the envoyshim
//! server so Envoy can route to them; UDP ports are relayed locally.

pub mod cli;
pub mod docker;
pub mod envoy_proxy;
pub mod error;
pub mod parent;
pub mod proxy;
pub mod udp;

pub use cli::{Cli, Transport};
pub use docker::{ContainerDiscovery, ContainerFields, DockerClient};
pub use envoy_proxy::{ClientState, EnvoyProxy};
pub use error::ShimError;
pub use proxy::{Proxy, ProxyOptions};
