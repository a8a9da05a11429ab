use std::net::SocketAddr;
use std::sync::Arc;

use envoyshim_wire::RegistrarClient;
use tokio_util::sync::CancellationToken;

use crate::cli::Transport;
use crate::docker::ContainerDiscovery;
use crate::envoy_proxy::EnvoyProxy;
use crate::error::ShimError;
use crate::udp::UdpRelay;

/// What the runtime asked for, resolved to the thing that serves it.
pub enum Proxy {
    Udp(UdpRelay),
    Envoy(EnvoyProxy),
}

/// Everything needed to build a proxy besides the addresses.
pub struct ProxyOptions {
    pub reload: bool,
    pub client: RegistrarClient,
    pub discovery: Arc<dyn ContainerDiscovery>,
}

impl Proxy {
    /// TCP mappings are registered with the envoyshim server, UDP is
    /// relayed locally. Reload only makes sense for registrations.
    pub async fn new(
        transport: Transport,
        frontend: SocketAddr,
        backend: SocketAddr,
        options: ProxyOptions,
    ) -> Result<Self, ShimError> {
        match transport {
            Transport::Udp if options.reload => Err(ShimError::Config(
                "reload is only supported for tcp".to_string(),
            )),
            Transport::Udp => Ok(Proxy::Udp(UdpRelay::bind(frontend, backend).await?)),
            Transport::Tcp => Ok(Proxy::Envoy(
                EnvoyProxy::new(frontend, backend, options.client, options.discovery)
                    .with_reload(options.reload),
            )),
        }
    }

    pub fn frontend_addr(&self) -> SocketAddr {
        match self {
            Proxy::Udp(relay) => relay.frontend_addr(),
            Proxy::Envoy(envoy) => envoy.frontend_addr(),
        }
    }

    pub fn backend_addr(&self) -> SocketAddr {
        match self {
            Proxy::Udp(relay) => relay.backend_addr(),
            Proxy::Envoy(envoy) => envoy.backend_addr(),
        }
    }

    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ShimError> {
        match self {
            Proxy::Udp(relay) => relay.run(shutdown).await,
            Proxy::Envoy(mut envoy) => envoy.run(shutdown).await,
        }
    }
}
