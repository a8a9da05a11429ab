use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use envoyshim_core::{Action, RegistrationRequest, RetryPolicy};
use envoyshim_wire::RegistrarClient;
use tokio_util::sync::CancellationToken;

use crate::docker::ContainerDiscovery;
use crate::error::ShimError;

/// The runtime starts the proxy before the container is fully up, so the
/// labels may not be visible yet.
pub const DEFAULT_STARTUP_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Starting,
    Registering,
    Running,
    Deregistering,
    Stopped,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientState::Starting => "starting",
            ClientState::Registering => "registering",
            ClientState::Running => "running",
            ClientState::Deregistering => "deregistering",
            ClientState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Stands in for a userland proxy: instead of moving bytes it tells the
/// registrar about the mapping, then takes it back on shutdown.
pub struct EnvoyProxy {
    frontend: SocketAddr,
    backend: SocketAddr,
    client: RegistrarClient,
    discovery: Arc<dyn ContainerDiscovery>,
    retries: RetryPolicy,
    grace: Duration,
    reload: bool,
    state: ClientState,
}

impl EnvoyProxy {
    pub fn new(
        frontend: SocketAddr,
        backend: SocketAddr,
        client: RegistrarClient,
        discovery: Arc<dyn ContainerDiscovery>,
    ) -> Self {
        Self {
            frontend,
            backend,
            client,
            discovery,
            retries: RetryPolicy::default(),
            grace: DEFAULT_STARTUP_GRACE,
            reload: false,
            state: ClientState::Starting,
        }
    }

    pub fn with_retries(mut self, retries: RetryPolicy) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Registers and returns without waiting for shutdown.
    pub fn with_reload(mut self, reload: bool) -> Self {
        self.reload = reload;
        self
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn frontend_addr(&self) -> SocketAddr {
        self.frontend
    }

    pub fn backend_addr(&self) -> SocketAddr {
        self.backend
    }

    /// Registers, waits for `shutdown`, deregisters. A cancellation that
    /// lands before registration finished still deregisters afterwards.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), ShimError> {
        self.transition(ClientState::Starting);
        tokio::time::sleep(self.grace).await;

        self.transition(ClientState::Registering);
        let request = self.build_request().await?;
        self.send(&request.clone().with_action(Action::Register))
            .await?;
        self.transition(ClientState::Running);

        if self.reload {
            self.transition(ClientState::Stopped);
            return Ok(());
        }

        shutdown.cancelled().await;
        self.close(request).await
    }

    async fn close(&mut self, request: RegistrationRequest) -> Result<(), ShimError> {
        self.transition(ClientState::Deregistering);
        self.send(&request.with_action(Action::Deregister)).await?;
        self.transition(ClientState::Stopped);
        Ok(())
    }

    async fn build_request(&self) -> Result<RegistrationRequest, ShimError> {
        let fields = self
            .discovery
            .container_fields_for_port(self.frontend.port())
            .await?;
        tracing::info!(
            service = %fields.service_name,
            env = %fields.environment_name,
            mode = %fields.proxy_mode,
            "found container"
        );
        Ok(RegistrationRequest::new(
            self.frontend,
            self.backend,
            fields.service_name,
            fields.environment_name,
            fields.proxy_mode,
        ))
    }

    async fn send(&self, request: &RegistrationRequest) -> Result<(), ShimError> {
        let client = &self.client;
        self.retries
            .run(move |attempt| {
                tracing::debug!(attempt, action = ?request.action, "calling registrar");
                client.register(request)
            })
            .await
            .map(|_| ())
            .map_err(ShimError::Registration)
    }

    fn transition(&mut self, next: ClientState) {
        tracing::debug!(from = %self.state, to = %next, "registration client state");
        self.state = next;
    }
}
