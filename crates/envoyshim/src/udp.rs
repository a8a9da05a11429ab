use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::error::ShimError;

/// How long a client mapping survives without a reply from the backend.
pub const UDP_CONN_TRACK_TIMEOUT: Duration = Duration::from_secs(90);

const UDP_BUF_SIZE: usize = 65507;

type ConnTable = Arc<Mutex<HashMap<SocketAddr, Arc<UdpSocket>>>>;

/// Plain datagram relay. Each client address gets its own connected
/// socket toward the backend so replies can be routed back.
pub struct UdpRelay {
    listener: Arc<UdpSocket>,
    frontend: SocketAddr,
    backend: SocketAddr,
    idle_timeout: Duration,
}

impl UdpRelay {
    pub async fn bind(frontend: SocketAddr, backend: SocketAddr) -> io::Result<Self> {
        let listener = UdpSocket::bind(frontend).await?;
        let frontend = listener.local_addr()?;
        Ok(Self {
            listener: Arc::new(listener),
            frontend,
            backend,
            idle_timeout: UDP_CONN_TRACK_TIMEOUT,
        })
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn frontend_addr(&self) -> SocketAddr {
        self.frontend
    }

    pub fn backend_addr(&self) -> SocketAddr {
        self.backend
    }

    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ShimError> {
        tracing::info!(frontend = %self.frontend, backend = %self.backend, "udp relay running");
        let conns: ConnTable = Arc::default();
        let mut buf = vec![0u8; UDP_BUF_SIZE];

        loop {
            let (n, client) = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.listener.recv_from(&mut buf) => match received {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(error = %e, "udp read failed");
                        continue;
                    }
                },
            };

            let upstream = match self.upstream_for(client, &conns, &shutdown).await {
                Ok(sock) => sock,
                Err(e) => {
                    tracing::warn!(%client, error = %e, "can't open backend socket");
                    continue;
                }
            };
            if let Err(e) = upstream.send(&buf[..n]).await {
                tracing::warn!(%client, error = %e, "udp write to backend failed");
            }
        }

        conns.lock().unwrap_or_else(PoisonError::into_inner).clear();
        tracing::info!(frontend = %self.frontend, "udp relay stopped");
        Ok(())
    }

    async fn upstream_for(
        &self,
        client: SocketAddr,
        conns: &ConnTable,
        shutdown: &CancellationToken,
    ) -> io::Result<Arc<UdpSocket>> {
        let existing = conns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&client)
            .cloned();
        if let Some(sock) = existing {
            return Ok(sock);
        }

        let local = if self.backend.is_ipv4() {
            SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0)
        } else {
            SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0)
        };
        let sock = UdpSocket::bind(local).await?;
        sock.connect(self.backend).await?;
        let sock = Arc::new(sock);
        conns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(client, sock.clone());

        tokio::spawn(reply_loop(
            self.listener.clone(),
            sock.clone(),
            client,
            conns.clone(),
            self.idle_timeout,
            shutdown.clone(),
        ));
        Ok(sock)
    }
}

async fn reply_loop(
    listener: Arc<UdpSocket>,
    upstream: Arc<UdpSocket>,
    client: SocketAddr,
    conns: ConnTable,
    idle_timeout: Duration,
    shutdown: CancellationToken,
) {
    let mut buf = vec![0u8; UDP_BUF_SIZE];
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            r = tokio::time::timeout(idle_timeout, upstream.recv(&mut buf)) => r,
        };
        match received {
            Ok(Ok(n)) => {
                if let Err(e) = listener.send_to(&buf[..n], client).await {
                    tracing::warn!(%client, error = %e, "udp write to client failed");
                    break;
                }
            }
            Ok(Err(e)) => {
                tracing::debug!(%client, error = %e, "backend read failed");
                break;
            }
            Err(_) => break,
        }
    }
    conns
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&client);
    tracing::debug!(%client, "udp mapping closed");
}
