use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use envoyshim_core::{Registrar, RegistrationReply, RegistrationRequest};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

/// Server side of the registration channel.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, req: RegistrationRequest) -> RegistrationReply;
}

impl RequestHandler for Registrar {
    fn handle(&self, req: RegistrationRequest) -> RegistrationReply {
        Registrar::handle(self, &req)
    }
}

/// Binds the channel socket, replacing a stale socket file left behind by a
/// previous run.
pub fn bind(path: &Path) -> io::Result<UnixListener> {
    if path.exists() {
        tracing::warn!(path = %path.display(), "removing stale registration socket");
        std::fs::remove_file(path)?;
    }
    UnixListener::bind(path)
}

/// Longest request line accepted on the channel.
pub const MAX_REQUEST_LINE: usize = 64 * 1024;
/// A connection with no complete request for this long is closed.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-connection bounds on what a client may make the server hold.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub max_line: usize,
    pub idle_timeout: Duration,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_line: MAX_REQUEST_LINE,
            idle_timeout: IDLE_TIMEOUT,
        }
    }
}

/// Accepts connections until `shutdown` is cancelled. Each connection runs
/// on its own task and may carry any number of requests.
pub async fn serve(listener: UnixListener, handler: Arc<dyn RequestHandler>, shutdown: CancellationToken) {
    serve_with_limits(listener, handler, shutdown, ConnectionLimits::default()).await
}

pub async fn serve_with_limits(
    listener: UnixListener,
    handler: Arc<dyn RequestHandler>,
    shutdown: CancellationToken,
    limits: ConnectionLimits,
) {
    loop {
        let stream = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    tracing::error!(error = %e, "accept failed on registration socket");
                    continue;
                }
            },
        };

        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, handler, limits).await {
                tracing::debug!(error = %e, "registration connection ended with error");
            }
        });
    }
    tracing::info!("registration channel stopped");
}

async fn handle_connection(
    stream: UnixStream,
    handler: Arc<dyn RequestHandler>,
    limits: ConnectionLimits,
) -> io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = FramedRead::new(read, LinesCodec::new_with_max_length(limits.max_line));

    loop {
        let next = match tokio::time::timeout(limits.idle_timeout, lines.next()).await {
            Ok(next) => next,
            Err(_) => {
                tracing::debug!(timeout = ?limits.idle_timeout, "closing idle registration connection");
                return Ok(());
            }
        };
        let line = match next {
            None => return Ok(()),
            Some(Ok(line)) => line,
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                tracing::warn!(max = limits.max_line, "registration request line too long");
                let reply = RegistrationReply::failed(format!(
                    "malformed request: line exceeds {} bytes",
                    limits.max_line
                ));
                return write_reply(&mut write, &reply).await;
            }
            Some(Err(LinesCodecError::Io(e))) => return Err(e),
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<RegistrationRequest>(&line) {
            Ok(req) => handler.handle(req),
            Err(e) => RegistrationReply::failed(format!("malformed request: {e}")),
        };
        write_reply(&mut write, &reply).await?;
    }
}

async fn write_reply(write: &mut OwnedWriteHalf, reply: &RegistrationReply) -> io::Result<()> {
    let mut out = serde_json::to_vec(reply)?;
    out.push(b'\n');
    write.write_all(&out).await
}
