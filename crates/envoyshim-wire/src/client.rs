use std::path::{Path, PathBuf};
use std::time::Duration;

use envoyshim_core::{RegistrationReply, RegistrationRequest};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::{DEFAULT_CALL_TIMEOUT, WireError};

/// Calls the registrar over its Unix socket.
///
/// Every call dials a fresh connection and drops it once the reply is in.
/// Traffic is a couple of calls per container lifetime, so there is no
/// connection to keep healthy.
#[derive(Debug, Clone)]
pub struct RegistrarClient {
    path: PathBuf,
    timeout: Duration,
}

impl RegistrarClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sends one request. A failure reply comes back as
    /// [`WireError::Rejected`].
    pub async fn register(&self, req: &RegistrationRequest) -> Result<RegistrationReply, WireError> {
        let reply = tokio::time::timeout(self.timeout, self.call(req))
            .await
            .map_err(|_| WireError::DeadlineExceeded(self.timeout))??;

        tracing::info!(status = reply.status_code, "registrar replied");
        if reply.is_success() {
            Ok(reply)
        } else {
            Err(WireError::Rejected(
                reply.error.unwrap_or_else(|| "no reason given".to_string()),
            ))
        }
    }

    async fn call(&self, req: &RegistrationRequest) -> Result<RegistrationReply, WireError> {
        tracing::debug!(path = %self.path.display(), "connecting on unix socket");
        let stream = UnixStream::connect(&self.path)
            .await
            .map_err(|source| WireError::Connect {
                path: self.path.clone(),
                source,
            })?;
        let (read, mut write) = stream.into_split();

        let mut line = serde_json::to_vec(req)?;
        line.push(b'\n');
        write.write_all(&line).await?;
        write.flush().await?;

        let mut reader = BufReader::new(read);
        let mut buf = String::new();
        if reader.read_line(&mut buf).await? == 0 {
            return Err(WireError::Closed);
        }
        Ok(serde_json::from_str(buf.trim_end())?)
    }
}
