//! Registration channel between shims and the registry server.
//!
//! Requests and replies are single-line JSON documents exchanged over a Unix
//! domain socket, which keeps the registry unreachable from off the host.

pub mod client;
pub mod server;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use envoyshim_core::Retryable;

pub use client::RegistrarClient;
pub use server::{ConnectionLimits, RequestHandler, bind, serve, serve_with_limits};

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/docker-envoy.sock";

/// Deadline for one whole call: connect, send, and read the reply.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("can't connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("context deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("registration channel i/o: {0}")]
    Io(#[from] io::Error),

    #[error("malformed message: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("connection closed before a reply arrived")]
    Closed,

    #[error("registrar refused request: {0}")]
    Rejected(String),
}

impl Retryable for WireError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            WireError::Connect { .. } | WireError::DeadlineExceeded(_) | WireError::Io(_) | WireError::Closed
        )
    }
}

/// Accepts both `unix:///path` and a bare path.
pub fn socket_path(addr: &str) -> PathBuf {
    PathBuf::from(addr.strip_prefix("unix://").unwrap_or(addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_unix_scheme() {
        assert_eq!(
            socket_path("unix:///tmp/docker-envoy.sock"),
            PathBuf::from("/tmp/docker-envoy.sock")
        );
        assert_eq!(socket_path("/var/run/x.sock"), PathBuf::from("/var/run/x.sock"));
    }

    #[test]
    fn only_transport_errors_retry() {
        assert!(WireError::DeadlineExceeded(DEFAULT_CALL_TIMEOUT).is_retryable());
        assert!(WireError::Closed.is_retryable());
        assert!(!WireError::Rejected("nope".into()).is_retryable());
        let codec = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(!WireError::Codec(codec).is_retryable());
    }
}
