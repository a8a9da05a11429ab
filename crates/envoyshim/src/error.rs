use std::io;

use envoyshim_wire::WireError;

#[derive(Debug, thiserror::Error)]
pub enum ShimError {
    #[error("unsupported protocol {0}")]
    UnsupportedProtocol(String),

    #[error("invalid {field}: {reason}")]
    InvalidAddress { field: &'static str, reason: String },

    #[error("{0}")]
    Config(String),

    #[error("unable to find container for {port}! ({reason})")]
    Lookup { port: u16, reason: String },

    #[error("could not call the registrar: {0}")]
    Registration(#[source] WireError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
