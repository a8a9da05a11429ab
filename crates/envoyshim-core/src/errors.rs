/// Domain errors for the envoyshim registry
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown request action, no idea what to do with it")]
    UnknownAction,

    #[error("invalid {field} address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("unsupported proxy mode '{0}'")]
    InvalidProxyMode(String),

    #[error("no instances of '{0}' found")]
    ServiceNotFound(String),
}

/// Tells a retry loop whether another attempt could possibly succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for RegistryError {
    fn is_retryable(&self) -> bool {
        false
    }
}
