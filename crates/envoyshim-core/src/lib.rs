pub mod endpoint;
pub mod registry;
pub mod protocol;
pub mod registrar;
pub mod envoy;
pub mod discovery;
pub mod errors;
pub mod retry;
pub mod time;

pub use endpoint::{EndpointEntry, ProxyMode, ServiceKey};
pub use registry::{MemoryRegistry, RegistryStore};
pub use protocol::{Action, RegistrationReply, RegistrationRequest};
pub use registrar::Registrar;
pub use discovery::Discovery;
pub use errors::{RegistryError, Retryable};
pub use retry::RetryPolicy;
pub use time::{Clock, SystemClock};
