use std::sync::Arc;

use crate::endpoint::ServiceKey;
use crate::errors::RegistryError;
use crate::protocol::{Action, RegistrationRequest, RegistrationReply};
use crate::registry::RegistryStore;

/// The only write path into a [`RegistryStore`]: validates registration
/// requests, derives their key and applies them.
#[derive(Clone)]
pub struct Registrar {
    store: Arc<dyn RegistryStore>,
}

impl Registrar {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RegistryStore> {
        &self.store
    }

    /// Handles one request and turns the outcome into a wire reply.
    pub fn handle(&self, req: &RegistrationRequest) -> RegistrationReply {
        match self.apply(req) {
            Ok(_) => RegistrationReply::ok(),
            Err(e) => {
                tracing::warn!(action = ?req.action, error = %e, "registration request refused");
                RegistrationReply::failed(e.to_string())
            }
        }
    }

    pub fn apply(&self, req: &RegistrationRequest) -> Result<ServiceKey, RegistryError> {
        match req.action {
            Action::Register => {
                let entry = req.to_entry()?;
                let key = entry.key();
                tracing::info!(key = %key, frontend = %entry.frontend, backend = %entry.backend, "registering");
                self.store.put(key.clone(), entry);
                self.dump();
                Ok(key)
            }
            Action::Deregister => {
                let key = req.key();
                tracing::info!(key = %key, "deregistering");
                self.store.delete(key.as_str());
                self.dump();
                Ok(key)
            }
            Action::Unknown => Err(RegistryError::UnknownAction),
        }
    }

    fn dump(&self) {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return;
        }
        tracing::debug!(count = self.store.len(), "registry entries:");
        let walked = self.store.for_each(&mut |key, entry| {
            tracing::debug!(
                key = %key,
                frontend = %entry.frontend,
                backend = %entry.backend,
                mode = %entry.proxy_mode,
                "  entry"
            );
            Ok(())
        });
        if let Err(e) = walked {
            tracing::warn!(error = %e, "could not list registry entries");
        }
    }
}
