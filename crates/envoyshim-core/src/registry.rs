use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::endpoint::{EndpointEntry, ServiceKey};
use crate::errors::RegistryError;

/// Storage for endpoint entries, keyed by canonical service key.
///
/// Reads (`get`, `for_each`) may run concurrently; `put` and `delete` are
/// exclusive with every other access.
pub trait RegistryStore: Send + Sync {
    /// Upsert: any entry already stored at `key` is replaced.
    fn put(&self, key: ServiceKey, entry: EndpointEntry);
    fn get(&self, key: &str) -> Option<EndpointEntry>;
    /// Exact-key removal. Removing an absent key is a no-op.
    fn delete(&self, key: &str);
    /// Visits a consistent snapshot of all entries in no particular order,
    /// stopping at the first visitor error and returning it.
    fn for_each(
        &self,
        visitor: &mut dyn FnMut(&ServiceKey, &EndpointEntry) -> Result<(), RegistryError>,
    ) -> Result<(), RegistryError>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory registry guarded by a reader/writer lock.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entries: RwLock<HashMap<ServiceKey, EndpointEntry>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryStore for MemoryRegistry {
    fn put(&self, key: ServiceKey, entry: EndpointEntry) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, entry);
    }

    fn get(&self, key: &str) -> Option<EndpointEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn delete(&self, key: &str) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
    }

    fn for_each(
        &self,
        visitor: &mut dyn FnMut(&ServiceKey, &EndpointEntry) -> Result<(), RegistryError>,
    ) -> Result<(), RegistryError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        for (key, entry) in entries.iter() {
            visitor(key, entry)?;
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::ProxyMode;
    use std::sync::Arc;

    fn entry(service: &str, port: u16) -> EndpointEntry {
        EndpointEntry::new(
            format!("192.168.1.10:{port}").parse().unwrap(),
            "10.0.0.1:80".parse().unwrap(),
            service,
            "dev",
            ProxyMode::Http,
        )
    }

    #[test]
    fn put_overwrites_existing_key() {
        let store = MemoryRegistry::new();
        let first = entry("alpha", 8080);
        let mut second = entry("alpha", 8080);
        second.backend = "10.0.0.9:81".parse().unwrap();

        store.put(first.key(), first);
        store.put(second.key(), second.clone());

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("alpha-dev-8080"), Some(second));
    }

    #[test]
    fn get_and_delete_unknown_keys() {
        let store = MemoryRegistry::new();
        assert_eq!(store.get("nope-dev-1"), None);
        store.delete("nope-dev-1");
        assert!(store.is_empty());
    }

    #[test]
    fn delete_is_exact_match_only() {
        let store = MemoryRegistry::new();
        let e = entry("alpha", 8080);
        store.put(e.key(), e);

        store.delete("alpha-dev-808");
        store.delete("alpha-dev");
        assert_eq!(store.len(), 1);

        store.delete("alpha-dev-8080");
        assert!(store.is_empty());
    }

    #[test]
    fn for_each_stops_on_visitor_error() {
        let store = MemoryRegistry::new();
        for port in [1000, 1001, 1002] {
            let e = entry("svc", port);
            store.put(e.key(), e);
        }

        let mut visited = 0;
        let result = store.for_each(&mut |key, _| {
            visited += 1;
            Err(RegistryError::ServiceNotFound(key.to_string()))
        });

        assert!(matches!(result, Err(RegistryError::ServiceNotFound(_))));
        assert_eq!(visited, 1);
    }

    #[test]
    fn concurrent_writers_and_readers() {
        let store = Arc::new(MemoryRegistry::new());
        let handles: Vec<_> = (0..8u16)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for port in 0..50u16 {
                        let e = entry(&format!("svc{i}"), port);
                        store.put(e.key(), e);
                        let mut seen = 0;
                        store.for_each(&mut |_, _| {
                            seen += 1;
                            Ok(())
                        })
                        .unwrap();
                        assert!(seen >= 1);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 8 * 50);
    }
}
