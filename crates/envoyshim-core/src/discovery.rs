use std::collections::HashMap;
use std::sync::Arc;

use crate::endpoint::EndpointEntry;
use crate::envoy::{
    Cluster, ClusterDocument, Filter, FilterConfig, Listener, ListenerDocument, Route,
    RouteConfig, ServiceDocument, ServiceHost, TracingConfig, VirtualHost,
};
use crate::errors::RegistryError;
use crate::registry::RegistryStore;
use crate::time::{Clock, SystemClock};

pub const CONNECT_TIMEOUT_MS: u64 = 500;
pub const LB_TYPE: &str = "round_robin";
pub const CLUSTER_TYPE: &str = "sds";
pub const SERVICE_REPO_NAME: &str = "docker service";
pub const HTTP_CONNECTION_MANAGER: &str = "envoy.http_connection_manager";
pub const STAT_PREFIX: &str = "ingress_http";

/// Read-only projection of a registry into Envoy v1 discovery documents.
/// Every call reads the store afresh; nothing is cached.
#[derive(Clone)]
pub struct Discovery {
    store: Arc<dyn RegistryStore>,
    clock: Arc<dyn Clock>,
}

impl Discovery {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn RegistryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// SDS: the single instance registered under `name`.
    pub fn service_document(&self, name: &str) -> Result<ServiceDocument, RegistryError> {
        let entry = self
            .store
            .get(name)
            .ok_or_else(|| RegistryError::ServiceNotFound(name.to_string()))?;

        Ok(ServiceDocument {
            env: entry.environment_name.clone(),
            hosts: vec![self.host_for(&entry)],
            service: name.to_string(),
        })
    }

    /// CDS: one cluster per registered entry.
    pub fn cluster_document(&self) -> ClusterDocument {
        let mut clusters = self.collect(cluster_for);
        clusters.sort_by(|a, b| a.name.cmp(&b.name));
        ClusterDocument { clusters }
    }

    /// LDS: one listener per registered entry.
    pub fn listener_document(&self) -> ListenerDocument {
        let mut listeners = self.collect(listener_for);
        listeners.sort_by(|a, b| a.name.cmp(&b.name));
        ListenerDocument { listeners }
    }

    pub fn host_for(&self, entry: &EndpointEntry) -> ServiceHost {
        ServiceHost {
            ip_address: entry.backend.ip().to_string(),
            last_check_in: self.clock.now_utc_string(),
            port: entry.backend.port(),
            revision: "1".to_string(),
            service: entry.key().to_string(),
            service_repo_name: SERVICE_REPO_NAME.to_string(),
            tags: HashMap::new(),
        }
    }

    fn collect<T>(&self, project: fn(&EndpointEntry) -> T) -> Vec<T> {
        let mut out = Vec::with_capacity(self.store.len());
        if let Err(e) = self.store.for_each(&mut |_, entry| {
            out.push(project(entry));
            Ok(())
        }) {
            tracing::warn!(error = %e, collected = out.len(), "registry walk stopped early");
        }
        out
    }
}

pub fn cluster_for(entry: &EndpointEntry) -> Cluster {
    let name = entry.key().to_string();
    Cluster {
        name: name.clone(),
        kind: CLUSTER_TYPE.to_string(),
        connect_timeout_ms: CONNECT_TIMEOUT_MS,
        lb_type: LB_TYPE.to_string(),
        service_name: name,
    }
}

/// Builds the HTTP listener for an entry. The same shape is emitted for
/// `tcp` entries too.
pub fn listener_for(entry: &EndpointEntry) -> Listener {
    let name = entry.key().to_string();

    let router = Filter {
        name: "router".to_string(),
        config: FilterConfig::default(),
    };

    let virtual_host = VirtualHost {
        name: name.clone(),
        domains: vec!["*".to_string()],
        routes: vec![Route {
            timeout_ms: 0,
            prefix: "/".to_string(),
            host_rewrite: String::new(),
            cluster: name.clone(),
        }],
    };

    let manager = Filter {
        name: HTTP_CONNECTION_MANAGER.to_string(),
        config: FilterConfig {
            codec_type: Some("auto".to_string()),
            stat_prefix: Some(STAT_PREFIX.to_string()),
            route_config: Some(RouteConfig {
                virtual_hosts: vec![virtual_host],
                routes: Vec::new(),
            }),
            filters: vec![router],
            tracing: Some(TracingConfig {
                operation_name: "egress".to_string(),
            }),
        },
    };

    Listener {
        name,
        address: format!("tcp://{}", entry.frontend),
        filters: vec![manager],
    }
}
