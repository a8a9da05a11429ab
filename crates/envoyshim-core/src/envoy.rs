//! Envoy v1 discovery API objects (SDS, CDS and LDS).
//!
//! Only the fields this registry fills in are modelled; Envoy treats the
//! rest as optional.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One host in an SDS answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ServiceHost {
    pub ip_address: String,
    pub last_check_in: String,
    pub port: u16,
    pub revision: String,
    pub service: String,
    pub service_repo_name: String,
    pub tags: HashMap<String, String>,
}

/// `GET /v1/registration/{service}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ServiceDocument {
    pub env: String,
    pub hosts: Vec<ServiceHost>,
    pub service: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Cluster {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub connect_timeout_ms: u64,
    pub lb_type: String,
    pub service_name: String,
}

/// `GET /v1/clusters`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClusterDocument {
    pub clusters: Vec<Cluster>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Listener {
    pub name: String,
    pub address: String,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Filter {
    pub name: String,
    pub config: FilterConfig,
}

/// Shared by the connection manager and the filters nested in it; the
/// router filter serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FilterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_config: Option<RouteConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracing: Option<TracingConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RouteConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub virtual_hosts: Vec<VirtualHost>,
    /// TCP proxy routes. Not populated yet: every listener gets the HTTP
    /// connection manager whatever the entry's proxy mode.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<TcpRoute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct VirtualHost {
    pub name: String,
    pub domains: Vec<String>,
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Route {
    /// 0 disables the route timeout
    pub timeout_ms: u64,
    pub prefix: String,
    pub host_rewrite: String,
    pub cluster: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TcpRoute {
    pub cluster: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destination_ip_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_ports: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_ip_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_ports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TracingConfig {
    pub operation_name: String,
}

/// `GET /v1/listeners`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ListenerDocument {
    pub listeners: Vec<Listener>,
}
