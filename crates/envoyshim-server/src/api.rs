//! Envoy v1 discovery API (SDS, CDS, LDS) over the registry.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, options},
};
use envoyshim_core::envoy::{
    Cluster, ClusterDocument, Filter, FilterConfig, Listener, ListenerDocument, Route,
    RouteConfig, ServiceDocument, ServiceHost, TcpRoute, TracingConfig, VirtualHost,
};
use envoyshim_core::{Discovery, RegistryError};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use utoipa::{OpenApi, ToSchema};

#[derive(Clone)]
pub struct AppState {
    pub discovery: Discovery,
    pub metrics: Option<PrometheusHandle>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        registration,
        clusters,
        clusters_for_node,
        listeners,
        listeners_for_node,
    ),
    components(
        schemas(
            ErrorBody,
            ServiceDocument,
            ServiceHost,
            ClusterDocument,
            Cluster,
            ListenerDocument,
            Listener,
            Filter,
            FilterConfig,
            RouteConfig,
            VirtualHost,
            Route,
            TcpRoute,
            TracingConfig,
        )
    )
)]
pub struct ApiDoc;

pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/registration/:service", get(registration).options(preflight))
        .route("/clusters", get(clusters).options(preflight))
        .route(
            "/clusters/:cluster_id/:node_id",
            get(clusters_for_node).options(preflight),
        )
        .route("/listeners", get(listeners).options(preflight))
        .route(
            "/listeners/:cluster_id/:node_id",
            get(listeners_for_node).options(preflight),
        )
        .route("/:path", options(preflight))
        .method_not_allowed_fallback(method_not_allowed);

    Router::new()
        .nest("/v1", v1)
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .route("/api-docs/openapi.json", get(openapi))
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Body of every failed request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    #[schema(example = "error")]
    pub status: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    MethodNotAllowed,
    Internal(String),
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::ServiceNotFound(_) => ApiError::NotFound(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "Method Not Allowed".to_string(),
            ),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        let body = ErrorBody {
            status: "error".to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// Serializes up front so a failure becomes a 500 envelope instead of a
/// partial body.
fn json_response<T: Serialize>(value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "error marshaling discovery document");
            ApiError::Internal("Internal server error".to_string()).into_response()
        }
    }
}

fn count(document: &'static str) {
    metrics::counter!("envoyshim_discovery_requests_total", "document" => document).increment(1);
}

#[utoipa::path(
    get,
    path = "/v1/registration/{service}",
    responses(
        (status = 200, description = "Instances of the service", body = ServiceDocument),
        (status = 404, description = "No instances registered under that name", body = ErrorBody)
    ),
    params(("service" = String, Path, description = "Canonical service key, e.g. alpha-dev-8080"))
)]
async fn registration(State(state): State<AppState>, Path(service): Path<String>) -> Response {
    count("registration");
    match state.discovery.service_document(&service) {
        Ok(doc) => json_response(&doc),
        Err(e) => {
            tracing::debug!(service = %service, "envoy service has no instances");
            ApiError::from(e).into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/clusters",
    responses((status = 200, description = "One cluster per registered endpoint", body = ClusterDocument))
)]
async fn clusters(State(state): State<AppState>) -> Response {
    report_clusters(&state, "", "")
}

#[utoipa::path(
    get,
    path = "/v1/clusters/{cluster_id}/{node_id}",
    responses((status = 200, description = "One cluster per registered endpoint", body = ClusterDocument)),
    params(
        ("cluster_id" = String, Path, description = "Requesting proxy's service cluster"),
        ("node_id" = String, Path, description = "Requesting proxy's service node")
    )
)]
async fn clusters_for_node(
    State(state): State<AppState>,
    Path((cluster_id, node_id)): Path<(String, String)>,
) -> Response {
    report_clusters(&state, &cluster_id, &node_id)
}

fn report_clusters(state: &AppState, cluster_id: &str, node_id: &str) -> Response {
    count("clusters");
    tracing::debug!(cluster_id, node_id, "reporting envoy cluster information");
    json_response(&state.discovery.cluster_document())
}

#[utoipa::path(
    get,
    path = "/v1/listeners",
    responses((status = 200, description = "One listener per registered endpoint", body = ListenerDocument))
)]
async fn listeners(State(state): State<AppState>) -> Response {
    report_listeners(&state, "", "")
}

#[utoipa::path(
    get,
    path = "/v1/listeners/{cluster_id}/{node_id}",
    responses((status = 200, description = "One listener per registered endpoint", body = ListenerDocument)),
    params(
        ("cluster_id" = String, Path, description = "Requesting proxy's service cluster"),
        ("node_id" = String, Path, description = "Requesting proxy's service node")
    )
)]
async fn listeners_for_node(
    State(state): State<AppState>,
    Path((cluster_id, node_id)): Path<(String, String)>,
) -> Response {
    report_listeners(&state, &cluster_id, &node_id)
}

fn report_listeners(state: &AppState, cluster_id: &str, node_id: &str) -> Response {
    count("listeners");
    tracing::debug!(cluster_id, node_id, "reporting envoy listener information");
    json_response(&state.discovery.listener_document())
}

async fn preflight() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET"),
        ],
    )
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => ApiError::NotFound("metrics recorder not installed".to_string()).into_response(),
    }
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Not Found".to_string())
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
