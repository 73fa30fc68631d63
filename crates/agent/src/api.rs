//! HTTP API for health checks, Prometheus metrics and service registrations

use agent_lib::{
    anomaly::{AnomalyWindow, HistoryScanner},
    health::{ComponentStatus, HealthRegistry},
    monitor::MonitorSupervisor,
    observability::AgentMetrics,
    AlignedSnapshot, ChannelRef, MonitorError, Registration, ServiceRef,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: AgentMetrics,
    pub supervisor: Arc<MonitorSupervisor>,
    pub scanner: HistoryScanner,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: AgentMetrics,
        supervisor: Arc<MonitorSupervisor>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            supervisor,
            scanner: HistoryScanner::default(),
        }
    }
}

/// Error body returned by the registration endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

struct ApiError(MonitorError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MonitorError::AlreadyRegistered(_) => StatusCode::CONFLICT,
            MonitorError::NotFound(_) => StatusCode::NOT_FOUND,
            MonitorError::InvalidTimeRange(_) => StatusCode::BAD_REQUEST,
            other => {
                error!(error = %other, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<MonitorError> for ApiError {
    fn from(e: MonitorError) -> Self {
        Self(e)
    }
}

/// Path segments identifying a channel-owned service
#[derive(Debug, Deserialize)]
struct ServicePath {
    guild: String,
    channel: String,
    region: String,
    project: String,
    service: String,
}

impl ServicePath {
    fn split(self) -> (ChannelRef, ServiceRef) {
        (
            ChannelRef::new(self.guild, self.channel),
            ServiceRef::new(self.region, self.project, self.service),
        )
    }
}

#[derive(Debug, Deserialize)]
struct ChannelPath {
    guild: String,
    channel: String,
}

/// Body of a history scan request
#[derive(Debug, Serialize, Deserialize)]
pub struct ScanRequest {
    pub snapshots: Vec<AlignedSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanResponse {
    pub windows: Vec<AnomalyWindow>,
}

/// Health check response - returns 200 if healthy, 503 if degraded/unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

async fn register_service(
    State(state): State<Arc<AppState>>,
    Path(path): Path<ServicePath>,
) -> Result<(StatusCode, Json<Registration>), ApiError> {
    let (channel, service) = path.split();
    let registration = Registration::new(service, channel);
    state.supervisor.register(registration.clone()).await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

async fn unregister_service(
    State(state): State<Arc<AppState>>,
    Path(path): Path<ServicePath>,
) -> Result<Json<Registration>, ApiError> {
    let (channel, service) = path.split();
    let removed = state.supervisor.unregister(&channel, &service).await?;
    Ok(Json(removed))
}

async fn list_services(
    State(state): State<Arc<AppState>>,
    Path(path): Path<ChannelPath>,
) -> Result<Json<Vec<Registration>>, ApiError> {
    let channel = ChannelRef::new(path.guild, path.channel);
    Ok(Json(state.supervisor.list_for_channel(&channel).await?))
}

/// Run the history scanner over caller-supplied snapshots
async fn scan_report(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScanRequest>,
) -> Json<ScanResponse> {
    let mut snapshots = request.snapshots;
    snapshots.sort_by_key(|s| s.timestamp);
    Json(ScanResponse {
        windows: state.scanner.scan(&snapshots),
    })
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route(
            "/api/v1/guilds/:guild/channels/:channel/services",
            get(list_services),
        )
        .route(
            "/api/v1/guilds/:guild/channels/:channel/services/:region/:project/:service",
            post(register_service).delete(unregister_service),
        )
        .route("/api/v1/reports/scan", post(scan_report))
        .with_state(state)
}

/// Start the API server, stopping when `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
