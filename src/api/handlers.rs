use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::alerts::{FiredAlert, DEFAULT_RECENT_WINDOW};
use crate::engine::{AlertEngine, EngineStats};
use crate::ingest::{IngestError, MetricIngest};
use crate::metric::MetricSample;
use crate::rules::{AlertRule, TopologyId};
use crate::topology::{OwnerId, Topology, TopologyError, TopologyService};

/// Owner assumed when a request does not name one
pub const DEFAULT_OWNER: OwnerId = 1;

/// Application state shared across handlers
pub struct AppState {
    pub engine: Arc<AlertEngine>,
    pub topologies: TopologyService,
    pub ingest: MetricIngest,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn engine_stats(State(state): State<Arc<AppState>>) -> Json<EngineStats> {
    Json(state.engine.stats())
}

// ============================================================================
// Metrics
// ============================================================================

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

pub async fn store_metric(
    State(state): State<Arc<AppState>>,
    Json(sample): Json<MetricSample>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    state.ingest.store_metric(sample).await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Metric stored successfully",
        }),
    ))
}

// ============================================================================
// Topologies
// ============================================================================

#[derive(Deserialize)]
pub struct OwnerQuery {
    #[serde(default = "default_owner")]
    pub owner_id: OwnerId,
}

fn default_owner() -> OwnerId {
    DEFAULT_OWNER
}

#[derive(Deserialize)]
pub struct CreateTopologyRequest {
    #[serde(default = "default_owner")]
    pub owner_id: OwnerId,
    pub name: String,
    pub data: String,
}

#[derive(Deserialize)]
pub struct UpdateTopologyRequest {
    pub name: String,
    pub data: String,
}

pub async fn create_topology(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateTopologyRequest>,
) -> Result<(StatusCode, Json<Topology>), ApiError> {
    let topology = state
        .topologies
        .save(request.owner_id, &request.name, &request.data)
        .await?;

    Ok((StatusCode::CREATED, Json(topology)))
}

pub async fn list_topologies(
    State(state): State<Arc<AppState>>,
    Query(owner): Query<OwnerQuery>,
) -> Result<Json<Vec<Topology>>, ApiError> {
    Ok(Json(state.topologies.list(owner.owner_id).await?))
}

pub async fn get_topology(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TopologyId>,
    Query(owner): Query<OwnerQuery>,
) -> Result<Json<Topology>, ApiError> {
    Ok(Json(state.topologies.get(id, owner.owner_id).await?))
}

pub async fn update_topology(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TopologyId>,
    Query(owner): Query<OwnerQuery>,
    Json(request): Json<UpdateTopologyRequest>,
) -> Result<Json<Topology>, ApiError> {
    let topology = state
        .topologies
        .update(id, owner.owner_id, &request.name, &request.data)
        .await?;

    Ok(Json(topology))
}

pub async fn delete_topology(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TopologyId>,
    Query(owner): Query<OwnerQuery>,
) -> Result<StatusCode, ApiError> {
    state.topologies.delete(id, owner.owner_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn topology_rules(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TopologyId>,
    Query(owner): Query<OwnerQuery>,
) -> Result<Json<Vec<AlertRule>>, ApiError> {
    state.topologies.get(id, owner.owner_id).await?;
    Ok(Json(state.engine.rules_for(id)))
}

#[derive(Serialize)]
pub struct DebugLogResponse {
    pub logs: Vec<String>,
}

pub async fn debug_logs(State(state): State<Arc<AppState>>) -> Json<DebugLogResponse> {
    Json(DebugLogResponse {
        logs: state.engine.trace_lines(),
    })
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Deserialize)]
pub struct RecentQuery {
    pub window_secs: Option<u64>,
}

#[derive(Serialize)]
pub struct RecentAlertsResponse {
    pub recent_alerts: Vec<FiredAlert>,
}

pub async fn recent_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> Json<RecentAlertsResponse> {
    let window = query
        .window_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RECENT_WINDOW);

    Json(RecentAlertsResponse {
        recent_alerts: state.engine.recent_alerts(window),
    })
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<TopologyError> for ApiError {
    fn from(e: TopologyError) -> Self {
        match e {
            TopologyError::NotFound(_) => ApiError::NotFound(e.to_string()),
            TopologyError::EmptyName | TopologyError::InvalidGraph(_) => {
                ApiError::BadRequest(e.to_string())
            }
            TopologyError::Repository(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::MissingDevice => ApiError::BadRequest(e.to_string()),
            IngestError::Sink(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
