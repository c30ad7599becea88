//! Planning HTTP API.
//!
//! - POST /v1/plan (`?format=command|docker|kubernetes`)
//! - POST /v1/memory
//! - GET /v1/quantization
//! - POST /v1/quantization/recommend
//! - GET /v1/architecture/{params}
//! - GET /health
//! - GET /metrics

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::architecture::{self, ArchitectureEstimate};
use crate::config::Config;
use crate::emitter::OutputFormat;
use crate::error::PlanError;
use crate::input::{self, PlanInput};
use crate::planner::{DeploymentPlan, MemoryReport, Planner};
use crate::quantization::{self, Priority, QuantizationFormat, Recommendation, RecommendOptions};
use crate::server::metrics::ServerMetrics;

/// Application state shared across handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub planner: Planner,
    pub metrics: ServerMetrics,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        Ok(Self {
            planner: Planner::new(&config)?,
            metrics: ServerMetrics::new()?,
            config: Arc::new(config),
            start_time: Instant::now(),
        })
    }
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.server.max_body_bytes;
    Router::new()
        .route("/v1/plan", post(plan))
        .route("/v1/memory", post(memory))
        .route("/v1/quantization", get(list_quantization))
        .route("/v1/quantization/recommend", post(recommend_quantization))
        .route("/v1/architecture/{params}", get(architecture_estimate))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    Plan(PlanError),
    /// Body is not valid JSON for the route.
    Malformed(String),
    Internal(String),
}

impl From<PlanError> for ApiError {
    fn from(err: PlanError) -> Self {
        ApiError::Plan(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Plan(
                PlanError::Validation { .. }
                | PlanError::UnsupportedFormat { .. }
                | PlanError::InvalidInput { .. },
            ) => StatusCode::BAD_REQUEST,
            ApiError::Plan(PlanError::InsufficientMemory { .. } | PlanError::Configuration(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Malformed(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Plan(err) => err.kind(),
            ApiError::Malformed(_) => "malformed_request",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Plan(err) => err.to_string(),
            ApiError::Malformed(msg) | ApiError::Internal(msg) => msg.clone(),
        };
        let body = json!({ "error": { "kind": self.kind(), "message": message } });
        (self.status(), Json(body)).into_response()
    }
}

// ─── Request/Response Types ────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct PlanQuery {
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub request_id: String,
    pub plan: DeploymentPlan,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendRequest {
    #[serde(rename = "vramGB", alias = "vram_gb", alias = "vram")]
    pub vram_gb: f64,
    #[serde(alias = "modelParamsBillion", alias = "params_billion")]
    pub params_billion: f64,
    #[serde(default = "default_batch_size", alias = "batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_max_seq_len", alias = "max_seq_len")]
    pub max_seq_len: u64,
    #[serde(default)]
    pub priority: Option<String>,
}

fn default_batch_size() -> u64 {
    RecommendOptions::default().batch_size
}
fn default_max_seq_len() -> u64 {
    RecommendOptions::default().max_seq_len
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

/// Count the outcome for `route` and pass the result through.
fn finish<T>(state: &AppState, route: &str, result: Result<T, ApiError>) -> Result<T, ApiError> {
    state.metrics.record_request(route, result.is_ok());
    if let Err(err) = &result {
        warn!(route, kind = err.kind(), status = %err.status(), "Request failed");
    }
    result
}

fn parse_input(state: &AppState, body: &[u8]) -> Result<PlanInput, ApiError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| ApiError::Malformed(e.to_string()))?;
    Ok(input::normalize(&value, &state.config.defaults)?)
}

async fn plan(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PlanQuery>,
    body: Bytes,
) -> Result<Json<PlanResponse>, ApiError> {
    let request_id = Uuid::new_v4().to_string();
    let started = Instant::now();

    let result = parse_input(&state, &body).and_then(|input| {
        let format = query.format.unwrap_or_default();
        Ok(state.planner.plan_with_format(&input, format)?)
    });
    state.metrics.observe_plan(started.elapsed().as_secs_f64());

    let plan = finish(&state, "/v1/plan", result)?;
    info!(
        request_id = request_id,
        posture = %plan.allocation.posture,
        max_num_seqs = plan.batch.max_concurrent_sequences,
        "Plan request"
    );
    Ok(Json(PlanResponse { request_id, plan }))
}

async fn memory(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<MemoryReport>, ApiError> {
    let result = parse_input(&state, &body)
        .and_then(|input| Ok(state.planner.memory(&input)?));
    finish(&state, "/v1/memory", result).map(Json)
}

async fn list_quantization(State(state): State<Arc<AppState>>) -> Json<Vec<QuantizationFormat>> {
    state.metrics.record_request("/v1/quantization", true);
    Json(quantization::catalog().to_vec())
}

async fn recommend_quantization(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Recommendation>, ApiError> {
    let result = serde_json::from_slice::<RecommendRequest>(&body)
        .map_err(|e| ApiError::Malformed(e.to_string()))
        .and_then(|req| {
            let priority: Priority = match req.priority.as_deref() {
                Some(p) => p.parse()?,
                None => Priority::default(),
            };
            let options = RecommendOptions {
                batch_size: req.batch_size,
                max_seq_len: req.max_seq_len,
                priority,
            };
            Ok(quantization::recommend(req.vram_gb, req.params_billion, options)?)
        });
    finish(&state, "/v1/quantization/recommend", result).map(Json)
}

async fn architecture_estimate(
    State(state): State<Arc<AppState>>,
    Path(params): Path<f64>,
) -> Result<Json<ArchitectureEstimate>, ApiError> {
    let result = architecture::estimate_detailed(params).map_err(ApiError::from);
    finish(&state, "/v1/architecture", result).map(Json)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let text = state
        .metrics
        .prometheus_output()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let bad = ApiError::from(PlanError::validation("gpuSpecs.gpuCount", 0, "must be >= 1"));
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let oom = ApiError::from(PlanError::InsufficientMemory {
            required_gb: 140.0,
            available_gb: 80.0,
        });
        assert_eq!(oom.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(oom.kind(), "insufficient_memory");

        assert_eq!(ApiError::Malformed("eof".into()).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_recommend_request_aliases() {
        let req: RecommendRequest =
            serde_json::from_str(r#"{ "vram_gb": 24, "modelParamsBillion": 13 }"#).unwrap();
        assert_eq!(req.vram_gb, 24.0);
        assert_eq!(req.params_billion, 13.0);
        assert_eq!(req.batch_size, 1);
        assert_eq!(req.max_seq_len, 2048);
    }
}
