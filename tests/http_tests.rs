//! HTTP planning service routes, exercised in-process.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use vram_planner::config::Config;
use vram_planner::server::api::{build_router, AppState};

fn app() -> Router {
    let state = AppState::new(Config::default()).unwrap();
    build_router(Arc::new(state))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, bytes) = send(app, request).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

fn plan_request() -> Value {
    json!({
        "gpuSpecs": { "totalMemoryGB": 80, "memoryBandwidthGBps": 2039, "hasTensorCores": true, "gpuCount": 1 },
        "modelSpecs": { "name": "mistralai/Mistral-7B-Instruct-v0.2", "parametersBillion": 7, "quantization": "bf16" },
        "workloadSpecs": { "expectedConcurrency": 64, "averageSequenceLength": 1024, "maxSequenceLength": 8192, "optimizationPosture": "throughput" }
    })
}

#[tokio::test]
async fn test_plan_route() {
    let (status, body) = post_json(app(), "/v1/plan", plan_request()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["requestId"].as_str().is_some());

    let plan = &body["plan"];
    assert_eq!(plan["allocation"]["posture"], "throughput");
    let command = plan["configuration"]["command"].as_str().unwrap();
    assert!(command.contains("--model mistralai/Mistral-7B-Instruct-v0.2"));
    assert!(command.contains("--dtype bfloat16"));
}

#[tokio::test]
async fn test_plan_route_format_query() {
    let (status, body) = post_json(app(), "/v1/plan?format=docker", plan_request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plan"]["configuration"]["format"], "docker");
    assert!(body["plan"]["configuration"]["command"]
        .as_str()
        .unwrap()
        .starts_with("docker run"));
}

#[tokio::test]
async fn test_validation_error_is_bad_request() {
    let mut request = plan_request();
    request["gpuSpecs"]["gpuCount"] = json!(0);
    let (status, body) = post_json(app(), "/v1/plan", request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation_error");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("gpuSpecs.gpuCount"));
}

#[tokio::test]
async fn test_model_too_large_is_unprocessable() {
    let mut request = plan_request();
    request["modelSpecs"]["parametersBillion"] = json!(70);
    let (status, body) = post_json(app(), "/v1/plan", request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["kind"], "insufficient_memory");
}

#[tokio::test]
async fn test_malformed_body() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/memory")
        .header("content-type", "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let (status, bytes) = send(app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["kind"], "malformed_request");
}

#[tokio::test]
async fn test_memory_route() {
    let (status, body) = post_json(
        app(),
        "/v1/memory",
        json!({ "parametersBillion": 7, "quantization": "fp16", "batchSize": 32, "maxSeqLen": 2048 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["memory"]["modelWeightsGb"], 14.0);
    assert_eq!(body["memory"]["kvCacheGb"], 32.0);
}

#[tokio::test]
async fn test_quantization_routes() {
    let (status, bytes) = get(app(), "/v1/quantization").await;
    assert_eq!(status, StatusCode::OK);
    let catalog: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(catalog.as_array().unwrap().len(), 8);

    let (status, body) = post_json(
        app(),
        "/v1/quantization/recommend",
        json!({ "vramGB": 24, "paramsBillion": 13, "priority": "quality" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["canFit"], true);
    assert_ne!(body["format"]["name"], "fp16");

    let (status, body) = post_json(
        app(),
        "/v1/quantization/recommend",
        json!({ "vramGB": 24, "paramsBillion": 13, "priority": "fastest" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation_error");
}

#[tokio::test]
async fn test_architecture_route() {
    let (status, bytes) = get(app(), "/v1/architecture/8").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["interpolated"], false);
    assert_eq!(body["architecture"]["layerCount"], 32);

    let (status, bytes) = get(app(), "/v1/architecture/-3").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["kind"], "invalid_input");
}

#[tokio::test]
async fn test_health_and_metrics() {
    let state = Arc::new(AppState::new(Config::default()).unwrap());
    let router = build_router(state.clone());

    let (status, bytes) = get(router.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");

    let (status, _) = post_json(router.clone(), "/v1/plan", plan_request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.metrics.request_count("/v1/plan", "ok"), 1);

    let (status, bytes) = get(router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("vram_planner_requests_total"));
    assert!(text.contains("vram_planner_plan_duration_seconds_count 1"));
}
