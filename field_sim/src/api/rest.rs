use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::settings::Settings;
use crate::gateway::simulator::GatewaySimulator;
use crate::live::source::{RawTagRecord, TagDataResponse, SESSION_HEADER};
use crate::tags::address::{address_examples, validate_address, Brand};
use crate::tags::engine::SimulationEngine;

/// Longest back-fill a single history request may ask for.
const MAX_HISTORY_HOURS: u32 = 24 * 31;
const MAX_POINTS_PER_HOUR: u32 = 3_600;

#[derive(Clone)]
pub struct SharedAppState {
    pub engine: SimulationEngine,
    pub gateway: GatewaySimulator,
    pub start_time: tokio::time::Instant,
    pub settings: Arc<RwLock<Settings>>,
}

pub fn create_api_routes() -> Router<SharedAppState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/stats", get(stats))
        .route("/api/config", get(get_config))
        .route("/api/tags", get(list_tags))
        .route("/api/tags/:tag_id/history", get(tag_history))
        .route("/api/gateway/data", get(gateway_data))
        .route("/api/gateway/status", get(gateway_status))
        .route("/api/gateway/connect", post(gateway_connect))
        .route("/api/gateway/disconnect", post(gateway_disconnect))
        .route("/api/address/validate", post(address_validate))
        .route("/api/address/examples/:brand", get(address_hint))
}

async fn health() -> &'static str {
    "Field data simulator running"
}

async fn stats(State(state): State<SharedAppState>) -> impl IntoResponse {
    let gateway = state.gateway.status().await;
    Json(json!({
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "tag_count": state.engine.tag_count(),
        "subscriber_count": state.engine.subscriber_count(),
        "running": state.engine.is_running(),
        "gateway_status": gateway,
    }))
}

async fn get_config(State(state): State<SharedAppState>) -> impl IntoResponse {
    let cfg = state.settings.read().await.clone();
    Json(cfg)
}

async fn list_tags(State(state): State<SharedAppState>) -> impl IntoResponse {
    Json(state.engine.snapshot())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default = "default_hours")]
    hours: u32,
    #[serde(default = "default_points_per_hour")]
    points_per_hour: u32,
}

fn default_hours() -> u32 {
    24
}

fn default_points_per_hour() -> u32 {
    12
}

async fn tag_history(
    State(state): State<SharedAppState>,
    Path(tag_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> impl IntoResponse {
    let hours = params.hours.min(MAX_HISTORY_HOURS);
    let points_per_hour = params.points_per_hour.min(MAX_POINTS_PER_HOUR);
    let points = state
        .engine
        .generate_historical_data(&tag_id, hours, points_per_hour);
    debug!(%tag_id, hours, points_per_hour, points = points.len(), "history generated");
    Json(json!({ "tagId": tag_id, "points": points }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuery {
    #[serde(default)]
    tag_ids: Option<String>,
}

async fn gateway_data(
    State(state): State<SharedAppState>,
    headers: HeaderMap,
    Query(params): Query<DataQuery>,
) -> impl IntoResponse {
    let session = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    let tags = match params.tag_ids.as_deref() {
        Some(csv) => {
            let ids: Vec<&str> = csv
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .collect();
            state.engine.tags_by_ids(&ids)
        }
        None => state.engine.snapshot(),
    };

    let plc_names: HashMap<String, String> = state
        .settings
        .read()
        .await
        .plcs
        .iter()
        .map(|plc| (plc.id.clone(), plc.name.clone()))
        .collect();

    let tag_data: Vec<RawTagRecord> = tags
        .iter()
        .map(|tag| {
            let mut record = RawTagRecord::from(tag);
            record.plc_name = plc_names.get(&tag.plc_id).cloned();
            record
        })
        .collect();

    debug!(session, count = tag_data.len(), "served tag data");
    Json(TagDataResponse { tag_data })
}

async fn gateway_status(State(state): State<SharedAppState>) -> impl IntoResponse {
    Json(state.gateway.connection().await)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    activation_code: String,
}

async fn gateway_connect(
    State(state): State<SharedAppState>,
    Json(request): Json<ConnectRequest>,
) -> impl IntoResponse {
    let outcome = state.gateway.connect(&request.activation_code).await;
    info!(success = outcome.success, "gateway connect requested");
    Json(outcome)
}

async fn gateway_disconnect(State(state): State<SharedAppState>) -> impl IntoResponse {
    state.gateway.disconnect().await;
    (StatusCode::OK, Json(json!({ "status": "disconnected" })))
}

#[derive(Deserialize)]
pub struct ValidateRequest {
    brand: String,
    address: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub valid: bool,
    pub known_brand: bool,
}

async fn address_validate(Json(request): Json<ValidateRequest>) -> impl IntoResponse {
    Json(ValidateResponse {
        valid: validate_address(&request.brand, &request.address),
        known_brand: Brand::from_name(&request.brand).is_some(),
    })
}

async fn address_hint(Path(brand): Path<String>) -> impl IntoResponse {
    let examples = address_examples(&brand);
    if examples.is_empty() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "brand": brand, "examples": [], "error": "Unknown brand" })),
        );
    }
    (StatusCode::OK, Json(json!({ "brand": brand, "examples": examples })))
}
