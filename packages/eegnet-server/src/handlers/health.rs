use axum::{extract::State, http::StatusCode, Json};
use eegnet_prep::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
    pub model_name: Option<String>,
    pub pipeline_fingerprint: String,
    pub uptime_seconds: u64,
}

/// Server info response
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerInfoResponse {
    pub version: String,
    pub pipeline: PipelineConfig,
    pub pipeline_fingerprint: String,
    pub labels: BTreeMap<usize, String>,
}

pub async fn root() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "API is running!".to_string(),
    })
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let model_loaded = state.model.is_some();
    let response = HealthResponse {
        status: if model_loaded { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded,
        model_name: state.model.as_ref().map(|m| m.name.clone()),
        pipeline_fingerprint: state.adapter.fingerprint().to_string(),
        uptime_seconds: state.uptime_seconds(),
    };

    (StatusCode::OK, Json(response))
}

/// Server info endpoint
pub async fn server_info(State(state): State<Arc<AppState>>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        pipeline: state.adapter.config().clone(),
        pipeline_fingerprint: state.adapter.fingerprint().to_string(),
        labels: state.labels.clone(),
    })
}
