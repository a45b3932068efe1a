pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub use config::{ConfigError, ServerConfig};
pub use error::{ApiError, ErrorResponse};
pub use state::{AppState, LoadedModel};

use handlers::{health_check, predict, root, server_info};

/// `RUST_LOG` fallback. Library `log` records arrive under `eegnet_prep::*` targets.
pub const DEFAULT_LOG_FILTER: &str = "eegnet_server=info,eegnet_prep=info,tower_http=debug";

pub fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/predict", post(predict))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
