use eegnet_prep::PipelineConfig;
use eegnet_server::{build_router, AppState, ServerConfig, DEFAULT_LOG_FILTER};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // `init` also installs the `log` bridge for eegnet-prep
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    info!("🚀 Starting EEGNet inference server v{}", VERSION);

    let serving = match &config.pipeline_config {
        Some(path) => {
            info!("   Pipeline configuration: {}", path.display());
            Some(PipelineConfig::from_file(path)?)
        }
        None => None,
    };

    // A parity mismatch is fatal; a missing or unreadable artifact is not
    let state = AppState::load(&config.model_path, serving)?;
    info!("   Pipeline fingerprint: {}", state.adapter.fingerprint());

    let app = build_router(Arc::new(state), config.max_body_bytes);

    let addr: SocketAddr = config.bind_address().parse()?;
    info!("🎧 Listening on http://{}", addr);
    info!("🔑 Health endpoint: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
