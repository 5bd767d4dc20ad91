use smart_audit::{
    api::{start_server, ApiState},
    config::ServiceConfig,
    registry::RunnerRegistry,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables before the filter reads RUST_LOG
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServiceConfig::from_env()?;

    info!("🚀 Smart Audit - API Server");
    info!("📍 Bind: {}", config.bind_address());

    // A missing knowledge file aborts startup
    let registry = RunnerRegistry::from_config(&config)?;

    info!("✅ Agent pipeline initialized");

    let state = ApiState {
        registry: Arc::new(registry),
        stream_pacing: config.stream_pacing,
    };

    start_server(state, &config.bind_address()).await?;

    Ok(())
}
