use wedding_planner_orchestrator::{agent::Orchestrator, api::start_server, config::OrchestratorConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = OrchestratorConfig::from_env()?;
    let port = config.api_port;

    if config.gemini_api_key.is_none() {
        eprintln!("GEMINI_API_KEY not set in .env; using keyword parsing and template replies");
        eprintln!("See .env.example for setup instructions");
    }

    info!("Wedding Planner Orchestrator - API Server");
    info!("Port: {}", port);

    let orchestrator = Arc::new(Orchestrator::from_config(config)?);

    info!("Orchestrator initialized");
    start_server(orchestrator, port).await?;

    Ok(())
}
