use server::config::{Settings, API_TITLE, API_VERSION};
use server::{app, spawn_cleanup, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "server=info,tower_http=info".into()),
        )
        .init();

    let settings = Settings::from_env();
    let addr = settings.bind_addr();
    tracing::info!("Starting {} v{}", API_TITLE, API_VERSION);
    tracing::info!("Max models per user: {}", settings.max_models_per_user);
    tracing::info!("Model files in {}", settings.temp_dir.display());
    if settings.ai_api_key.is_none() {
        tracing::warn!("No AI API key set, prompts will use template models");
    }
    if settings.dsl_command.is_none() {
        tracing::warn!("DSL_COMMAND not set, DSL programs will produce placeholder models");
    }

    let state = AppState::new(settings)?;
    let storage = state.storage.clone();
    let cleanup = spawn_cleanup(storage.clone());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cleanup.abort();
    let removed = storage.cleanup_expired().await;
    tracing::info!("Shutdown complete, removed {} expired model files", removed);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
