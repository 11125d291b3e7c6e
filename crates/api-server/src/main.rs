//! API Server Binary Entry Point

use anyhow::Context;
use dermai_api_server::{start_server, ApiState};
use dermai_common::ServiceConfig;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; variables may come from the environment
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "dermai_api_server=info,dermai_classifier=info,dermai_explain=info,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::load().context("Invalid configuration")?;
    let state = ApiState::from_config(&config).context("Failed to initialize service")?;

    if config.preload_model {
        let classifier = Arc::clone(&state.classifier);
        tokio::task::spawn_blocking(move || classifier.load().map(|_| ()))
            .await
            .context("Model loading task panicked")?
            .with_context(|| format!("Failed to load model {}", config.model_path.display()))?;
    } else {
        tracing::info!("Model preload disabled; loading on first prediction");
    }

    tracing::info!("Starting DermAI backend");
    start_server(&config.bind_addr, state).await?;

    Ok(())
}
