use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod error;
mod tts;

use api::routes::{create_router, AppState};
use config::ServerConfig;
use tts::{loader, KokoroFactory, ModelPaths};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Configuration from environment
    let config = ServerConfig::from_env()?;
    let addr = config.listen_addr()?;

    tracing::info!("Kokoro TTS Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Model directory: {}", config.model_dir.display());

    // Load the engine once; a failure leaves the server up but unready
    let paths = ModelPaths::in_dir(&config.model_dir);
    let factory = KokoroFactory::new(config.espeak_program.clone());
    let loaded = match tokio::task::spawn_blocking(move || loader::load(&paths, &factory)).await {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Model loader task failed: {}", e);
            None
        }
    };
    match &loaded {
        Some(engine) => tracing::info!(
            "Engine ready on {} (warm-up {}ms)",
            engine.device,
            engine.warmup.as_millis()
        ),
        None => tracing::warn!("Serving without a model; /synthesize will return 503"),
    }

    let state = Arc::new(AppState::new(loaded));
    let app = create_router(state);

    tracing::info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
