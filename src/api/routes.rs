use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use crate::tts::{Device, LoadedEngine, SpeechEngine};

/// Shared, read-only state. The engine is fixed when the state is built.
pub struct AppState {
    pub engine: Option<Arc<dyn SpeechEngine>>,
    pub device: Device,
}

impl AppState {
    pub fn new(loaded: Option<LoadedEngine>) -> Self {
        match loaded {
            Some(loaded) => Self {
                engine: Some(loaded.engine),
                device: loaded.device,
            },
            None => Self {
                engine: None,
                device: Device::Cpu,
            },
        }
    }

    pub fn gpu(&self) -> bool {
        self.engine.is_some() && self.device.is_gpu()
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/synthesize", post(handlers::synthesize))
        .route("/voices", get(handlers::list_voices))
        .route("/health", get(handlers::health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
