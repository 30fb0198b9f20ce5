use axum::{extract::rejection::JsonRejection, extract::State, Json};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::sync::Arc;
use std::time::Instant;

use super::{HealthResponse, SynthesizeRequest, SynthesizeResponse, VoicesResponse};
use crate::api::routes::AppState;
use crate::error::AppError;
use crate::tts::{wav, CATALOG, MODEL_ID};

pub async fn synthesize(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SynthesizeRequest>, JsonRejection>,
) -> Result<Json<SynthesizeResponse>, AppError> {
    // Readiness is checked before the body so an unready server always answers 503
    let engine = state.engine.clone().ok_or(AppError::ModelNotLoaded)?;
    let Json(request) = payload?;

    if !request.format.eq_ignore_ascii_case("wav") {
        tracing::debug!("Format '{}' requested, returning wav", request.format);
    }

    // Inference is CPU bound; keep it off the async workers
    let (result, elapsed, request) = tokio::task::spawn_blocking(move || {
        let start = Instant::now();
        let result = engine.create(&request.text, &request.voice, request.speed, &request.lang);
        (result, start.elapsed(), request)
    })
    .await
    .map_err(|e| AppError::Synthesis(format!("Synthesis task failed: {}", e)))?;

    // Logged once by AppError::into_response
    let audio = result.map_err(|e| AppError::Synthesis(e.to_string()))?;

    let wav = wav::samples_to_wav(&audio.samples, audio.sample_rate)?;
    let audio_data = BASE64.encode(&wav);
    let inference_ms = (elapsed.as_secs_f64() * 1000.0).round() as u64;

    tracing::info!(
        "Synthesized: voice={}, len={} chars, time={}ms, audio={} bytes",
        request.voice,
        request.text.chars().count(),
        inference_ms,
        wav.len()
    );

    Ok(Json(SynthesizeResponse {
        success: true,
        audio_data,
        format: "wav",
        inference_ms,
        gpu: state.gpu(),
    }))
}

pub async fn list_voices() -> Json<VoicesResponse> {
    Json(VoicesResponse { voices: CATALOG })
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let loaded = state.engine.is_some();
    Json(HealthResponse {
        status: if loaded { "ok" } else { "model_not_loaded" },
        model_loaded: loaded,
        gpu: state.gpu(),
        model: MODEL_ID,
    })
}
