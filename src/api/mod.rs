pub mod handlers;
pub mod routes;

use serde::{Deserialize, Serialize};

use crate::tts::VoiceCatalog;

#[derive(Debug, Deserialize)]
pub struct SynthesizeRequest {
    pub text: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default = "default_lang")]
    pub lang: String,
    /// Accepted for client compatibility; audio is always returned as WAV.
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_voice() -> String {
    "af_heart".to_string()
}

fn default_speed() -> f32 {
    1.0
}

fn default_lang() -> String {
    "en-us".to_string()
}

fn default_format() -> String {
    "wav".to_string()
}

#[derive(Debug, Serialize)]
pub struct SynthesizeResponse {
    pub success: bool,
    #[serde(rename = "audioData")]
    pub audio_data: String,
    pub format: &'static str,
    pub inference_ms: u64,
    pub gpu: bool,
}

#[derive(Debug, Serialize)]
pub struct VoicesResponse {
    pub voices: VoiceCatalog,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub gpu: bool,
    pub model: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request: SynthesizeRequest = serde_json::from_str(r#"{"text": "Hi"}"#).unwrap();
        assert_eq!(request.text, "Hi");
        assert_eq!(request.voice, "af_heart");
        assert_eq!(request.speed, 1.0);
        assert_eq!(request.lang, "en-us");
        assert_eq!(request.format, "wav");
    }

    #[test]
    fn test_request_requires_text() {
        let result = serde_json::from_str::<SynthesizeRequest>(r#"{"voice": "af_bella"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_response_field_names() {
        let response = SynthesizeResponse {
            success: true,
            audio_data: "UklGRg==".to_string(),
            format: "wav",
            inference_ms: 12,
            gpu: false,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["audioData"], "UklGRg==");
        assert_eq!(value["inference_ms"], 12);
        assert!(value.get("audio_data").is_none());
    }
}
