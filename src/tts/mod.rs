pub mod catalog;
pub mod kokoro;
pub mod loader;
pub mod phonemes;
pub mod voice;
pub mod wav;

pub use catalog::{VoiceCatalog, CATALOG};
pub use kokoro::KokoroFactory;
pub use loader::{LoadedEngine, ModelPaths};

/// Identifier reported by the health endpoint.
pub const MODEL_ID: &str = "kokoro-82m-v1.0";

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("Failed to create inference session: {0}")]
    Session(String),

    #[error("Failed to load voice pack: {0}")]
    VoicePack(String),

    #[error("Voice '{0}' not found in voice pack")]
    VoiceNotFound(String),

    #[error("Phonemization failed: {0}")]
    Phonemizer(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Execution device an engine is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cuda,
    Cpu,
}

impl Device {
    pub fn is_gpu(self) -> bool {
        matches!(self, Device::Cuda)
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cuda => f.write_str("CUDA"),
            Device::Cpu => f.write_str("CPU"),
        }
    }
}

/// Mono audio produced by a single `create` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesized {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// A loaded speech synthesis engine.
///
/// Implementations handle their own internal synchronization; callers share
/// one instance across threads without extra locking.
pub trait SpeechEngine: Send + Sync {
    fn create(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
        lang: &str,
    ) -> Result<Synthesized, EngineError>;
}
