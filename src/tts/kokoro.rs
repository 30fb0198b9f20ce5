use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::tensor::TensorElementType;
use ort::value::{DynValue, Tensor, ValueType};

use super::loader::{EngineFactory, ModelPaths};
use super::phonemes::{self, EspeakPhonemizer, MAX_PHONEME_LENGTH};
use super::voice::VoicePack;
use super::{Device, EngineError, SpeechEngine, Synthesized};

/// Output sample rate of Kokoro-82M.
pub const SAMPLE_RATE: u32 = 24_000;

pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;

/// Element type of the model's `speed` input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpeedInput {
    Float,
    Int,
}

impl SpeedInput {
    /// Exports naming their token input `input_ids` take an i32 speed unless the
    /// declared type says otherwise.
    fn detect(ids_name: &str, declared: Option<TensorElementType>) -> Self {
        match declared {
            Some(TensorElementType::Int32) => SpeedInput::Int,
            Some(_) => SpeedInput::Float,
            None if ids_name == "input_ids" => SpeedInput::Int,
            None => SpeedInput::Float,
        }
    }
}

/// Integer speed for models that only accept whole multiples.
fn whole_speed(speed: f32) -> i32 {
    speed.round().max(1.0) as i32
}

/// Kokoro-82M running on ONNX Runtime.
pub struct KokoroEngine {
    session: Mutex<Session>,
    output_name: String,
    speed_input: SpeedInput,
    voices: VoicePack,
    phonemizer: EspeakPhonemizer,
}

impl KokoroEngine {
    pub fn load(
        paths: &ModelPaths,
        device: Device,
        phonemizer: EspeakPhonemizer,
    ) -> Result<Self, EngineError> {
        let provider = match device {
            // Fail loudly instead of silently running on CPU, so the loader can fall back
            Device::Cuda => CUDAExecutionProvider::default().build().error_on_failure(),
            Device::Cpu => CPUExecutionProvider::default().build(),
        };

        let session = Session::builder()
            .map_err(|e| EngineError::Session(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| EngineError::Session(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(4)
            .map_err(|e| EngineError::Session(format!("Failed to set threads: {}", e)))?
            .with_execution_providers([provider])
            .map_err(|e| {
                EngineError::Session(format!("Failed to register {} provider: {}", device, e))
            })?
            .commit_from_file(&paths.model)
            .map_err(|e| EngineError::Session(format!("Failed to load model: {}", e)))?;

        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| EngineError::Session("Model declares no outputs".to_string()))?;

        // Inputs are positional: token ids, style, speed
        if session.inputs.len() != 3 {
            return Err(EngineError::Session(format!(
                "Expected 3 model inputs, found {}",
                session.inputs.len()
            )));
        }
        let ids_name = session.inputs[0].name.clone();
        let declared_speed = match &session.inputs[2].input_type {
            ValueType::Tensor { ty, .. } => Some(*ty),
            _ => None,
        };
        let speed_input = SpeedInput::detect(&ids_name, declared_speed);
        tracing::debug!("Model inputs: ids='{}', speed as {:?}", ids_name, speed_input);

        let voices = VoicePack::load(&paths.voices)?;
        tracing::info!(
            "Loaded {} voices from {}",
            voices.len(),
            paths.voices.display()
        );

        Ok(Self {
            session: Mutex::new(session),
            output_name,
            speed_input,
            voices,
            phonemizer,
        })
    }

    /// Run one chunk of at most `MAX_PHONEME_LENGTH` tokens through the model.
    fn infer(&self, tokens: &[i64], style: &[f32], speed: f32) -> Result<Vec<f32>, EngineError> {
        // Pad token on both ends
        let mut ids = Vec::with_capacity(tokens.len() + 2);
        ids.push(0);
        ids.extend_from_slice(tokens);
        ids.push(0);
        let ids_len = ids.len();

        // ids: [batch, sequence], style: [batch, 256], speed: [batch]
        let ids_value = Tensor::from_array(([1_usize, ids_len], ids))
            .map_err(|e| EngineError::Inference(format!("Failed to create token tensor: {}", e)))?;
        let style_value = Tensor::from_array(([1_usize, style.len()], style.to_vec()))
            .map_err(|e| EngineError::Inference(format!("Failed to create style tensor: {}", e)))?;
        let speed_value: DynValue = match self.speed_input {
            SpeedInput::Float => Tensor::from_array(([1_usize], vec![speed])).map(|t| t.into_dyn()),
            SpeedInput::Int => {
                Tensor::from_array(([1_usize], vec![whole_speed(speed)])).map(|t| t.into_dyn())
            }
        }
        .map_err(|e| EngineError::Inference(format!("Failed to create speed tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EngineError::Inference("Session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![ids_value, style_value, speed_value])
            .map_err(|e| EngineError::Inference(format!("Inference failed: {}", e)))?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| EngineError::Inference("Missing output tensor".to_string()))?;
        let (_, data) = output.try_extract_tensor::<f32>().map_err(|e| {
            EngineError::Inference(format!("Failed to extract output tensor: {}", e))
        })?;

        let audio = data.to_vec();
        Ok(audio)
    }
}

/// Validate a request, phonemize it and feed each chunk to `run_chunk`.
///
/// `run_chunk` receives the chunk's token ids and the style row picked for its
/// length. Text that yields no tokens gives an empty buffer without running it.
fn render<P, R>(
    voices: &VoicePack,
    voice: &str,
    speed: f32,
    phonemize: P,
    mut run_chunk: R,
) -> Result<Vec<f32>, EngineError>
where
    P: FnOnce() -> Result<String, EngineError>,
    R: FnMut(&[i64], &[f32]) -> Result<Vec<f32>, EngineError>,
{
    if !speed.is_finite() || !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
        return Err(EngineError::InvalidInput(format!(
            "speed must be between {} and {}, got {}",
            MIN_SPEED, MAX_SPEED, speed
        )));
    }
    let style = voices
        .get(voice)
        .ok_or_else(|| EngineError::VoiceNotFound(voice.to_string()))?;

    let phonemes = phonemize()?;
    let mut samples = Vec::new();
    for chunk in phonemes::split_chunks(&phonemes, MAX_PHONEME_LENGTH) {
        let tokens = phonemes::tokenize(&chunk);
        if tokens.is_empty() {
            continue;
        }
        tracing::debug!("Running chunk of {} tokens", tokens.len());
        let audio = run_chunk(&tokens, style.row_for_len(tokens.len()))?;
        samples.extend_from_slice(&audio);
    }
    Ok(samples)
}

impl SpeechEngine for KokoroEngine {
    fn create(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
        lang: &str,
    ) -> Result<Synthesized, EngineError> {
        let samples = render(
            &self.voices,
            voice,
            speed,
            || self.phonemizer.phonemize(text, lang),
            |tokens, style| self.infer(tokens, style, speed),
        )?;

        Ok(Synthesized {
            samples,
            sample_rate: SAMPLE_RATE,
        })
    }
}

/// Builds [`KokoroEngine`]s for the startup loader.
#[derive(Debug, Clone)]
pub struct KokoroFactory {
    espeak_program: PathBuf,
}

impl KokoroFactory {
    pub fn new(espeak_program: impl Into<PathBuf>) -> Self {
        Self {
            espeak_program: espeak_program.into(),
        }
    }
}

impl EngineFactory for KokoroFactory {
    fn accelerator_available(&self) -> bool {
        match CUDAExecutionProvider::default().is_available() {
            Ok(available) => available,
            Err(e) => {
                tracing::warn!("Could not query CUDA execution provider: {}", e);
                false
            }
        }
    }

    fn build(
        &self,
        paths: &ModelPaths,
        device: Device,
    ) -> Result<Arc<dyn SpeechEngine>, EngineError> {
        let phonemizer = EspeakPhonemizer::new(self.espeak_program.clone());
        let engine = KokoroEngine::load(paths, device, phonemizer)?;
        Ok(Arc::new(engine))
    }
}
