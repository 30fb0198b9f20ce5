//! One-shot engine loading performed before the server starts listening.
//!
//! Loading never aborts the process: every failure is logged and leaves the
//! server running without an engine.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{Device, EngineError, SpeechEngine};

pub const MODEL_FILE: &str = "kokoro-v1.0.onnx";
pub const VOICES_FILE: &str = "voices-v1.0.bin";

const WARMUP_TEXT: &str = "Hello.";
const WARMUP_VOICE: &str = "af_heart";
const WARMUP_LANG: &str = "en-us";

/// Locations of the two model assets.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPaths {
    pub model: PathBuf,
    pub voices: PathBuf,
}

impl ModelPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            model: dir.join(MODEL_FILE),
            voices: dir.join(VOICES_FILE),
        }
    }
}

/// Constructs engines bound to a given device.
pub trait EngineFactory {
    fn accelerator_available(&self) -> bool;

    fn build(
        &self,
        paths: &ModelPaths,
        device: Device,
    ) -> Result<Arc<dyn SpeechEngine>, EngineError>;
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("{kind} file not found: {}", path.display())]
    MissingAsset { kind: &'static str, path: PathBuf },

    #[error("Engine construction failed on every device")]
    Construction(#[source] EngineError),

    #[error("Warm-up inference failed")]
    Warmup(#[source] EngineError),
}

/// A ready engine together with the device it ended up on.
#[derive(Clone)]
pub struct LoadedEngine {
    pub engine: Arc<dyn SpeechEngine>,
    pub device: Device,
    pub warmup: Duration,
}

impl std::fmt::Debug for LoadedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedEngine")
            .field("device", &self.device)
            .field("warmup", &self.warmup)
            .finish_non_exhaustive()
    }
}

/// Devices to try, in order, given accelerator availability.
pub fn device_attempts(accelerator_available: bool) -> Vec<Device> {
    if accelerator_available {
        vec![Device::Cuda, Device::Cpu]
    } else {
        vec![Device::Cpu]
    }
}

/// Load and warm up the engine, logging any failure.
pub fn load<F: EngineFactory>(paths: &ModelPaths, factory: &F) -> Option<LoadedEngine> {
    tracing::info!("Loading Kokoro-82M model...");
    match try_load(paths, factory) {
        Ok(loaded) => Some(loaded),
        Err(LoadError::MissingAsset { kind, path }) => {
            tracing::error!("{} file not found: {}", kind, path.display());
            tracing::error!(
                "Download {} and {} into {} and restart the server",
                MODEL_FILE,
                VOICES_FILE,
                path.parent().unwrap_or_else(|| Path::new(".")).display()
            );
            None
        }
        Err(e) => {
            tracing::error!("Failed to load model: {}", error_chain(&e));
            None
        }
    }
}

pub fn try_load<F: EngineFactory>(
    paths: &ModelPaths,
    factory: &F,
) -> Result<LoadedEngine, LoadError> {
    for (kind, path) in [("Model", &paths.model), ("Voices", &paths.voices)] {
        if !path.exists() {
            return Err(LoadError::MissingAsset {
                kind,
                path: path.clone(),
            });
        }
    }

    let accelerated = factory.accelerator_available();
    tracing::info!(
        "CUDA execution provider {}",
        if accelerated { "available" } else { "not available" }
    );

    let (engine, device) = construct(paths, factory, &device_attempts(accelerated))?;
    tracing::info!("Model loaded on {}", device);

    tracing::info!("Warming up model...");
    let start = Instant::now();
    engine
        .create(WARMUP_TEXT, WARMUP_VOICE, 1.0, WARMUP_LANG)
        .map_err(LoadError::Warmup)?;
    let warmup = start.elapsed();
    tracing::info!("Warmup complete: {}ms", warmup.as_millis());

    Ok(LoadedEngine {
        engine,
        device,
        warmup,
    })
}

fn construct<F: EngineFactory>(
    paths: &ModelPaths,
    factory: &F,
    attempts: &[Device],
) -> Result<(Arc<dyn SpeechEngine>, Device), LoadError> {
    let mut last_error = None;
    for (i, &device) in attempts.iter().enumerate() {
        match factory.build(paths, device) {
            Ok(engine) => return Ok((engine, device)),
            Err(e) => {
                if let Some(next) = attempts.get(i + 1) {
                    tracing::warn!("{} init failed, falling back to {}: {}", device, next, e);
                }
                last_error = Some(e);
            }
        }
    }

    let error = last_error
        .unwrap_or_else(|| EngineError::Session("No execution device to try".to_string()));
    Err(LoadError::Construction(error))
}

/// Render an error and all of its sources on one line.
pub fn error_chain(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::Synthesized;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct StubEngine {
        fail_warmup: bool,
    }

    impl SpeechEngine for StubEngine {
        fn create(
            &self,
            text: &str,
            voice: &str,
            _: f32,
            _: &str,
        ) -> Result<Synthesized, EngineError> {
            if self.fail_warmup {
                return Err(EngineError::VoiceNotFound(voice.to_string()));
            }
            Ok(Synthesized {
                samples: vec![0.1; text.len()],
                sample_rate: 24000,
            })
        }
    }

    struct StubFactory {
        cuda: bool,
        cuda_fails: bool,
        cpu_fails: bool,
        fail_warmup: bool,
        attempts: Mutex<Vec<Device>>,
    }

    impl StubFactory {
        fn new(cuda: bool) -> Self {
            Self {
                cuda,
                cuda_fails: false,
                cpu_fails: false,
                fail_warmup: false,
                attempts: Mutex::new(Vec::new()),
            }
        }

        fn attempts(&self) -> Vec<Device> {
            self.attempts.lock().unwrap().clone()
        }
    }

    impl EngineFactory for StubFactory {
        fn accelerator_available(&self) -> bool {
            self.cuda
        }

        fn build(
            &self,
            _: &ModelPaths,
            device: Device,
        ) -> Result<Arc<dyn SpeechEngine>, EngineError> {
            self.attempts.lock().unwrap().push(device);
            let fails = match device {
                Device::Cuda => self.cuda_fails,
                Device::Cpu => self.cpu_fails,
            };
            if fails {
                return Err(EngineError::Session(format!("{} unavailable", device)));
            }
            Ok(Arc::new(StubEngine {
                fail_warmup: self.fail_warmup,
            }))
        }
    }

    /// A scratch directory holding both asset files.
    fn asset_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(MODEL_FILE), b"onnx").unwrap();
        std::fs::write(dir.path().join(VOICES_FILE), b"npz").unwrap();
        dir
    }

    #[test]
    fn test_device_attempts() {
        assert_eq!(device_attempts(true), vec![Device::Cuda, Device::Cpu]);
        assert_eq!(device_attempts(false), vec![Device::Cpu]);
    }

    #[test]
    fn test_missing_model_file() {
        let dir = TempDir::new().unwrap();
        let factory = StubFactory::new(true);
        let err = try_load(&ModelPaths::in_dir(dir.path()), &factory).unwrap_err();
        assert!(matches!(err, LoadError::MissingAsset { kind: "Model", .. }));
        assert!(factory.attempts().is_empty());
        assert!(load(&ModelPaths::in_dir(dir.path()), &factory).is_none());
    }

    #[test]
    fn test_missing_voices_file() {
        let dir = asset_dir();
        std::fs::remove_file(dir.path().join(VOICES_FILE)).unwrap();
        let err = try_load(&ModelPaths::in_dir(dir.path()), &StubFactory::new(false)).unwrap_err();
        assert!(matches!(err, LoadError::MissingAsset { kind: "Voices", .. }));
    }

    #[test]
    fn test_prefers_cuda_when_available() {
        let dir = asset_dir();
        let factory = StubFactory::new(true);
        let loaded = try_load(&ModelPaths::in_dir(dir.path()), &factory).unwrap();
        assert_eq!(loaded.device, Device::Cuda);
        assert_eq!(factory.attempts(), vec![Device::Cuda]);
    }

    #[test]
    fn test_falls_back_to_cpu() {
        let dir = asset_dir();
        let mut factory = StubFactory::new(true);
        factory.cuda_fails = true;
        let loaded = try_load(&ModelPaths::in_dir(dir.path()), &factory).unwrap();
        assert_eq!(loaded.device, Device::Cpu);
        assert_eq!(factory.attempts(), vec![Device::Cuda, Device::Cpu]);
    }

    #[test]
    fn test_cpu_only_without_accelerator() {
        let dir = asset_dir();
        let factory = StubFactory::new(false);
        let loaded = try_load(&ModelPaths::in_dir(dir.path()), &factory).unwrap();
        assert_eq!(loaded.device, Device::Cpu);
        assert_eq!(factory.attempts(), vec![Device::Cpu]);
    }

    #[test]
    fn test_all_devices_fail() {
        let dir = asset_dir();
        let mut factory = StubFactory::new(true);
        factory.cuda_fails = true;
        factory.cpu_fails = true;
        let err = try_load(&ModelPaths::in_dir(dir.path()), &factory).unwrap_err();
        assert!(matches!(err, LoadError::Construction(_)));
        assert!(error_chain(&err).contains("CPU unavailable"));
        assert!(load(&ModelPaths::in_dir(dir.path()), &factory).is_none());
    }

    #[test]
    fn test_warmup_failure_leaves_engine_unset() {
        let dir = asset_dir();
        let mut factory = StubFactory::new(false);
        factory.fail_warmup = true;
        let err = try_load(&ModelPaths::in_dir(dir.path()), &factory).unwrap_err();
        assert!(matches!(err, LoadError::Warmup(_)));
        assert!(error_chain(&err).contains("af_heart"));
    }
}
