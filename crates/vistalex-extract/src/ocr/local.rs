// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-process recognition using the `ocrs` crate, a pure-Rust OCR engine backed
// by neural network models executed via `rten`.
//
// # Feature Gate
//
// The engine itself is only compiled with the `ocr` feature:
//
// ```toml
// vistalex-extract = { path = "crates/vistalex-extract", features = ["ocr"] }
// ```
//
// Without it, `LocalEngineFactory::create` reports the engine as unavailable
// and the orchestrator degrades accordingly.
//
// # Model Setup
//
// Two model files are required:
//
// - **Detection model** (`text-detection.rten`) — locates text regions.
// - **Recognition model** (`text-recognition.rten`) — decodes characters.
//
// Running `ocrs-cli` once downloads both to `$XDG_CACHE_HOME/ocrs`
// (typically `~/.cache/ocrs`), which is the default lookup directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::instrument;
use vistalex_core::error::{ExtractError, Result};

use super::engine::{EngineFactory, RecognitionEngine};

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// `$XDG_CACHE_HOME/ocrs`, falling back to `~/.cache/ocrs`.
pub fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Locations of the two `.rten` model files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub detection_model_path: PathBuf,
    pub recognition_model_path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::from_dir(default_model_dir())
    }
}

impl ModelConfig {
    /// Expects `dir` to contain `text-detection.rten` and `text-recognition.rten`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection_model_path: dir.join(DETECTION_MODEL_FILENAME),
            recognition_model_path: dir.join(RECOGNITION_MODEL_FILENAME),
        }
    }

    /// Verify that both model files exist.
    pub fn validate(&self) -> Result<()> {
        for (kind, path) in [
            ("detection", &self.detection_model_path),
            ("recognition", &self.recognition_model_path),
        ] {
            if !path.exists() {
                return Err(ExtractError::OcrUnavailable(format!(
                    "{} model not found at {}; run `ocrs-cli` once to download models",
                    kind,
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// Creates [`LocalOcrEngine`]s from model files on disk.
pub struct LocalEngineFactory {
    models: ModelConfig,
}

impl LocalEngineFactory {
    /// `None` uses [`default_model_dir`].
    pub fn new(model_dir: Option<PathBuf>) -> Self {
        let models = match model_dir {
            Some(dir) => ModelConfig::from_dir(dir),
            None => ModelConfig::default(),
        };
        Self { models }
    }
}

#[async_trait]
impl EngineFactory for LocalEngineFactory {
    fn name(&self) -> &str {
        "ocrs"
    }

    #[instrument(skip(self), fields(
        detection = %self.models.detection_model_path.display(),
        recognition = %self.models.recognition_model_path.display(),
    ))]
    async fn create(&self) -> Result<Box<dyn RecognitionEngine>> {
        self.models.validate()?;
        load(self.models.clone()).await
    }
}

#[cfg(not(feature = "ocr"))]
async fn load(_models: ModelConfig) -> Result<Box<dyn RecognitionEngine>> {
    Err(ExtractError::OcrUnavailable(
        "built without the `ocr` feature".into(),
    ))
}

#[cfg(feature = "ocr")]
async fn load(models: ModelConfig) -> Result<Box<dyn RecognitionEngine>> {
    let engine = tokio::task::spawn_blocking(move || engine::LocalOcrEngine::load(&models))
        .await
        .map_err(|err| ExtractError::OcrUnavailable(format!("model loading task failed: {}", err)))??;
    Ok(Box::new(engine))
}

#[cfg(feature = "ocr")]
pub use engine::LocalOcrEngine;

#[cfg(feature = "ocr")]
mod engine {
    use std::sync::Arc;

    use async_trait::async_trait;
    use image::DynamicImage;
    use ocrs::{ImageSource, OcrEngine as OcrsEngine, OcrEngineParams};
    use rten::Model;
    use tracing::{debug, info, instrument};
    use vistalex_core::error::{ExtractError, Result};

    use super::ModelConfig;
    use crate::ocr::engine::RecognitionEngine;

    /// `ocrs` engine with both models loaded.
    ///
    /// **Important:** `ocrs` and `rten` must be compiled in release mode; debug
    /// builds are 10-100x slower.
    pub struct LocalOcrEngine {
        engine: Arc<OcrsEngine>,
    }

    impl LocalOcrEngine {
        /// Load both models. This is the expensive step; the pool keeps the
        /// result around.
        pub fn load(models: &ModelConfig) -> Result<Self> {
            info!("Loading OCR detection model");
            let detection_model = Model::load_file(&models.detection_model_path).map_err(|err| {
                ExtractError::OcrUnavailable(format!(
                    "failed to load detection model from {}: {}",
                    models.detection_model_path.display(),
                    err
                ))
            })?;

            info!("Loading OCR recognition model");
            let recognition_model =
                Model::load_file(&models.recognition_model_path).map_err(|err| {
                    ExtractError::OcrUnavailable(format!(
                        "failed to load recognition model from {}: {}",
                        models.recognition_model_path.display(),
                        err
                    ))
                })?;

            let engine = OcrsEngine::new(OcrEngineParams {
                detection_model: Some(detection_model),
                recognition_model: Some(recognition_model),
                ..Default::default()
            })
            .map_err(|err| {
                ExtractError::OcrUnavailable(format!("failed to initialise OCR engine: {}", err))
            })?;

            info!("OCR engine initialised");
            Ok(Self {
                engine: Arc::new(engine),
            })
        }
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn recognize_blocking(engine: &OcrsEngine, image: &DynamicImage) -> Result<String> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|err| {
            ExtractError::OcrUnavailable(format!(
                "failed to create image source ({}x{}): {}",
                width, height, err
            ))
        })?;

        let input = engine.prepare_input(source).map_err(|err| {
            ExtractError::OcrUnavailable(format!("OCR input preparation failed: {}", err))
        })?;

        let text = engine.get_text(&input).map_err(|err| {
            ExtractError::OcrUnavailable(format!("OCR text recognition failed: {}", err))
        })?;

        debug!(lines = text.lines().count(), "Local recognition complete");
        Ok(text)
    }

    #[async_trait]
    impl RecognitionEngine for LocalOcrEngine {
        fn name(&self) -> &str {
            "ocrs"
        }

        // The bundled models are Latin-script only; the language code is not
        // used to select a model.
        async fn recognize(&self, image: DynamicImage, _language: &str) -> Result<String> {
            let engine = Arc::clone(&self.engine);
            tokio::task::spawn_blocking(move || recognize_blocking(&engine, &image))
                .await
                .map_err(|err| {
                    ExtractError::OcrUnavailable(format!("recognition task failed: {}", err))
                })?
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_paths_from_dir() {
        let config = ModelConfig::from_dir("/tmp/my-models");
        assert_eq!(
            config.detection_model_path,
            PathBuf::from("/tmp/my-models/text-detection.rten")
        );
        assert_eq!(
            config.recognition_model_path,
            PathBuf::from("/tmp/my-models/text-recognition.rten")
        );
    }

    #[test]
    fn default_dir_ends_with_expected_filenames() {
        let config = ModelConfig::default();
        assert!(config.detection_model_path.ends_with(DETECTION_MODEL_FILENAME));
        assert!(config.recognition_model_path.ends_with(RECOGNITION_MODEL_FILENAME));
    }

    #[tokio::test]
    async fn missing_models_are_unavailable() {
        let factory = LocalEngineFactory::new(Some(PathBuf::from("/nonexistent/ocr-models")));
        let err = factory.create().await.err().unwrap();
        assert!(matches!(err, ExtractError::OcrUnavailable(ref m) if m.contains("detection model")));
    }
}
