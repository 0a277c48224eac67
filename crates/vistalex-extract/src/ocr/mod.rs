// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR module — engine pool, adapter, and the local and remote backends.

pub mod adapter;
pub mod engine;
pub mod local;
pub mod remote;

use std::sync::Arc;
use std::time::Duration;

use vistalex_core::config::OcrBackendConfig;

pub use adapter::{OcrAdapter, OcrJob, OcrSession, Recognition};
pub use engine::{EngineFactory, EngineLease, EnginePool, RecognitionEngine};
pub use local::{LocalEngineFactory, ModelConfig};
pub use remote::{RemoteEngineFactory, RemoteOcrEngine};

/// Factory for the configured backend, or `None` when OCR is disabled.
pub fn factory_for(config: &OcrBackendConfig) -> Option<Arc<dyn EngineFactory>> {
    match config {
        OcrBackendConfig::Disabled => None,
        OcrBackendConfig::Local { model_dir } => {
            Some(Arc::new(LocalEngineFactory::new(model_dir.clone())))
        }
        OcrBackendConfig::Remote {
            base_url,
            timeout_secs,
        } => Some(Arc::new(RemoteEngineFactory::new(
            base_url.clone(),
            Duration::from_secs(*timeout_secs),
        ))),
    }
}
