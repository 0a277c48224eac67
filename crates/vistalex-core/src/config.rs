// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Extraction configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Which recognition backend the orchestrator escalates to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum OcrBackendConfig {
    /// No OCR. Scanned inputs end as `EmptyLikelyScanned` or `Failed`.
    Disabled,
    /// In-process `ocrs` engine (requires the `ocr` feature).
    Local {
        /// Directory holding `text-detection.rten` and `text-recognition.rten`.
        /// Falls back to `$XDG_CACHE_HOME/ocrs` when unset.
        #[serde(default)]
        model_dir: Option<PathBuf>,
    },
    /// HTTP OCR service speaking the `/ocr-image` + `/ocr-pdf` contract.
    Remote {
        #[serde(default = "default_base_url")]
        base_url: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".into()
}

fn default_timeout_secs() -> u64 {
    120
}

impl OcrBackendConfig {
    pub fn remote(base_url: impl Into<String>) -> Self {
        Self::Remote {
            base_url: base_url.into(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for OcrBackendConfig {
    fn default() -> Self {
        Self::Local { model_dir: None }
    }
}

/// Tunables for one extractor instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Direct-extraction results with this many characters or fewer are
    /// treated as a likely scan and escalated to OCR.
    pub min_text_chars: usize,
    /// Language code handed to the recognition engine.
    pub language: String,
    /// Recognition backend.
    pub ocr: OcrBackendConfig,
    /// Keep one engine alive across requests (serialised) instead of
    /// instantiating per request.
    pub keep_engine_warm: bool,
    /// Bound for channel-based progress sinks.
    pub progress_capacity: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_text_chars: 50,
            language: "eng".into(),
            ocr: OcrBackendConfig::default(),
            keep_engine_warm: true,
            progress_capacity: 32,
        }
    }
}

impl ExtractionConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn ocr_enabled(&self) -> bool {
        !matches!(self.ocr, OcrBackendConfig::Disabled)
    }
}
