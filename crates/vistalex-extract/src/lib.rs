// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// vistalex-extract — Document text extraction for VistaLex.
//
// Routes a document by declared format, reconstructs reading order from PDF
// content streams, detects scans, and falls back to OCR with content-aware
// image preprocessing, reporting progress and honouring cancellation.

pub mod dispatch;
pub mod docx;
pub mod image;
pub mod ocr;
pub mod orchestrator;
pub mod pdf;
pub mod progress;

// Re-export the primary entry points so callers can use `vistalex_extract::Extractor` etc.
pub use dispatch::dispatch;
pub use docx::WordReader;
pub use image::ImagePreprocessor;
pub use ocr::{EngineFactory, EnginePool, OcrAdapter, RecognitionEngine};
pub use orchestrator::{Escalation, Extractor, PipelineState, escalation_decision};
pub use pdf::PdfReader;
pub use progress::{CancelToken, Cancelled, ProgressSink};

#[cfg(feature = "ocr")]
pub use ocr::local::LocalOcrEngine;
