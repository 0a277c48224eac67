// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for VistaLex.

use thiserror::Error;

use crate::types::FailureReason;

/// Top-level error type for all extraction operations.
///
/// Never crosses the `Extractor::extract` boundary: the orchestrator folds
/// every variant into an [`Outcome::Failed`](crate::Outcome::Failed) via
/// [`ExtractError::reason`].
#[derive(Debug, Error)]
pub enum ExtractError {
    // -- Ingestion --
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("document could not be parsed: {0}")]
    CorruptPayload(String),

    // -- Recognition --
    #[error("OCR engine unavailable: {0}")]
    OcrUnavailable(String),

    // -- Remote OCR backend --
    #[error("OCR backend unreachable: {0}")]
    Network(String),

    #[error("OCR backend returned HTTP {status}: {message}")]
    Backend { status: u16, message: String },

    // -- Plumbing --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ExtractError {
    /// Collapse this error into the externally visible failure taxonomy.
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::UnsupportedFormat(_) => FailureReason::UnsupportedFormat,
            Self::CorruptPayload(_) | Self::Io(_) => FailureReason::CorruptPayload,
            Self::OcrUnavailable(_) => FailureReason::OcrUnavailable,
            Self::Network(_) => FailureReason::NetworkError,
            Self::Backend { .. } | Self::Serialization(_) => FailureReason::BackendError,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ExtractError>;
