// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// VistaLex — Core types, error taxonomy, and configuration shared across all crates.

pub mod config;
pub mod error;
pub mod human_errors;
pub mod types;

pub use config::{ExtractionConfig, OcrBackendConfig};
pub use error::{ExtractError, Result};
pub use types::*;
