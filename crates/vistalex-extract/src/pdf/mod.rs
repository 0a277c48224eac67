// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — content-stream reading and reading-order reconstruction.

pub mod reader;
pub mod reconstruct;

pub use reader::PdfReader;
pub use reconstruct::{DirectText, clean_text, reconstruct_document, reconstruct_page};
