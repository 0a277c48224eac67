// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Format dispatcher — maps a declared format to exactly one strategy.

use tracing::debug;
use vistalex_core::types::{DeclaredFormat, SourceDocument, Strategy};

/// Route a declared format. Total over the closed format enum; unknown MIME
/// types were already rejected by [`DeclaredFormat::from_mime`].
pub fn dispatch(format: DeclaredFormat) -> Strategy {
    match format {
        DeclaredFormat::PlainText => Strategy::Passthrough,
        DeclaredFormat::Pdf => Strategy::PdfReconstruct,
        DeclaredFormat::WordXml => Strategy::WordRawText,
        DeclaredFormat::Image(_) => Strategy::ImageOcr,
    }
}

/// Route a document, logging the decision.
pub fn route(document: &SourceDocument) -> Strategy {
    let strategy = dispatch(document.declared_format());
    debug!(
        name = document.name(),
        format = %document.declared_format(),
        ?strategy,
        "Document routed"
    );
    strategy
}
