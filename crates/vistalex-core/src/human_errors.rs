// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plain-language explanations of extraction outcomes.
//
// Readers of extracted text are often the least technical users of the
// system, so every non-success outcome maps to a short message and one
// concrete thing to try next.

use crate::types::{ExtractionResult, FailureReason, Outcome};

/// Severity of an outcome from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Network blip or busy service. Trying again may work.
    Transient,
    /// The user has to change something (different file, enable OCR).
    ActionRequired,
    /// Retrying the same input will not help.
    Permanent,
}

/// A message and suggestion for display alongside an empty or failed result.
#[derive(Debug, Clone)]
pub struct HumanHint {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether resubmitting the same document may succeed.
    pub retriable: bool,
    pub severity: Severity,
}

/// Explain a result. `Extracted` needs no explanation and yields `None`.
pub fn humanize(result: &ExtractionResult) -> Option<HumanHint> {
    match result.outcome() {
        Outcome::Extracted => None,
        Outcome::EmptyLikelyScanned => Some(humanize_empty(result)),
        Outcome::Failed(reason) => Some(humanize_failure(
            reason,
            result.diagnostics().detail.as_deref().unwrap_or_default(),
        )),
    }
}

fn humanize_empty(result: &ExtractionResult) -> HumanHint {
    let diagnostics = result.diagnostics();
    if diagnostics.escalated && diagnostics.ocr_invocations > 0 {
        HumanHint {
            message: "We couldn't find any readable text.".into(),
            suggestion: "Text recognition ran but found nothing. If the document has text, try a clearer scan or choose the handwriting setting.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        }
    } else {
        HumanHint {
            message: "This looks like a scanned document.".into(),
            suggestion: "It contains little or no selectable text. Turn on text recognition (OCR) and try again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        }
    }
}

/// Map a failure reason (plus backend detail) to a hint.
pub fn humanize_failure(reason: FailureReason, detail: &str) -> HumanHint {
    match reason {
        FailureReason::UnsupportedFormat => HumanHint {
            message: "This type of file isn't supported.".into(),
            suggestion: "Try saving it as a PDF, Word (.docx), plain text, or image file first.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        FailureReason::CorruptPayload => HumanHint {
            message: "This file couldn't be opened.".into(),
            suggestion: "The file may be damaged or not what its name says. Try opening it on a computer first, or export it again.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        FailureReason::OcrUnavailable => HumanHint {
            message: "Text recognition isn't available right now.".into(),
            suggestion: "The recognition models may be missing. Install them or point to a recognition server, then try again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        FailureReason::NetworkError => {
            let lower = detail.to_ascii_lowercase();
            if lower.contains("timed out") || lower.contains("timeout") {
                HumanHint {
                    message: "The recognition service took too long.".into(),
                    suggestion: "Large scans can be slow. Wait a moment and try again.".into(),
                    retriable: true,
                    severity: Severity::Transient,
                }
            } else {
                HumanHint {
                    message: "We couldn't reach the recognition service.".into(),
                    suggestion: "Check your connection and that the service is running, then try again.".into(),
                    retriable: true,
                    severity: Severity::Transient,
                }
            }
        }

        FailureReason::BackendError => HumanHint {
            message: "The recognition service had a problem.".into(),
            suggestion: if detail.is_empty() {
                "Try again. If this keeps happening, please report it.".into()
            } else {
                format!("Try again. If this keeps happening, please report it. ({detail})")
            },
            retriable: true,
            severity: Severity::Transient,
        },
    }
}
