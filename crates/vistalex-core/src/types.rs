// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the VistaLex extraction pipeline.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ExtractError;

/// Unique identifier for one extraction request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// -- Formats ------------------------------------------------------------------

/// Raster image encodings accepted for OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageSubtype {
    Jpeg,
    Png,
    Webp,
    Gif,
    Bmp,
    Tiff,
}

impl ImageSubtype {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
        }
    }
}

/// The format a caller claims a document is in.
///
/// Closed set, validated once at ingestion. Unknown MIME types are rejected
/// as [`ExtractError::UnsupportedFormat`] by [`DeclaredFormat::from_mime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclaredFormat {
    PlainText,
    Pdf,
    /// Office Open XML word-processing document (`.docx`).
    WordXml,
    Image(ImageSubtype),
}

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

impl DeclaredFormat {
    /// Canonical MIME type string.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::PlainText => "text/plain",
            Self::Pdf => "application/pdf",
            Self::WordXml => DOCX_MIME,
            Self::Image(subtype) => subtype.mime_type(),
        }
    }

    /// Parse a declared MIME type. Parameters (`; charset=utf-8`) and case
    /// are ignored.
    pub fn from_mime(mime: &str) -> Result<Self, ExtractError> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        let format = match essence.as_str() {
            "text/plain" => Self::PlainText,
            "application/pdf" => Self::Pdf,
            DOCX_MIME => Self::WordXml,
            "image/jpeg" | "image/jpg" => Self::Image(ImageSubtype::Jpeg),
            "image/png" => Self::Image(ImageSubtype::Png),
            "image/webp" => Self::Image(ImageSubtype::Webp),
            "image/gif" => Self::Image(ImageSubtype::Gif),
            "image/bmp" => Self::Image(ImageSubtype::Bmp),
            "image/tiff" => Self::Image(ImageSubtype::Tiff),
            _ => {
                return Err(ExtractError::UnsupportedFormat(if essence.is_empty() {
                    "no MIME type declared".to_string()
                } else {
                    essence
                }));
            }
        };
        Ok(format)
    }

    /// Infer the declared format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "text" => Some(Self::PlainText),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::WordXml),
            "jpg" | "jpeg" => Some(Self::Image(ImageSubtype::Jpeg)),
            "png" => Some(Self::Image(ImageSubtype::Png)),
            "webp" => Some(Self::Image(ImageSubtype::Webp)),
            "gif" => Some(Self::Image(ImageSubtype::Gif)),
            "bmp" => Some(Self::Image(ImageSubtype::Bmp)),
            "tif" | "tiff" => Some(Self::Image(ImageSubtype::Tiff)),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeclaredFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// A user-supplied document. Immutable once created; clones share the bytes.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    bytes: Arc<[u8]>,
    declared_format: DeclaredFormat,
    name: String,
}

impl SourceDocument {
    pub fn new(bytes: Vec<u8>, declared_format: DeclaredFormat, name: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            declared_format,
            name: name.into(),
        }
    }

    /// Build a document from an upload's raw MIME string.
    pub fn from_mime(
        bytes: Vec<u8>,
        mime: &str,
        name: impl Into<String>,
    ) -> Result<Self, ExtractError> {
        Ok(Self::new(bytes, DeclaredFormat::from_mime(mime)?, name))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Owned handle to the bytes, for work moved off the async executor.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn declared_format(&self) -> DeclaredFormat {
        self.declared_format
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// SHA-256 of the document bytes, hex-encoded.
    pub fn digest(&self) -> String {
        digest_bytes(&self.bytes)
    }
}

/// Hex-encoded SHA-256 of `bytes`.
pub fn digest_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

// -- PDF page reconstruction --------------------------------------------------

/// A point in PDF user space (device-independent units, origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// One run of characters read from a page's content stream.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedFragment {
    pub text: String,
    /// `None` when the content stream gave no usable text position.
    pub position: Option<Point>,
}

impl PositionedFragment {
    pub fn at(text: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            text: text.into(),
            position: Some(Point { x, y }),
        }
    }

    pub fn unpositioned(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            position: None,
        }
    }
}

/// Reading-order lines of a single page. An empty line marks a paragraph
/// (or column) break.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconstructedPage {
    lines: Vec<String>,
}

impl ReconstructedPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, line: String) {
        self.lines.push(line);
    }

    pub fn push_paragraph_break(&mut self) {
        self.lines.push(String::new());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Lines joined with newlines, terminated by a newline.
    pub fn to_text(&self) -> String {
        let mut text = self.lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }

    pub fn is_blank(&self) -> bool {
        self.lines.iter().all(|line| line.trim().is_empty())
    }
}

// -- Preprocessing ------------------------------------------------------------

/// What kind of content an image holds; selects the preprocessing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Printed text: global binarization at the midpoint.
    #[default]
    Document,
    /// Handwritten notes: perceptual luminance, higher cutoff.
    Handwriting,
    /// Photographs with captions: contrast stretch, no binarization.
    Photo,
}

/// Caller-chosen preprocessing for OCR. Immutable per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessSpec {
    pub content_type: ContentType,
    pub enhance: bool,
}

impl Default for PreprocessSpec {
    fn default() -> Self {
        Self {
            content_type: ContentType::Document,
            enhance: true,
        }
    }
}

impl PreprocessSpec {
    /// Leaves pixels untouched.
    pub fn passthrough() -> Self {
        Self {
            enhance: false,
            ..Self::default()
        }
    }
}

// -- Results ------------------------------------------------------------------

/// Which extraction strategy the dispatcher routed a document to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Decode bytes as text verbatim.
    Passthrough,
    /// Rebuild reading order from positioned fragments, escalate if scanned.
    PdfReconstruct,
    /// Raw text from the word-processor body XML.
    WordRawText,
    /// Preprocess and recognise directly.
    ImageOcr,
}

/// Why an extraction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    UnsupportedFormat,
    CorruptPayload,
    OcrUnavailable,
    NetworkError,
    BackendError,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::UnsupportedFormat => "unsupported format",
            Self::CorruptPayload => "corrupt payload",
            Self::OcrUnavailable => "OCR unavailable",
            Self::NetworkError => "network error",
            Self::BackendError => "backend error",
        };
        f.write_str(label)
    }
}

/// Classification of a finished extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Extracted,
    /// Mechanically successful, informationally empty.
    EmptyLikelyScanned,
    Failed(FailureReason),
}

/// How a result came to be. Informational only.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionDiagnostics {
    pub request_id: RequestId,
    /// SHA-256 of the input bytes.
    pub document_digest: String,
    pub strategy: Option<Strategy>,
    pub page_count: Option<usize>,
    /// Characters produced by direct extraction, before any OCR.
    pub direct_chars: Option<usize>,
    pub escalated: bool,
    pub ocr_invocations: usize,
    /// OCR invocations that returned "no text detected".
    pub ocr_empty: usize,
    /// Pages that could not be sent to OCR (no decodable raster).
    pub skipped_pages: usize,
    /// Failure detail for `Failed` outcomes.
    pub detail: Option<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl ExtractionDiagnostics {
    pub fn new(request_id: RequestId, document_digest: String) -> Self {
        Self {
            request_id,
            document_digest,
            strategy: None,
            page_count: None,
            direct_chars: None,
            escalated: false,
            ocr_invocations: 0,
            ocr_empty: 0,
            skipped_pages: 0,
            detail: None,
            started_at: Utc::now(),
            elapsed_ms: 0,
        }
    }
}

/// The single artifact returned per extraction request.
///
/// Fields are private so the invariants hold: a `Failed` result never
/// carries text.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    text: String,
    outcome: Outcome,
    diagnostics: ExtractionDiagnostics,
}

impl ExtractionResult {
    pub fn extracted(text: String, diagnostics: ExtractionDiagnostics) -> Self {
        Self {
            text,
            outcome: Outcome::Extracted,
            diagnostics,
        }
    }

    pub fn empty_likely_scanned(text: String, diagnostics: ExtractionDiagnostics) -> Self {
        Self {
            text,
            outcome: Outcome::EmptyLikelyScanned,
            diagnostics,
        }
    }

    pub fn failed(reason: FailureReason, diagnostics: ExtractionDiagnostics) -> Self {
        Self {
            text: String::new(),
            outcome: Outcome::Failed(reason),
            diagnostics,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn diagnostics(&self) -> &ExtractionDiagnostics {
        &self.diagnostics
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }
}

// -- Progress -----------------------------------------------------------------

/// Pipeline stages reported to progress listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Dispatch,
    DirectExtraction,
    Ocr,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch",
            Self::DirectExtraction => "direct_extraction",
            Self::Ocr => "ocr",
            Self::Done => "done",
        }
    }

    /// Percentage reported when the stage is entered.
    pub fn entry_percent(&self) -> u8 {
        match self {
            Self::Dispatch => 10,
            Self::DirectExtraction | Self::Ocr => 30,
            Self::Done => 100,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub percent: u8,
}

impl ProgressEvent {
    pub fn new(stage: Stage, percent: u8) -> Self {
        Self {
            stage,
            percent: percent.min(100),
        }
    }

    pub fn entered(stage: Stage) -> Self {
        Self::new(stage, stage.entry_percent())
    }
}
