// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fallback orchestrator — sequences direct extraction and OCR escalation,
// classifies the outcome, and reports progress.
//
// Per request: Idle → DirectAttempted → (Accepted | Escalating) → Done.
// Plain text and images skip DirectAttempted. Every internal error is folded
// into `Outcome::Failed` here; only cancellation escapes, as `Cancelled`.

use std::sync::Arc;
use std::time::Instant;

use tracing::{Span, debug, field, info, instrument, warn};
use vistalex_core::config::ExtractionConfig;
use vistalex_core::error::ExtractError;
use vistalex_core::types::{
    ExtractionDiagnostics, ExtractionResult, PreprocessSpec, ProgressEvent, RequestId,
    SourceDocument, Stage, Strategy, digest_bytes,
};

use crate::dispatch;
use crate::docx::WordReader;
use crate::image::ImagePreprocessor;
use crate::ocr::{self, EngineFactory, EnginePool, OcrAdapter, Recognition};
use crate::pdf::{PdfReader, reconstruct_document};
use crate::progress::{CancelToken, Cancelled, ProgressSink};

// -- State machine ------------------------------------------------------------

/// Where a request is in the fallback sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    DirectAttempted,
    Accepted,
    Escalating,
    Done,
}

impl PipelineState {
    pub fn can_advance_to(self, next: Self) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, DirectAttempted)
                | (Idle, Escalating)
                | (Idle, Done)
                | (DirectAttempted, Accepted)
                | (DirectAttempted, Escalating)
                | (DirectAttempted, Done)
                | (Accepted, Done)
                | (Escalating, Done)
        )
    }
}

struct Machine {
    state: PipelineState,
}

impl Machine {
    fn new() -> Self {
        Self {
            state: PipelineState::Idle,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(from = ?self.state, to = ?next, "State transition");
        self.state = next;
    }
}

/// Whether direct-extraction output is good enough to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    Accept,
    Escalate,
}

/// The single escalation predicate: escalate when the reader flagged a likely
/// scan, or when the trimmed text has `min_text_chars` characters or fewer.
pub fn escalation_decision(text: &str, likely_scanned: bool, min_text_chars: usize) -> Escalation {
    if likely_scanned || text.trim().chars().count() <= min_text_chars {
        Escalation::Escalate
    } else {
        Escalation::Accept
    }
}

/// Progress percentage after `done` of `total` OCR units (30-80 band).
pub fn ocr_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 80;
    }
    let done = done.min(total);
    (30 + 50 * done / total) as u8
}

// -- Internal control flow ----------------------------------------------------

/// How a strategy finished when it did not fail.
enum Verdict {
    Extracted(String),
    LikelyScanned(String),
}

/// Why a strategy stopped early.
enum Halt {
    Cancelled,
    Failed(ExtractError),
}

impl From<ExtractError> for Halt {
    fn from(err: ExtractError) -> Self {
        Self::Failed(err)
    }
}

impl From<Cancelled> for Halt {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Per-call context threaded through the strategies.
struct Run<'a> {
    document: &'a SourceDocument,
    spec: PreprocessSpec,
    progress: &'a ProgressSink,
    cancel: &'a CancelToken,
    machine: Machine,
    diagnostics: ExtractionDiagnostics,
}

impl Run<'_> {
    fn checkpoint(&self) -> Result<(), Halt> {
        Ok(self.cancel.check()?)
    }

    fn enter(&self, stage: Stage) {
        info!(stage = stage.as_str(), "Stage entered");
        self.progress.emit(ProgressEvent::entered(stage));
    }
}

// -- Extractor ----------------------------------------------------------------

/// Entry point: one instance per process (or per configuration), shared by
/// concurrent requests. Only the OCR engine pool is shared between calls.
pub struct Extractor {
    config: ExtractionConfig,
    ocr: Option<OcrAdapter>,
}

impl Extractor {
    /// Build from configuration, wiring the configured OCR backend.
    pub fn new(config: ExtractionConfig) -> Self {
        match ocr::factory_for(&config.ocr) {
            Some(factory) => Self::with_engine_factory(config, factory),
            None => Self::without_ocr(config),
        }
    }

    /// Use a caller-supplied engine factory instead of the configured backend.
    pub fn with_engine_factory(config: ExtractionConfig, factory: Arc<dyn EngineFactory>) -> Self {
        let pool = Arc::new(EnginePool::new(factory, config.keep_engine_warm));
        let adapter = OcrAdapter::new(pool, config.language.clone());
        Self {
            config,
            ocr: Some(adapter),
        }
    }

    /// No OCR: scans end as `EmptyLikelyScanned`, images as `Failed`.
    pub fn without_ocr(config: ExtractionConfig) -> Self {
        Self { config, ocr: None }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn ocr(&self) -> Option<&OcrAdapter> {
        self.ocr.as_ref()
    }

    /// Initialise the OCR engine ahead of the first request.
    pub async fn warm_up(&self) -> vistalex_core::Result<()> {
        match &self.ocr {
            Some(adapter) => adapter.pool().ensure_ready().await,
            None => Ok(()),
        }
    }

    /// Tear down the pooled OCR engine.
    pub async fn shutdown(&self) {
        if let Some(adapter) = &self.ocr {
            adapter.pool().shutdown().await;
        }
    }

    /// Extract text from `document`.
    ///
    /// Always yields a definite [`ExtractionResult`] unless `cancel` fires, in
    /// which case the in-flight OCR job is dropped (releasing its engine
    /// lease) and `Err(Cancelled)` is returned. No `Done` progress event is
    /// emitted after cancellation.
    #[instrument(skip_all, fields(
        name = document.name(),
        format = %document.declared_format(),
        bytes = document.bytes().len(),
        request_id = field::Empty,
    ))]
    pub async fn extract(
        &self,
        document: SourceDocument,
        spec: Option<PreprocessSpec>,
        progress: ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ExtractionResult, Cancelled> {
        cancel.check()?;

        let request_id = RequestId::new();
        Span::current().record("request_id", field::display(&request_id));
        let diagnostics = ExtractionDiagnostics::new(request_id, document.digest());

        let run = Run {
            document: &document,
            spec: spec.unwrap_or_default(),
            progress: &progress,
            cancel,
            machine: Machine::new(),
            diagnostics,
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Extraction cancelled");
                return Err(Cancelled);
            }
            result = self.run(run) => result?,
        };

        cancel.check()?;
        progress.emit(ProgressEvent::entered(Stage::Done));
        info!(
            outcome = ?result.outcome(),
            chars = result.text().chars().count(),
            elapsed_ms = result.diagnostics().elapsed_ms,
            "Extraction finished"
        );
        Ok(result)
    }

    /// Extract from an upload whose format is still a raw MIME string.
    ///
    /// An unrecognised MIME type yields `Failed(UnsupportedFormat)` without
    /// running any strategy.
    pub async fn extract_upload(
        &self,
        bytes: Vec<u8>,
        mime: &str,
        name: &str,
        spec: Option<PreprocessSpec>,
        progress: ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ExtractionResult, Cancelled> {
        let digest = digest_bytes(&bytes);
        match SourceDocument::from_mime(bytes, mime, name) {
            Ok(document) => self.extract(document, spec, progress, cancel).await,
            Err(err) => {
                cancel.check()?;
                warn!(name, mime, "Rejected at ingestion: {}", err);
                let mut diagnostics = ExtractionDiagnostics::new(RequestId::new(), digest);
                diagnostics.detail = Some(err.to_string());
                progress.emit(ProgressEvent::entered(Stage::Dispatch));
                progress.emit(ProgressEvent::entered(Stage::Done));
                Ok(ExtractionResult::failed(err.reason(), diagnostics))
            }
        }
    }

    async fn run(&self, mut run: Run<'_>) -> Result<ExtractionResult, Cancelled> {
        let started = Instant::now();
        run.enter(Stage::Dispatch);

        let strategy = dispatch::route(run.document);
        run.diagnostics.strategy = Some(strategy);

        let verdict = match strategy {
            Strategy::Passthrough => self.passthrough(&mut run),
            Strategy::PdfReconstruct => self.pdf(&mut run).await,
            Strategy::WordRawText => self.word(&mut run).await,
            Strategy::ImageOcr => self.image(&mut run).await,
        };

        if run.machine.state != PipelineState::Done {
            run.machine.advance(PipelineState::Done);
        }
        let mut diagnostics = run.diagnostics;
        diagnostics.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = match verdict {
            Ok(Verdict::Extracted(text)) => ExtractionResult::extracted(text, diagnostics),
            Ok(Verdict::LikelyScanned(text)) => {
                ExtractionResult::empty_likely_scanned(text, diagnostics)
            }
            Err(Halt::Failed(err)) => {
                warn!(reason = %err.reason(), "Extraction failed: {}", err);
                diagnostics.detail = Some(err.to_string());
                ExtractionResult::failed(err.reason(), diagnostics)
            }
            Err(Halt::Cancelled) => return Err(Cancelled),
        };
        Ok(result)
    }

    // -- Strategies -----------------------------------------------------------

    fn passthrough(&self, run: &mut Run<'_>) -> Result<Verdict, Halt> {
        let text = decode_plain_text(run.document.bytes())?;
        run.diagnostics.direct_chars = Some(text.chars().count());
        Ok(Verdict::Extracted(text))
    }

    async fn pdf(&self, run: &mut Run<'_>) -> Result<Verdict, Halt> {
        run.enter(Stage::DirectExtraction);
        let bytes = run.document.shared_bytes();
        let (reader, direct) = blocking(move || {
            let reader = PdfReader::from_bytes(&bytes)?;
            let direct = reconstruct_document(&reader)?;
            Ok((Arc::new(reader), direct))
        })
        .await?;
        run.machine.advance(PipelineState::DirectAttempted);
        run.diagnostics.page_count = Some(direct.page_count);
        run.diagnostics.direct_chars = Some(direct.text.chars().count());
        run.checkpoint()?;

        let decision = escalation_decision(
            &direct.text,
            direct.likely_scanned,
            self.config.min_text_chars,
        );
        if decision == Escalation::Accept {
            run.machine.advance(PipelineState::Accepted);
            return Ok(Verdict::Extracted(direct.text));
        }

        let Some(adapter) = &self.ocr else {
            info!("Direct text below threshold and no OCR backend configured");
            return Ok(Verdict::LikelyScanned(direct.text));
        };

        run.machine.advance(PipelineState::Escalating);
        run.diagnostics.escalated = true;
        run.enter(Stage::Ocr);

        let mut session = adapter.session();
        let pages = reader.page_numbers();
        let mut texts = Vec::new();

        for (index, page_number) in pages.iter().copied().enumerate() {
            run.checkpoint()?;
            let raster = {
                let reader = Arc::clone(&reader);
                blocking(move || reader.page_raster(page_number)).await?
            };
            match raster {
                Some(image) => {
                    run.diagnostics.ocr_invocations += 1;
                    match session.recognize(adapter.job(image, run.spec)).await? {
                        Recognition::Text(text) => texts.push(text),
                        Recognition::NoTextDetected => run.diagnostics.ocr_empty += 1,
                    }
                }
                None => {
                    warn!(page_number, "No decodable raster on page; skipped");
                    run.diagnostics.skipped_pages += 1;
                }
            }
            run.progress
                .emit(ProgressEvent::new(Stage::Ocr, ocr_percent(index + 1, pages.len())));
        }

        if run.diagnostics.ocr_invocations == 0 && session.supports_documents() {
            info!("No page rasters; sending whole document to backend");
            run.diagnostics.ocr_invocations += 1;
            match session
                .recognize_document(run.document.bytes(), adapter.language())
                .await?
            {
                Recognition::Text(text) => texts.push(text),
                Recognition::NoTextDetected => run.diagnostics.ocr_empty += 1,
            }
            run.progress.emit(ProgressEvent::new(Stage::Ocr, 80));
        }
        session.release();

        if texts.is_empty() {
            Ok(Verdict::LikelyScanned(direct.text))
        } else {
            Ok(Verdict::Extracted(texts.join("\n\n")))
        }
    }

    async fn word(&self, run: &mut Run<'_>) -> Result<Verdict, Halt> {
        run.enter(Stage::DirectExtraction);
        let bytes = run.document.shared_bytes();
        let text = blocking(move || {
            let mut reader = WordReader::from_bytes(&bytes)?;
            reader.raw_text()
        })
        .await?;
        run.machine.advance(PipelineState::DirectAttempted);
        run.diagnostics.direct_chars = Some(text.chars().count());
        run.checkpoint()?;

        let likely_scanned = text.trim().is_empty();
        if escalation_decision(&text, likely_scanned, self.config.min_text_chars)
            == Escalation::Accept
        {
            run.machine.advance(PipelineState::Accepted);
            return Ok(Verdict::Extracted(text));
        }

        run.machine.advance(PipelineState::Escalating);
        let bytes = run.document.shared_bytes();
        let images = blocking(move || {
            let mut reader = WordReader::from_bytes(&bytes)?;
            reader.media_images()
        })
        .await?;
        if images.is_empty() {
            debug!("Short document with no embedded images; nothing to recognise");
            return Ok(Verdict::LikelyScanned(text));
        }

        let Some(adapter) = &self.ocr else {
            info!(images = images.len(), "Embedded images present but no OCR backend configured");
            return Ok(Verdict::LikelyScanned(text));
        };

        run.diagnostics.escalated = true;
        run.enter(Stage::Ocr);

        let mut session = adapter.session();
        let total = images.len();
        let mut recognized = Vec::with_capacity(total);

        for (index, image) in images.into_iter().enumerate() {
            run.checkpoint()?;
            run.diagnostics.ocr_invocations += 1;
            match session.recognize(adapter.job(image, run.spec)).await? {
                Recognition::Text(found) => recognized.push(found),
                Recognition::NoTextDetected => run.diagnostics.ocr_empty += 1,
            }
            run.progress
                .emit(ProgressEvent::new(Stage::Ocr, ocr_percent(index + 1, total)));
        }
        session.release();

        if recognized.is_empty() {
            return Ok(Verdict::LikelyScanned(text));
        }
        let mut parts = Vec::with_capacity(recognized.len() + 1);
        if !text.trim().is_empty() {
            parts.push(text);
        }
        parts.extend(recognized);
        Ok(Verdict::Extracted(parts.join("\n\n")))
    }

    async fn image(&self, run: &mut Run<'_>) -> Result<Verdict, Halt> {
        let bytes = run.document.shared_bytes();
        let image =
            blocking(move || Ok(ImagePreprocessor::from_bytes(&bytes)?.into_dynamic())).await?;

        let Some(adapter) = &self.ocr else {
            return Err(Halt::Failed(ExtractError::OcrUnavailable(
                "no OCR backend configured".into(),
            )));
        };

        run.machine.advance(PipelineState::Escalating);
        run.enter(Stage::Ocr);
        run.diagnostics.page_count = Some(1);
        run.diagnostics.ocr_invocations = 1;

        let recognition = adapter.recognize(adapter.job(image, run.spec)).await?;
        run.progress.emit(ProgressEvent::new(Stage::Ocr, ocr_percent(1, 1)));

        match recognition {
            Recognition::Text(text) => Ok(Verdict::Extracted(text)),
            Recognition::NoTextDetected => {
                run.diagnostics.ocr_empty = 1;
                Ok(Verdict::LikelyScanned(String::new()))
            }
        }
    }
}

/// Run container parsing and decoding on the blocking pool so large documents
/// never stall the executor. A dropped caller stops waiting; the work itself
/// runs to completion.
async fn blocking<T, F>(work: F) -> Result<T, Halt>
where
    F: FnOnce() -> vistalex_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let span = Span::current();
    let outcome = tokio::task::spawn_blocking(move || span.in_scope(work))
        .await
        .map_err(|err| {
            ExtractError::CorruptPayload(format!("decoding task failed: {}", err))
        })?;
    Ok(outcome?)
}

/// Strict UTF-8 with a leading byte-order mark stripped and trailing
/// whitespace trimmed.
pub fn decode_plain_text(bytes: &[u8]) -> vistalex_core::Result<String> {
    let text = std::str::from_utf8(bytes).map_err(|err| {
        ExtractError::CorruptPayload(format!("plain text is not valid UTF-8: {}", err))
    })?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    Ok(text.trim_end().to_string())
}
