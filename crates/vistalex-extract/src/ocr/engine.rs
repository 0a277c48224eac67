// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Recognition engine seam and the process-wide engine pool.
//
// An engine is expensive to create (model loading, HTTP client setup) and
// must never be handed out half-initialised. The pool owns at most one
// engine, creates it lazily, serialises access through a lease, and tears it
// down when a lease ends (unless kept warm) or when the engine reports itself
// unusable.

use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};
use vistalex_core::error::{ExtractError, Result};

/// A text recogniser over images (and, for some backends, whole PDFs).
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Recognise the text in one preprocessed image. An image without text
    /// returns `Ok` with an empty or whitespace-only string.
    async fn recognize(&self, image: DynamicImage, language: &str) -> Result<String>;

    /// Recognise a whole PDF in one call. Only backends whose factory
    /// reports [`EngineFactory::supports_documents`] override this.
    async fn recognize_pdf(&self, _pdf: &[u8], _language: &str) -> Result<String> {
        Err(ExtractError::OcrUnavailable(format!(
            "{} backend cannot recognise whole documents",
            self.name()
        )))
    }
}

/// Creates engines on demand.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Whether engines from this factory accept whole PDFs. Answered without
    /// creating an engine.
    fn supports_documents(&self) -> bool {
        false
    }

    /// Build a ready-to-use engine. Errors leave nothing behind.
    async fn create(&self) -> Result<Box<dyn RecognitionEngine>>;
}

type Slot = Option<Box<dyn RecognitionEngine>>;

/// Owns at most one engine for the lifetime of the process.
pub struct EnginePool {
    factory: Arc<dyn EngineFactory>,
    slot: Arc<Mutex<Slot>>,
    keep_warm: bool,
}

impl EnginePool {
    /// `keep_warm = false` tears the engine down at the end of every lease,
    /// giving per-request instantiation.
    pub fn new(factory: Arc<dyn EngineFactory>, keep_warm: bool) -> Self {
        Self {
            factory,
            slot: Arc::new(Mutex::new(None)),
            keep_warm,
        }
    }

    pub fn supports_documents(&self) -> bool {
        self.factory.supports_documents()
    }

    /// Create the engine if it does not exist yet. Idempotent.
    #[instrument(skip(self), fields(backend = self.factory.name()))]
    pub async fn ensure_ready(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        fill(self.factory.as_ref(), &mut slot).await
    }

    /// Whether an engine is currently initialised.
    pub async fn is_ready(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Wait for exclusive use of the engine, creating it if necessary.
    pub async fn acquire(&self) -> Result<EngineLease> {
        let mut guard = Arc::clone(&self.slot).lock_owned().await;
        fill(self.factory.as_ref(), &mut guard).await?;
        debug!(backend = self.factory.name(), "Engine leased");
        Ok(EngineLease {
            guard,
            keep_warm: self.keep_warm,
        })
    }

    /// Drop the engine. The next `acquire` re-initialises.
    pub async fn shutdown(&self) {
        if self.slot.lock().await.take().is_some() {
            info!(backend = self.factory.name(), "OCR engine shut down");
        }
    }
}

async fn fill(factory: &dyn EngineFactory, slot: &mut Slot) -> Result<()> {
    if slot.is_none() {
        info!(backend = factory.name(), "Initialising OCR engine");
        let engine = factory.create().await?;
        *slot = Some(engine);
    }
    Ok(())
}

/// Exclusive use of the pooled engine. Dropping the lease returns the engine
/// to the pool, or tears it down when the pool is not kept warm.
pub struct EngineLease {
    guard: OwnedMutexGuard<Slot>,
    keep_warm: bool,
}

impl EngineLease {
    fn engine(&self) -> Result<&dyn RecognitionEngine> {
        self.guard
            .as_deref()
            .ok_or_else(|| ExtractError::OcrUnavailable("engine was torn down".into()))
    }

    pub async fn recognize(&mut self, image: DynamicImage, language: &str) -> Result<String> {
        let result = self.engine()?.recognize(image, language).await;
        self.teardown_if_unusable(&result);
        result
    }

    pub async fn recognize_pdf(&mut self, pdf: &[u8], language: &str) -> Result<String> {
        let result = self.engine()?.recognize_pdf(pdf, language).await;
        self.teardown_if_unusable(&result);
        result
    }

    fn teardown_if_unusable(&mut self, result: &Result<String>) {
        if let Err(ExtractError::OcrUnavailable(reason)) = result {
            warn!(%reason, "Engine failed; tearing it down");
            self.guard.take();
        }
    }
}

impl Drop for EngineLease {
    fn drop(&mut self) {
        if !self.keep_warm && self.guard.take().is_some() {
            debug!("Engine released with its lease");
        }
    }
}
