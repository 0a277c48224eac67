// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR adapter — uniform "image in, text or nothing out" contract over any
// pooled recognition engine.

use std::sync::Arc;

use image::DynamicImage;
use tracing::{debug, instrument};
use vistalex_core::error::{ExtractError, Result};
use vistalex_core::types::PreprocessSpec;

use super::engine::{EngineLease, EnginePool};
use crate::image::preprocess;

/// One OCR invocation.
#[derive(Debug, Clone)]
pub struct OcrJob {
    pub image: DynamicImage,
    pub language: String,
    pub spec: PreprocessSpec,
}

/// What recognition produced. An empty page is a result, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    Text(String),
    NoTextDetected,
}

impl Recognition {
    fn from_raw(raw: String) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self::NoTextDetected
        } else {
            Self::Text(trimmed.to_string())
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::NoTextDetected => None,
        }
    }
}

/// Front door to the engine pool for one language.
#[derive(Clone)]
pub struct OcrAdapter {
    pool: Arc<EnginePool>,
    language: String,
}

impl OcrAdapter {
    pub fn new(pool: Arc<EnginePool>, language: impl Into<String>) -> Self {
        Self {
            pool,
            language: language.into(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn pool(&self) -> &Arc<EnginePool> {
        &self.pool
    }

    /// Build a job for `image` in this adapter's language.
    pub fn job(&self, image: DynamicImage, spec: PreprocessSpec) -> OcrJob {
        OcrJob {
            image,
            language: self.language.clone(),
            spec,
        }
    }

    /// Start a session. The engine is leased on first use and released when
    /// the session is dropped, on every exit path.
    pub fn session(&self) -> OcrSession {
        OcrSession {
            pool: Arc::clone(&self.pool),
            lease: None,
        }
    }

    /// Run a single job in its own session.
    pub async fn recognize(&self, job: OcrJob) -> Result<Recognition> {
        self.session().recognize(job).await
    }
}

/// A run of OCR jobs sharing one engine lease.
pub struct OcrSession {
    pool: Arc<EnginePool>,
    lease: Option<EngineLease>,
}

impl OcrSession {
    async fn lease(&mut self) -> Result<&mut EngineLease> {
        if self.lease.is_none() {
            self.lease = Some(self.pool.acquire().await?);
        }
        self.lease
            .as_mut()
            .ok_or_else(|| ExtractError::OcrUnavailable("engine lease lost".into()))
    }

    /// Whether the backend accepts whole PDFs. Never touches the engine.
    pub fn supports_documents(&self) -> bool {
        self.pool.supports_documents()
    }

    /// Preprocess and recognise one image.
    #[instrument(skip_all, fields(
        width = job.image.width(),
        height = job.image.height(),
        language = %job.language,
    ))]
    pub async fn recognize(&mut self, job: OcrJob) -> Result<Recognition> {
        let OcrJob {
            image,
            language,
            spec,
        } = job;

        let prepared = tokio::task::spawn_blocking(move || preprocess(image, &spec))
            .await
            .map_err(|err| {
                ExtractError::OcrUnavailable(format!("preprocessing task failed: {}", err))
            })?;

        let raw = self.lease().await?.recognize(prepared, &language).await?;
        let recognition = Recognition::from_raw(raw);
        debug!(
            chars = recognition.text().map_or(0, |t| t.chars().count()),
            "Recognition finished"
        );
        Ok(recognition)
    }

    /// Recognise a whole PDF (remote backends only).
    #[instrument(skip_all, fields(pdf_len = pdf.len(), language = %language))]
    pub async fn recognize_document(&mut self, pdf: &[u8], language: &str) -> Result<Recognition> {
        let raw = self.lease().await?.recognize_pdf(pdf, language).await?;
        Ok(Recognition::from_raw(raw))
    }

    /// End the session early, returning the engine to the pool.
    pub fn release(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_is_no_text() {
        assert_eq!(Recognition::from_raw(" \n\t ".into()), Recognition::NoTextDetected);
        assert_eq!(Recognition::from_raw(String::new()), Recognition::NoTextDetected);
    }

    #[test]
    fn text_is_trimmed() {
        assert_eq!(
            Recognition::from_raw("  Invoice 42\n".into()),
            Recognition::Text("Invoice 42".into())
        );
        assert_eq!(Recognition::from_raw("ok".into()).text(), Some("ok"));
    }
}
