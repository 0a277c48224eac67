// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Remote recognition over HTTP.
//
// Wire contract: `POST {base}/ocr-image` with multipart field `image` (PNG) or
// `POST {base}/ocr-pdf` with field `pdf`, plus an optional `lang` field. Success
// is `{"text": "..."}`; failure is a non-2xx status with `{"error": "..."}`.

use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use vistalex_core::error::{ExtractError, Result};

use super::engine::{EngineFactory, RecognitionEngine};
use crate::image::encode_png;

#[derive(Debug, Deserialize)]
struct TextResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Builds [`RemoteOcrEngine`]s pointed at one backend.
pub struct RemoteEngineFactory {
    base_url: String,
    timeout: Duration,
}

impl RemoteEngineFactory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl EngineFactory for RemoteEngineFactory {
    fn name(&self) -> &str {
        "remote"
    }

    fn supports_documents(&self) -> bool {
        true
    }

    async fn create(&self) -> Result<Box<dyn RecognitionEngine>> {
        Ok(Box::new(RemoteOcrEngine::new(&self.base_url, self.timeout)?))
    }
}

/// HTTP client for an OCR backend.
pub struct RemoteOcrEngine {
    client: Client,
    base_url: String,
}

impl RemoteOcrEngine {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|err| {
            ExtractError::OcrUnavailable(format!("failed to build HTTP client: {}", err))
        })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self, form), fields(base = %self.base_url))]
    async fn post(&self, endpoint: &str, form: Form) -> Result<String> {
        let url = format!("{}/{}", self.base_url, endpoint);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| network_error(&url, err))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| network_error(&url, err))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).trim().to_string());
            warn!(status = status.as_u16(), %message, "OCR backend rejected request");
            return Err(ExtractError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: TextResponse = serde_json::from_slice(&body)?;
        debug!(chars = parsed.text.chars().count(), "OCR backend answered");
        Ok(parsed.text)
    }
}

fn network_error(url: &str, err: reqwest::Error) -> ExtractError {
    if err.is_timeout() {
        ExtractError::Network(format!("{}: request timed out", url))
    } else {
        ExtractError::Network(format!("{}: {}", url, err))
    }
}

fn file_part(bytes: Vec<u8>, file_name: &'static str, mime: &str) -> Result<Part> {
    Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(mime)
        .map_err(|err| ExtractError::OcrUnavailable(format!("invalid upload part: {}", err)))
}

#[async_trait]
impl RecognitionEngine for RemoteOcrEngine {
    fn name(&self) -> &str {
        "remote"
    }

    async fn recognize(&self, image: DynamicImage, language: &str) -> Result<String> {
        let png = encode_png(&image)?;
        let form = Form::new()
            .part("image", file_part(png, "image.png", "image/png")?)
            .text("lang", language.to_string());
        self.post("ocr-image", form).await
    }

    async fn recognize_pdf(&self, pdf: &[u8], language: &str) -> Result<String> {
        let form = Form::new()
            .part("pdf", file_part(pdf.to_vec(), "document.pdf", "application/pdf")?)
            .text("lang", language.to_string());
        self.post("ocr-pdf", form).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let engine = RemoteOcrEngine::new("http://ocr.local:5000/", Duration::from_secs(1)).unwrap();
        assert_eq!(engine.base_url(), "http://ocr.local:5000");
    }

    #[test]
    fn factory_accepts_whole_documents() {
        let factory = RemoteEngineFactory::new("http://ocr.local:5000", Duration::from_secs(1));
        assert!(factory.supports_documents());
    }

    #[tokio::test]
    async fn unreachable_backend_is_network_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let engine = RemoteOcrEngine::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = engine
            .recognize(DynamicImage::new_luma8(2, 2), "eng")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Network(_)));
    }
}
