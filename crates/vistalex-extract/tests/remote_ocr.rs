// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Remote OCR backend tests against an in-process axum server.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use common::{PdfPage, pdf_document, png_document};
use serde_json::{Value, json};
use vistalex_core::config::{ExtractionConfig, OcrBackendConfig};
use vistalex_core::error::ExtractError;
use vistalex_core::types::{FailureReason, Outcome, SourceDocument};
use vistalex_extract::ocr::RemoteOcrEngine;
use vistalex_extract::{CancelToken, Extractor, ProgressSink, RecognitionEngine};

/// Multipart fields received by the fake backend, as `(endpoint, field, bytes)`.
#[derive(Default)]
struct Seen {
    fields: Mutex<Vec<(&'static str, String, Vec<u8>)>>,
}

impl Seen {
    fn field(&self, endpoint: &str, name: &str) -> Option<Vec<u8>> {
        self.fields
            .lock()
            .unwrap()
            .iter()
            .find(|(e, n, _)| *e == endpoint && n == name)
            .map(|(_, _, bytes)| bytes.clone())
    }
}

async fn record(endpoint: &'static str, seen: &Seen, mut multipart: Multipart) {
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.unwrap().to_vec();
        seen.fields.lock().unwrap().push((endpoint, name, bytes));
    }
}

async fn ocr_image(State(seen): State<Arc<Seen>>, multipart: Multipart) -> Json<Value> {
    record("ocr-image", &seen, multipart).await;
    Json(json!({ "text": "  Hello from the backend \n" }))
}

async fn ocr_pdf(State(seen): State<Arc<Seen>>, multipart: Multipart) -> Json<Value> {
    record("ocr-pdf", &seen, multipart).await;
    Json(json!({ "text": "Page 1:\nscanned words" }))
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn healthy_backend() -> (String, Arc<Seen>) {
    let seen = Arc::new(Seen::default());
    let app = Router::new()
        .route("/ocr-image", post(ocr_image))
        .route("/ocr-pdf", post(ocr_pdf))
        .with_state(Arc::clone(&seen));
    (serve(app).await, seen)
}

fn remote_extractor(base_url: &str) -> Extractor {
    Extractor::new(ExtractionConfig {
        ocr: OcrBackendConfig::Remote {
            base_url: base_url.to_string(),
            timeout_secs: 5,
        },
        ..ExtractionConfig::default()
    })
}

async fn run(extractor: &Extractor, document: SourceDocument) -> vistalex_core::ExtractionResult {
    extractor
        .extract(document, None, ProgressSink::Silent, &CancelToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn image_upload_sends_png_and_language() {
    let (url, seen) = healthy_backend().await;
    let engine = RemoteOcrEngine::new(&format!("{}/", url), Duration::from_secs(5)).unwrap();

    let text = engine
        .recognize(image::DynamicImage::new_rgb8(8, 8), "deu")
        .await
        .unwrap();
    assert_eq!(text, "  Hello from the backend \n");

    let png = seen.field("ocr-image", "image").unwrap();
    assert!(image::load_from_memory(&png).is_ok());
    assert_eq!(seen.field("ocr-image", "lang").unwrap(), b"deu");
}

#[tokio::test]
async fn image_document_is_recognised_remotely() {
    let (url, seen) = healthy_backend().await;
    let extractor = remote_extractor(&url);

    let result = run(&extractor, png_document()).await;
    assert_eq!(result.outcome(), Outcome::Extracted);
    assert_eq!(result.text(), "Hello from the backend");
    assert_eq!(seen.field("ocr-image", "lang").unwrap(), b"eng");
}

#[tokio::test]
async fn rasterless_scan_is_sent_as_whole_pdf() {
    let (url, seen) = healthy_backend().await;
    let extractor = remote_extractor(&url);

    let result = run(&extractor, pdf_document(&[PdfPage::Blank])).await;
    assert_eq!(result.outcome(), Outcome::Extracted);
    assert_eq!(result.text(), "Page 1:\nscanned words");

    let uploaded = seen.field("ocr-pdf", "pdf").unwrap();
    assert!(uploaded.starts_with(b"%PDF"));
    assert!(seen.field("ocr-image", "image").is_none());
}

#[tokio::test]
async fn server_error_message_is_surfaced() {
    let app = Router::new().route(
        "/ocr-image",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "model crashed" })),
            )
        }),
    );
    let url = serve(app).await;

    let engine = RemoteOcrEngine::new(&url, Duration::from_secs(5)).unwrap();
    let err = engine
        .recognize(image::DynamicImage::new_luma8(4, 4), "eng")
        .await
        .unwrap_err();
    match err {
        ExtractError::Backend { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "model crashed");
        }
        other => panic!("expected backend error, got {:?}", other),
    }

    let result = run(&remote_extractor(&url), png_document()).await;
    assert_eq!(result.outcome(), Outcome::Failed(FailureReason::BackendError));
    assert_eq!(result.text(), "");
}

#[tokio::test]
async fn unparsable_success_body_is_backend_error() {
    let app = Router::new().route("/ocr-image", post(|| async { "<html>maintenance</html>" }));
    let url = serve(app).await;

    let result = run(&remote_extractor(&url), png_document()).await;
    assert_eq!(result.outcome(), Outcome::Failed(FailureReason::BackendError));
}

#[tokio::test]
async fn closed_port_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let result = run(&remote_extractor(&url), png_document()).await;
    assert_eq!(result.outcome(), Outcome::Failed(FailureReason::NetworkError));
    assert!(result.diagnostics().detail.is_some());
}
