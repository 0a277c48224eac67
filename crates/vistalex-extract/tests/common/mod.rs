// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared fixtures for the integration tests: document builders and a
// counting fake OCR engine.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tokio::sync::Notify;
use vistalex_core::error::Result;
use vistalex_core::types::SourceDocument;
use vistalex_extract::{EngineFactory, RecognitionEngine};

// ---------------------------------------------------------------------------
// PDF
// ---------------------------------------------------------------------------

/// One page of a synthetic PDF.
pub enum PdfPage {
    /// Text fragments drawn at absolute `(x, y, text)` positions.
    Text(Vec<(i64, i64, &'static str)>),
    /// A full-page grey raster and no text.
    Scan,
    /// A raster plus a short text header (a cover stamp on a scan).
    StampedScan(&'static str),
    /// Nothing at all.
    Blank,
}

fn name(value: &str) -> Object {
    Object::Name(value.as_bytes().to_vec())
}

fn literal(value: &str) -> Object {
    Object::String(value.as_bytes().to_vec(), StringFormat::Literal)
}

fn text_operations(fragments: &[(i64, i64, &str)]) -> Vec<Operation> {
    let mut ops = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![name("F1"), Object::Integer(12)]),
    ];
    for (x, y, text) in fragments {
        ops.push(Operation::new(
            "Tm",
            vec![
                Object::Integer(1),
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(1),
                Object::Integer(*x),
                Object::Integer(*y),
            ],
        ));
        ops.push(Operation::new("Tj", vec![literal(text)]));
    }
    ops.push(Operation::new("ET", vec![]));
    ops
}

fn image_operations() -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                Object::Integer(400),
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(400),
                Object::Integer(100),
                Object::Integer(200),
            ],
        ),
        Operation::new("Do", vec![name("Im1")]),
        Operation::new("Q", vec![]),
    ]
}

/// A 32x32 DeviceGray image XObject with dark stripes.
fn gray_xobject(doc: &mut Document) -> ObjectId {
    let (width, height) = (32u32, 32u32);
    let pixels: Vec<u8> = (0..width * height)
        .map(|i| if (i / width) % 4 == 0 { 0 } else { 255 })
        .collect();

    let mut dict = Dictionary::new();
    dict.set("Type", name("XObject"));
    dict.set("Subtype", name("Image"));
    dict.set("Width", Object::Integer(i64::from(width)));
    dict.set("Height", Object::Integer(i64::from(height)));
    dict.set("ColorSpace", name("DeviceGray"));
    dict.set("BitsPerComponent", Object::Integer(8));
    doc.add_object(Stream::new(dict, pixels))
}

/// Serialise a PDF with the given pages.
pub fn build_pdf(pages: &[PdfPage]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut font = Dictionary::new();
    font.set("Type", name("Font"));
    font.set("Subtype", name("Type1"));
    font.set("BaseFont", name("Helvetica"));
    let font_id = doc.add_object(font);

    let mut kids = Vec::new();
    for page in pages {
        let mut operations = Vec::new();
        let mut with_image = false;
        match page {
            PdfPage::Text(fragments) => operations.extend(text_operations(fragments)),
            PdfPage::Scan => {
                operations.extend(image_operations());
                with_image = true;
            }
            PdfPage::StampedScan(stamp) => {
                operations.extend(image_operations());
                operations.extend(text_operations(&[(72, 800, *stamp)]));
                with_image = true;
            }
            PdfPage::Blank => {}
        }

        let mut fonts = Dictionary::new();
        fonts.set("F1", Object::Reference(font_id));
        let mut resources = Dictionary::new();
        resources.set("Font", Object::Dictionary(fonts));
        if with_image {
            let image_id = gray_xobject(&mut doc);
            let mut xobjects = Dictionary::new();
            xobjects.set("Im1", Object::Reference(image_id));
            resources.set("XObject", Object::Dictionary(xobjects));
        }

        let content = Content { operations }.encode().unwrap();
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content));

        let mut page_dict = Dictionary::new();
        page_dict.set("Type", name("Page"));
        page_dict.set("Parent", Object::Reference(pages_id));
        page_dict.set("Contents", Object::Reference(content_id));
        page_dict.set("Resources", Object::Dictionary(resources));
        kids.push(Object::Reference(doc.add_object(page_dict)));
    }

    let mut pages_dict = Dictionary::new();
    pages_dict.set("Type", name("Pages"));
    pages_dict.set("Count", Object::Integer(kids.len() as i64));
    pages_dict.set("Kids", Object::Array(kids));
    pages_dict.set(
        "MediaBox",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(595),
            Object::Integer(842),
        ]),
    );
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let mut catalog = Dictionary::new();
    catalog.set("Type", name("Catalog"));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

pub fn pdf_document(pages: &[PdfPage]) -> SourceDocument {
    SourceDocument::from_mime(build_pdf(pages), "application/pdf", "fixture.pdf").unwrap()
}

// ---------------------------------------------------------------------------
// Images and DOCX
// ---------------------------------------------------------------------------

pub fn png_bytes() -> Vec<u8> {
    let img = GrayImage::from_fn(48, 24, |x, _| Luma([if x % 6 < 3 { 20 } else { 235 }]));
    let mut out = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

pub fn png_document() -> SourceDocument {
    SourceDocument::from_mime(png_bytes(), "image/png", "scan.png").unwrap()
}

/// A DOCX whose body holds `paragraphs` and whose media folder holds
/// `image_count` PNGs.
pub fn build_docx(paragraphs: &[&str], image_count: usize) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
        body
    );

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("[Content_Types].xml", options).unwrap();
        zip.write_all(br#"<?xml version="1.0"?><Types/>"#).unwrap();
        zip.start_file("word/document.xml", options).unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        for index in 0..image_count {
            zip.start_file(format!("word/media/image{}.png", index + 1), options)
                .unwrap();
            zip.write_all(&png_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    cursor.into_inner()
}

pub fn docx_document(paragraphs: &[&str], image_count: usize) -> SourceDocument {
    SourceDocument::from_mime(
        build_docx(paragraphs, image_count),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "fixture.docx",
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Fake OCR engine
// ---------------------------------------------------------------------------

/// Counters shared between a factory and every engine it creates.
#[derive(Default)]
pub struct Counters {
    pub creates: AtomicUsize,
    pub recognitions: AtomicUsize,
    pub documents: AtomicUsize,
    pub drops: AtomicUsize,
}

impl Counters {
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn recognitions(&self) -> usize {
        self.recognitions.load(Ordering::SeqCst)
    }

    pub fn documents(&self) -> usize {
        self.documents.load(Ordering::SeqCst)
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }
}

/// Lets a test park the engine mid-recognition.
#[derive(Default)]
pub struct Gate {
    pub started: Notify,
}

pub struct FakeFactory {
    pub counters: Arc<Counters>,
    reply: String,
    fail_init: bool,
    whole_documents: bool,
    gate: Option<Arc<Gate>>,
}

impl FakeFactory {
    pub fn replying(reply: &str) -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            reply: reply.to_string(),
            fail_init: false,
            whole_documents: false,
            gate: None,
        }
    }

    pub fn failing_init() -> Self {
        Self {
            fail_init: true,
            ..Self::replying("")
        }
    }

    pub fn with_documents(mut self) -> Self {
        self.whole_documents = true;
        self
    }

    /// Every recognition signals `gate.started` and then never completes.
    pub fn blocking(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl EngineFactory for FakeFactory {
    fn name(&self) -> &str {
        "fake"
    }

    fn supports_documents(&self) -> bool {
        self.whole_documents
    }

    async fn create(&self) -> Result<Box<dyn RecognitionEngine>> {
        if self.fail_init {
            return Err(vistalex_core::ExtractError::OcrUnavailable(
                "fake model missing".into(),
            ));
        }
        self.counters.creates.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeEngine {
            counters: Arc::clone(&self.counters),
            reply: self.reply.clone(),
            gate: self.gate.clone(),
        }))
    }
}

pub struct FakeEngine {
    counters: Arc<Counters>,
    reply: String,
    gate: Option<Arc<Gate>>,
}

#[async_trait]
impl RecognitionEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn recognize(&self, _image: DynamicImage, _language: &str) -> Result<String> {
        self.counters.recognitions.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            std::future::pending::<()>().await;
        }
        Ok(self.reply.clone())
    }

    async fn recognize_pdf(&self, _pdf: &[u8], _language: &str) -> Result<String> {
        self.counters.documents.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

impl Drop for FakeEngine {
    fn drop(&mut self) {
        self.counters.drops.fetch_add(1, Ordering::SeqCst);
    }
}
