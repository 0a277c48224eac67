// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader — walks page content streams for positioned text and pulls
// embedded page rasters for OCR, using the `lopdf` crate.

use std::collections::BTreeMap;

use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Encoding, Object, ObjectId, Stream};
use tracing::{debug, instrument, warn};
use vistalex_core::error::{ExtractError, Result};
use vistalex_core::types::PositionedFragment;

/// 2D affine transform `[a b c d e f]` in PDF row-vector convention.
type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// `TJ` adjustments more negative than this (thousandths of text space)
/// read as a word gap.
const TJ_SPACE_THRESHOLD: f32 = -200.0;

/// Guards `/Parent` walks against cyclic page trees.
const MAX_TREE_DEPTH: usize = 32;

/// Read-only view over a loaded PDF.
pub struct PdfReader {
    document: Document,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Load a PDF from raw bytes. Unparseable input is a corrupt payload.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            ExtractError::CorruptPayload(format!("failed to load PDF: {}", err))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");
        Ok(Self { document })
    }

    // -- Inspection -----------------------------------------------------------

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// 1-indexed page numbers in document order.
    pub fn page_numbers(&self) -> Vec<u32> {
        self.document.get_pages().keys().copied().collect()
    }

    fn page_id(&self, page_number: u32) -> Result<ObjectId> {
        self.document
            .get_pages()
            .get(&page_number)
            .copied()
            .ok_or_else(|| {
                ExtractError::CorruptPayload(format!("page {} not found in page tree", page_number))
            })
    }

    // -- Text -----------------------------------------------------------------

    /// Text fragments of one page, in content-stream order.
    ///
    /// A page whose content stream cannot be decoded yields no fragments
    /// rather than failing the document.
    #[instrument(skip(self))]
    pub fn page_fragments(&self, page_number: u32) -> Result<Vec<PositionedFragment>> {
        let page_id = self.page_id(page_number)?;

        let raw = match self.document.get_page_content(page_id) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(page_number, "Unreadable page content: {}", err);
                return Ok(Vec::new());
            }
        };
        let content = match Content::decode(&raw) {
            Ok(content) => content,
            Err(err) => {
                warn!(page_number, "Undecodable content stream: {}", err);
                return Ok(Vec::new());
            }
        };

        let mut state = TextState::with_fonts(self.page_encodings(page_id, page_number));
        for operation in &content.operations {
            state.apply(&operation.operator, &operation.operands);
        }

        debug!(page_number, fragments = state.fragments.len(), "Fragments read");
        Ok(state.fragments)
    }

    /// Text encodings of the page's fonts, keyed by resource name. Fonts
    /// whose encoding cannot be resolved are left out and fall back to
    /// byte decoding.
    fn page_encodings(
        &self,
        page_id: ObjectId,
        page_number: u32,
    ) -> BTreeMap<Vec<u8>, Encoding<'_>> {
        let fonts = match self.document.get_page_fonts(page_id) {
            Ok(fonts) => fonts,
            Err(err) => {
                warn!(page_number, "Unreadable font resources: {}", err);
                return BTreeMap::new();
            }
        };

        fonts
            .into_iter()
            .filter_map(|(name, font)| match font.get_font_encoding(&self.document) {
                Ok(encoding) => Some((name, encoding)),
                Err(err) => {
                    debug!(
                        page_number,
                        font = %String::from_utf8_lossy(&name),
                        "No usable font encoding: {}",
                        err
                    );
                    None
                }
            })
            .collect()
    }

    // -- Rasters --------------------------------------------------------------

    /// The largest decodable image drawn on a page, if any.
    ///
    /// Supports JPEG (`DCTDecode`) and 8-bit gray, RGB, or CMYK samples that
    /// are unfiltered or `FlateDecode`d.
    #[instrument(skip(self))]
    pub fn page_raster(&self, page_number: u32) -> Result<Option<DynamicImage>> {
        let page_id = self.page_id(page_number)?;

        let Some(xobjects) = self.page_xobjects(page_id) else {
            debug!(page_number, "No XObject resources");
            return Ok(None);
        };

        let mut candidates: Vec<(&Stream, u64)> = xobjects
            .iter()
            .filter_map(|(_, value)| match self.deref(value) {
                Some(Object::Stream(stream)) if is_image(stream) => {
                    let (width, height) = dimensions(stream)?;
                    Some((stream, u64::from(width) * u64::from(height)))
                }
                _ => None,
            })
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1));

        for (stream, _) in candidates {
            match decode_image(stream) {
                Some(image) => {
                    debug!(
                        page_number,
                        width = image.width(),
                        height = image.height(),
                        "Page raster decoded"
                    );
                    return Ok(Some(image));
                }
                None => debug!(page_number, "Skipping undecodable image XObject"),
            }
        }
        Ok(None)
    }

    /// The page's `/XObject` dictionary, following `/Parent` for inherited
    /// resources.
    fn page_xobjects(&self, page_id: ObjectId) -> Option<&Dictionary> {
        let mut node = Some(page_id);
        let mut depth = 0;

        while let Some(id) = node {
            if depth >= MAX_TREE_DEPTH {
                break;
            }
            depth += 1;

            let dict = self.document.get_object(id).ok()?.as_dict().ok()?;
            let xobjects = dict
                .get(b"Resources")
                .ok()
                .and_then(|res| self.deref(res))
                .and_then(|res| res.as_dict().ok())
                .and_then(|res| res.get(b"XObject").ok())
                .and_then(|xobj| self.deref(xobj))
                .and_then(|xobj| xobj.as_dict().ok());
            if xobjects.is_some() {
                return xobjects;
            }
            node = dict.get(b"Parent").and_then(Object::as_reference).ok();
        }
        None
    }

    fn deref<'a>(&'a self, object: &'a Object) -> Option<&'a Object> {
        match object {
            Object::Reference(id) => self.document.get_object(*id).ok(),
            other => Some(other),
        }
    }
}

// -- Content stream interpretation --------------------------------------------

/// Graphics and text state tracked while walking a content stream.
struct TextState<'a> {
    encodings: BTreeMap<Vec<u8>, Encoding<'a>>,
    font: Option<Vec<u8>>,
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    leading: f32,
    in_text: bool,
    fragments: Vec<PositionedFragment>,
}

impl Default for TextState<'_> {
    fn default() -> Self {
        Self {
            encodings: BTreeMap::new(),
            font: None,
            ctm: IDENTITY,
            ctm_stack: Vec::new(),
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            leading: 0.0,
            in_text: false,
            fragments: Vec::new(),
        }
    }
}

impl<'a> TextState<'a> {
    fn with_fonts(encodings: BTreeMap<Vec<u8>, Encoding<'a>>) -> Self {
        Self {
            encodings,
            ..Self::default()
        }
    }

    fn apply(&mut self, operator: &str, operands: &[Object]) {
        match operator {
            "q" => self.ctm_stack.push(self.ctm),
            "Q" => {
                if let Some(saved) = self.ctm_stack.pop() {
                    self.ctm = saved;
                }
            }
            "cm" => {
                if let Some(m) = numbers::<6>(operands) {
                    self.ctm = multiply(&m, &self.ctm);
                }
            }
            "BT" => {
                self.in_text = true;
                self.text_matrix = IDENTITY;
                self.line_matrix = IDENTITY;
            }
            "ET" => self.in_text = false,
            "Tf" => {
                if let Some(Object::Name(name)) = operands.first() {
                    self.font = Some(name.clone());
                }
            }
            "Tm" => {
                if let Some(m) = numbers::<6>(operands) {
                    self.text_matrix = m;
                    self.line_matrix = m;
                }
            }
            "Td" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    self.next_line(tx, ty);
                }
            }
            "TD" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    self.leading = -ty;
                    self.next_line(tx, ty);
                }
            }
            "TL" => {
                if let Some([leading]) = numbers::<1>(operands) {
                    self.leading = leading;
                }
            }
            "T*" => self.next_line(0.0, -self.leading),
            "Tj" => {
                if let Some(text) = operands.first().and_then(|o| self.decode(o)) {
                    self.show(text);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    let text = self.join_tj(items);
                    self.show(text);
                }
            }
            "'" => {
                self.next_line(0.0, -self.leading);
                if let Some(text) = operands.first().and_then(|o| self.decode(o)) {
                    self.show(text);
                }
            }
            "\"" => {
                self.next_line(0.0, -self.leading);
                if let Some(text) = operands.get(2).and_then(|o| self.decode(o)) {
                    self.show(text);
                }
            }
            _ => {}
        }
    }

    /// Decode a string operand through the current font's encoding, falling
    /// back to [`decode_string`] when the font is unknown or cannot decode
    /// the bytes. Control characters never reach the output.
    fn decode(&self, object: &Object) -> Option<String> {
        let Object::String(bytes, _) = object else {
            return None;
        };
        let encoded = self
            .font
            .as_ref()
            .and_then(|font| self.encodings.get(font))
            .and_then(|encoding| Document::decode_text(encoding, bytes).ok());
        let text = match encoded {
            Some(text) => text,
            None => decode_string(object)?,
        };
        Some(text.chars().filter(|c| !c.is_control()).collect())
    }

    fn join_tj(&self, items: &[Object]) -> String {
        let mut text = String::new();
        for item in items {
            match item {
                Object::String(..) => {
                    if let Some(part) = self.decode(item) {
                        text.push_str(&part);
                    }
                }
                other => {
                    if number(other).is_some_and(|gap| gap < TJ_SPACE_THRESHOLD)
                        && !text.ends_with(' ')
                    {
                        text.push(' ');
                    }
                }
            }
        }
        text
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        let translate = [1.0, 0.0, 0.0, 1.0, tx, ty];
        self.line_matrix = multiply(&translate, &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn show(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        if !self.in_text {
            self.fragments.push(PositionedFragment::unpositioned(text));
            return;
        }
        let placed = multiply(&self.text_matrix, &self.ctm);
        let (x, y) = (placed[4], placed[5]);
        if x.is_finite() && y.is_finite() {
            self.fragments.push(PositionedFragment::at(text, x, y));
        } else {
            self.fragments.push(PositionedFragment::unpositioned(text));
        }
    }
}

/// `lhs × rhs` for PDF affine matrices.
fn multiply(lhs: &Matrix, rhs: &Matrix) -> Matrix {
    let [a1, b1, c1, d1, e1, f1] = *lhs;
    let [a2, b2, c2, d2, e2, f2] = *rhs;
    [
        a1 * a2 + b1 * c2,
        a1 * b2 + b1 * d2,
        c1 * a2 + d1 * c2,
        c1 * b2 + d1 * d2,
        e1 * a2 + f1 * c2 + e2,
        e1 * b2 + f1 * d2 + f2,
    ]
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

fn numbers<const N: usize>(operands: &[Object]) -> Option<[f32; N]> {
    if operands.len() < N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, object) in out.iter_mut().zip(operands) {
        *slot = number(object)?;
    }
    Some(out)
}

/// Font-less decoding of a PDF string object: UTF-16BE when it carries a
/// byte-order mark, otherwise one byte per character.
fn decode_string(object: &Object) -> Option<String> {
    let Object::String(bytes, _) = object else {
        return None;
    };

    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return Some(String::from_utf16_lossy(&units));
    }
    Some(bytes.iter().map(|&b| char::from(b)).collect())
}

// -- Image XObjects -----------------------------------------------------------

fn is_image(stream: &Stream) -> bool {
    matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(name)) if name.as_slice() == b"Image")
}

fn dimensions(stream: &Stream) -> Option<(u32, u32)> {
    let width = stream.dict.get(b"Width").ok()?.as_i64().ok()?;
    let height = stream.dict.get(b"Height").ok()?.as_i64().ok()?;
    let width = u32::try_from(width).ok().filter(|w| *w > 0)?;
    let height = u32::try_from(height).ok().filter(|h| *h > 0)?;
    Some((width, height))
}

fn filters(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Object::Name(name) => Some(name.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn decode_image(stream: &Stream) -> Option<DynamicImage> {
    let (width, height) = dimensions(stream)?;
    let filters = filters(stream);

    let samples = match filters.iter().map(Vec::as_slice).collect::<Vec<_>>().as_slice() {
        [b"DCTDecode"] => return image::load_from_memory(&stream.content).ok(),
        [] => stream.content.clone(),
        [b"FlateDecode"] => stream.decompressed_content().ok()?,
        _ => return None,
    };

    let bits = stream
        .dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|b| b.as_i64().ok())
        .unwrap_or(8);
    if bits != 8 {
        return None;
    }

    let pixels = width as usize * height as usize;
    let components = match stream.dict.get(b"ColorSpace") {
        Ok(Object::Name(name)) if name.as_slice() == b"DeviceGray" => 1,
        Ok(Object::Name(name)) if name.as_slice() == b"DeviceRGB" => 3,
        Ok(Object::Name(name)) if name.as_slice() == b"DeviceCMYK" => 4,
        // ICC-based and indirect colour spaces: infer from the sample count.
        _ => samples.len().checked_div(pixels)?,
    };
    let expected = pixels * components;
    if samples.len() < expected {
        return None;
    }
    let samples = &samples[..expected];

    match components {
        1 => GrayImage::from_raw(width, height, samples.to_vec()).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(width, height, samples.to_vec()).map(DynamicImage::ImageRgb8),
        4 => {
            let rgb = samples
                .chunks_exact(4)
                .flat_map(|cmyk| {
                    let k = 255 - u16::from(cmyk[3]);
                    [0, 1, 2].map(|i| ((255 - u16::from(cmyk[i])) * k / 255) as u8)
                })
                .collect();
            RgbImage::from_raw(width, height, rgb).map(DynamicImage::ImageRgb8)
        }
        _ => None,
    }
}
