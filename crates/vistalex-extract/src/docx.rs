// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Word-processor (.docx) reader — raw body text and embedded media.
//
// A .docx file is a ZIP archive; the body lives in `word/document.xml` and is
// already in reading order, so no layout reconstruction is needed.

use std::io::{Cursor, Read};

use image::DynamicImage;
use roxmltree::Node;
use tracing::{debug, instrument};
use vistalex_core::error::{ExtractError, Result};
use zip::ZipArchive;

const WORD_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const BODY_PART: &str = "word/document.xml";
const MEDIA_PREFIX: &str = "word/media/";

/// Reads text and images out of an Office Open XML word-processing package.
pub struct WordReader<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> WordReader<'a> {
    /// Open the package. Bytes that are not a ZIP archive are a corrupt payload.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &'a [u8]) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(data)).map_err(|err| {
            ExtractError::CorruptPayload(format!("failed to read DOCX as ZIP: {}", err))
        })?;
        debug!(entries = archive.len(), "DOCX archive opened");
        Ok(Self { archive })
    }

    /// Raw text of the document body: paragraphs separated by a blank line,
    /// tabs as `\t`, manual breaks as `\n`.
    #[instrument(skip(self))]
    pub fn raw_text(&mut self) -> Result<String> {
        let xml = self.read_entry_to_string(BODY_PART)?;
        let document = roxmltree::Document::parse(&xml).map_err(|err| {
            ExtractError::CorruptPayload(format!("malformed {}: {}", BODY_PART, err))
        })?;

        let paragraphs: Vec<String> = document
            .descendants()
            .filter(|node| is_word(node, "p"))
            .map(paragraph_text)
            .collect();

        debug!(paragraphs = paragraphs.len(), "DOCX body read");
        Ok(paragraphs.join("\n\n").trim_end().to_string())
    }

    /// Decodable raster images under `word/media/`, in archive-name order.
    /// Vector formats and anything `image` cannot decode are skipped.
    #[instrument(skip(self))]
    pub fn media_images(&mut self) -> Result<Vec<DynamicImage>> {
        let mut names: Vec<String> = self
            .archive
            .file_names()
            .filter(|name| name.starts_with(MEDIA_PREFIX))
            .map(str::to_string)
            .collect();
        names.sort();

        let mut images = Vec::with_capacity(names.len());
        for name in &names {
            let bytes = self.read_entry(name)?;
            match image::load_from_memory(&bytes) {
                Ok(image) => images.push(image),
                Err(err) => debug!(name = %name, "Skipping undecodable media: {}", err),
            }
        }

        debug!(media = names.len(), decoded = images.len(), "DOCX media read");
        Ok(images)
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut entry = self.archive.by_name(name).map_err(|err| {
            ExtractError::CorruptPayload(format!("missing {}: {}", name, err))
        })?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    fn read_entry_to_string(&mut self, name: &str) -> Result<String> {
        String::from_utf8(self.read_entry(name)?).map_err(|err| {
            ExtractError::CorruptPayload(format!("{} is not UTF-8: {}", name, err))
        })
    }
}

fn is_word(node: &Node, local: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local
        && node.tag_name().namespace() == Some(WORD_NS)
}

/// Text of one `w:p`, excluding paragraphs nested inside it (text boxes),
/// which are visited on their own.
fn paragraph_text(paragraph: Node) -> String {
    let mut text = String::new();
    for node in paragraph.descendants().filter(Node::is_element) {
        let owner = node.ancestors().skip(1).find(|a| is_word(a, "p"));
        if owner != Some(paragraph) {
            continue;
        }
        match node.tag_name().name() {
            "t" if is_word(&node, "t") => text.push_str(node.text().unwrap_or_default()),
            "tab" if is_word(&node, "tab") => text.push('\t'),
            "br" | "cr" if node.tag_name().namespace() == Some(WORD_NS) => text.push('\n'),
            _ => {}
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn package(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, bytes) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn body(inner: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="{WORD_NS}"><w:body>{inner}</w:body></w:document>"#
        )
    }

    #[test]
    fn paragraphs_runs_tabs_and_breaks() {
        let xml = body(
            "<w:p><w:r><w:t>Dear </w:t></w:r><w:r><w:t>reader,</w:t></w:r></w:p>\
             <w:p><w:r><w:t>Name</w:t><w:tab/><w:t>Value</w:t><w:br/><w:t>next</w:t></w:r></w:p>",
        );
        let bytes = package(&[(BODY_PART, xml.as_bytes())]);

        let text = WordReader::from_bytes(&bytes).unwrap().raw_text().unwrap();
        assert_eq!(text, "Dear reader,\n\nName\tValue\nnext");
    }

    #[test]
    fn table_cells_become_paragraphs() {
        let xml = body(
            "<w:tbl><w:tr><w:tc><w:p><w:r><w:t>A1</w:t></w:r></w:p></w:tc>\
             <w:tc><w:p><w:r><w:t>B1</w:t></w:r></w:p></w:tc></w:tr></w:tbl>",
        );
        let bytes = package(&[(BODY_PART, xml.as_bytes())]);

        let text = WordReader::from_bytes(&bytes).unwrap().raw_text().unwrap();
        assert_eq!(text, "A1\n\nB1");
    }

    #[test]
    fn missing_body_is_corrupt() {
        let bytes = package(&[("word/styles.xml", &b"<styles/>"[..])]);
        let err = WordReader::from_bytes(&bytes).unwrap().raw_text().unwrap_err();
        assert!(matches!(err, ExtractError::CorruptPayload(_)));
    }

    #[test]
    fn malformed_xml_is_corrupt() {
        let bytes = package(&[(BODY_PART, &b"<w:document><w:body>"[..])]);
        let err = WordReader::from_bytes(&bytes).unwrap().raw_text().unwrap_err();
        assert!(matches!(err, ExtractError::CorruptPayload(_)));
    }

    #[test]
    fn not_a_zip_is_corrupt() {
        let err = WordReader::from_bytes(b"plain bytes").err().unwrap();
        assert!(matches!(err, ExtractError::CorruptPayload(_)));
    }

    #[test]
    fn media_skips_undecodable_entries() {
        let mut png = Cursor::new(Vec::new());
        DynamicImage::new_luma8(4, 4)
            .write_to(&mut png, image::ImageFormat::Png)
            .unwrap();
        let xml = body("");
        let bytes = package(&[
            (BODY_PART, xml.as_bytes()),
            ("word/media/image1.png", png.get_ref().as_slice()),
            ("word/media/image2.emf", &b"\x01\x00\x00\x00"[..]),
        ]);

        let images = WordReader::from_bytes(&bytes).unwrap().media_images().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].width(), 4);
    }
}
