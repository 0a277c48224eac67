// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reading-order reconstruction from positioned PDF text fragments.
//
// No layout engine: fragments are taken in content-stream order and grouped
// into lines by their vertical delta, with large leftward jumps treated as a
// column or paragraph break.

use tracing::{debug, instrument};
use vistalex_core::error::Result;
use vistalex_core::types::{Point, PositionedFragment, ReconstructedPage};

use super::reader::PdfReader;

/// Vertical movement (user-space units) beyond which a fragment starts a new line.
pub const LINE_DELTA_Y: f32 = 5.0;

/// Leftward movement beyond which a fragment starts a new paragraph or column.
pub const COLUMN_DELTA_X: f32 = 50.0;

/// Direct-extraction output for a whole PDF.
#[derive(Debug, Clone)]
pub struct DirectText {
    /// Cleaned reading-order text of every page.
    pub text: String,
    pub page_count: usize,
    /// Set when every reconstructed page is blank.
    pub likely_scanned: bool,
}

/// Group one page's fragments into lines.
///
/// Fragments without a position are appended to the current line verbatim
/// and do not move the comparison point.
pub fn reconstruct_page<I>(fragments: I) -> ReconstructedPage
where
    I: IntoIterator<Item = PositionedFragment>,
{
    let mut page = ReconstructedPage::new();
    let mut current = String::new();
    let mut last: Option<Point> = None;

    for fragment in fragments {
        let Some(point) = fragment.position else {
            current.push_str(&fragment.text);
            continue;
        };

        if let Some(prev) = last {
            let dy = (point.y - prev.y).abs();
            let dx = (point.x - prev.x).abs();

            if dy > LINE_DELTA_Y {
                page.push_line(std::mem::take(&mut current));
            } else if point.x < prev.x && dx > COLUMN_DELTA_X {
                page.push_line(std::mem::take(&mut current));
                page.push_paragraph_break();
            } else if !current.is_empty() {
                current.push(' ');
            }
        } else if !current.is_empty() {
            current.push(' ');
        }

        current.push_str(&fragment.text);
        last = Some(point);
    }

    if !current.is_empty() {
        page.push_line(current);
    }
    page
}

/// Join reconstructed pages with a blank line between them and clean the result.
pub fn join_pages(pages: &[ReconstructedPage]) -> String {
    let joined = pages
        .iter()
        .map(ReconstructedPage::to_text)
        .collect::<Vec<_>>()
        .join("\n\n");
    clean_text(&joined)
}

/// Collapse runs of three or more newlines to two, collapse runs of
/// horizontal whitespace to one space, and trim.
pub fn clean_text(raw: &str) -> String {
    let mut newlines_collapsed = String::with_capacity(raw.len());
    let mut newline_run = 0usize;
    for ch in raw.chars() {
        if ch == '\n' {
            newline_run += 1;
            if newline_run <= 2 {
                newlines_collapsed.push(ch);
            }
        } else {
            newline_run = 0;
            newlines_collapsed.push(ch);
        }
    }

    let mut cleaned = String::with_capacity(newlines_collapsed.len());
    let mut in_space = false;
    for ch in newlines_collapsed.chars() {
        if ch != '\n' && ch.is_whitespace() {
            if !in_space {
                cleaned.push(' ');
                in_space = true;
            }
        } else {
            in_space = false;
            cleaned.push(ch);
        }
    }

    cleaned.trim().to_string()
}

/// Read every page of `reader` and reconstruct the document's text.
///
/// Fragments are consumed page by page; nothing positional survives past
/// the page it came from.
#[instrument(skip_all, fields(pages = reader.page_count()))]
pub fn reconstruct_document(reader: &PdfReader) -> Result<DirectText> {
    let page_numbers = reader.page_numbers();
    let mut pages = Vec::with_capacity(page_numbers.len());

    for page_number in &page_numbers {
        let fragments = reader.page_fragments(*page_number)?;
        let fragment_count = fragments.len();
        let page = reconstruct_page(fragments);
        debug!(page_number, fragment_count, lines = page.lines().len(), "Page reconstructed");
        pages.push(page);
    }

    let text = join_pages(&pages);
    let likely_scanned = pages.iter().all(ReconstructedPage::is_blank);
    debug!(chars = text.chars().count(), likely_scanned, "Direct text assembled");

    Ok(DirectText {
        text,
        page_count: page_numbers.len(),
        likely_scanned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(fragments: Vec<PositionedFragment>) -> String {
        join_pages(&[reconstruct_page(fragments)])
    }

    #[test]
    fn same_line_fragments_join_with_space() {
        let text = text_of(vec![
            PositionedFragment::at("Hello", 72.0, 700.0),
            PositionedFragment::at("world", 110.0, 700.0),
        ]);
        assert_eq!(text, "Hello world");
    }

    #[test]
    fn small_vertical_jitter_stays_on_line() {
        let text = text_of(vec![
            PositionedFragment::at("x", 72.0, 700.0),
            PositionedFragment::at("2", 80.0, 704.5),
        ]);
        assert_eq!(text, "x 2");
    }

    #[test]
    fn vertical_jump_starts_new_line() {
        let text = text_of(vec![
            PositionedFragment::at("first", 72.0, 700.0),
            PositionedFragment::at("second", 400.0, 690.0),
        ]);
        assert_eq!(text, "first\nsecond");
    }

    #[test]
    fn leftward_jump_is_paragraph_break() {
        let text = text_of(vec![
            PositionedFragment::at("left column", 300.0, 700.0),
            PositionedFragment::at("right column", 72.0, 702.0),
        ]);
        assert_eq!(text, "left column\n\nright column");
    }

    #[test]
    fn small_leftward_step_is_same_line() {
        let text = text_of(vec![
            PositionedFragment::at("a", 100.0, 700.0),
            PositionedFragment::at("b", 80.0, 700.0),
        ]);
        assert_eq!(text, "a b");
    }

    #[test]
    fn unpositioned_fragment_is_appended_verbatim() {
        let text = text_of(vec![
            PositionedFragment::at("Total:", 72.0, 700.0),
            PositionedFragment::unpositioned("42"),
            PositionedFragment::at("units", 150.0, 700.0),
        ]);
        assert_eq!(text, "Total:42 units");
    }

    #[test]
    fn pages_are_separated_by_blank_line() {
        let one = reconstruct_page(vec![PositionedFragment::at("one", 72.0, 700.0)]);
        let two = reconstruct_page(vec![PositionedFragment::at("two", 72.0, 700.0)]);
        assert_eq!(join_pages(&[one, two]), "one\n\ntwo");
    }

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  a \t  b\n\n\n\n c  "), "a b\n\n c");
    }

    #[test]
    fn empty_page_yields_empty_text() {
        assert_eq!(text_of(Vec::new()), "");
        assert_eq!(text_of(vec![PositionedFragment::at("   ", 0.0, 0.0)]), "");
    }
}
