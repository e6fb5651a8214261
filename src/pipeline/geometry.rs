//! Positional text-block indexing.
//!
//! ## Coordinate system
//!
//! All rectangles in this crate use page points with a **top-left origin**
//! (y grows downward), because every empirically tuned constant in the
//! pipeline (insertion spacings, header margins and so on) was measured in
//! that system. pdfium itself uses a bottom-left origin, so
//! [`Rect`] converts at the engine boundary using the page height.
//!
//! ## Block ephemerality
//!
//! A [`ContentBlock`] list is a *snapshot*: any structural mutation of the
//! page (redaction fill, text insertion, image swap) invalidates it. The
//! index is therefore recomputed from the page's text segments on every
//! lookup and never patched incrementally. Block identity is meaningless
//! across mutations.

use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::RestampError;

/// An axis-aligned rectangle in page points, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn center_x(&self) -> f32 {
        (self.x0 + self.x1) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.y0 + self.y1) / 2.0
    }

    /// Expand by `margin` on every side, clamping the top-left corner at 0.
    ///
    /// Redaction fills use this so no fringe of the covered content stays
    /// visible at the block edge.
    pub fn expanded(&self, margin: f32) -> Self {
        Self {
            x0: (self.x0 - margin).max(0.0),
            y0: (self.y0 - margin).max(0.0),
            x1: self.x1 + margin,
            y1: self.y1 + margin,
        }
    }

    /// Convert from pdfium's bottom-up coordinates.
    pub fn from_pdf(rect: &PdfRect, page_height: f32) -> Self {
        Self {
            x0: rect.left().value,
            y0: page_height - rect.top().value,
            x1: rect.right().value,
            y1: page_height - rect.bottom().value,
        }
    }

    /// Convert to pdfium's bottom-up coordinates.
    pub fn to_pdf(&self, page_height: f32) -> PdfRect {
        PdfRect::new(
            PdfPoints::new(page_height - self.y1),
            PdfPoints::new(self.x0),
            PdfPoints::new(page_height - self.y0),
            PdfPoints::new(self.x1),
        )
    }
}

/// A visually grouped run of text on a page.
///
/// Ephemeral: valid only until the next structural mutation of its page.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentBlock {
    pub rect: Rect,
    pub text: String,
}

/// Builds the per-page [`ContentBlock`] index from raw text segments.
pub struct GeometryIndex;

impl GeometryIndex {
    /// Extract the ordered block list for a page.
    ///
    /// Recomputed fresh on every call; callers must not hold a result across
    /// a mutation of the same page.
    pub fn blocks_for_page(page: &PdfPage) -> Result<Vec<ContentBlock>, RestampError> {
        let page_height = page.height().value;
        let text = page
            .text()
            .map_err(|e| RestampError::Internal(format!("text index unavailable: {e:?}")))?;

        let mut lines: Vec<(Rect, String)> = Vec::new();
        for segment in text.segments().iter() {
            let content = segment.text();
            if content.trim().is_empty() {
                continue;
            }
            let rect = Rect::from_pdf(&segment.bounds(), page_height);
            lines.push((rect, content));
        }

        Ok(merge_lines_into_blocks(lines))
    }
}

/// Group adjacent text lines into visual blocks.
///
/// Two lines belong to the same block when they overlap horizontally and the
/// vertical gap between them is smaller than roughly one line height. This
/// mirrors the "blocks" granularity the matching predicates were tuned
/// against: a label and its continuation lines form one block, while columns
/// and separated paragraphs stay apart.
pub fn merge_lines_into_blocks(lines: Vec<(Rect, String)>) -> Vec<ContentBlock> {
    let mut blocks: Vec<ContentBlock> = Vec::new();

    'next_line: for (rect, text) in lines {
        for block in blocks.iter_mut() {
            if same_block(&block.rect, &rect) {
                block.rect = union(&block.rect, &rect);
                if !block.text.ends_with('\n') {
                    block.text.push('\n');
                }
                block.text.push_str(&text);
                continue 'next_line;
            }
        }
        blocks.push(ContentBlock { rect, text });
    }

    blocks
}

fn union(a: &Rect, b: &Rect) -> Rect {
    Rect {
        x0: a.x0.min(b.x0),
        y0: a.y0.min(b.y0),
        x1: a.x1.max(b.x1),
        y1: a.y1.max(b.y1),
    }
}

fn same_block(a: &Rect, b: &Rect) -> bool {
    let overlap_x = a.x0 <= b.x1 && b.x0 <= a.x1;
    if !overlap_x {
        return false;
    }
    let line_height = b.height().max(a.height()).max(1.0);
    let gap = if b.y0 >= a.y1 {
        b.y0 - a.y1
    } else if a.y0 >= b.y1 {
        a.y0 - b.y1
    } else {
        0.0
    };
    gap <= line_height * 0.8
}

/// A page-scoped exemption to a keyword match.
///
/// A block on `page_index` containing `keyword` is never redacted even when
/// the surrounding predicate matches it. Evaluated before the keyword match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageExemption {
    pub page_index: usize,
    pub keyword: String,
}

/// The positional matching rules the redaction and rewrite steps run on.
///
/// Predicates operate purely on block text and bounding box, never on
/// semantic document structure, and are enumerable so each variant can be
/// tested in isolation from rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchPredicate {
    /// Block's trimmed text starts with the given prefix.
    Prefix(String),
    /// Block's text contains any of the keywords, unless a page-scoped
    /// exemption applies.
    KeywordSet {
        keywords: Vec<String>,
        #[serde(default)]
        exemptions: Vec<PageExemption>,
    },
}

impl MatchPredicate {
    /// Does the block on `page_index` satisfy this predicate?
    ///
    /// Exemptions are checked first: an exempted block never matches, even
    /// though its text contains a keyword.
    pub fn matches(&self, page_index: usize, text: &str) -> bool {
        match self {
            MatchPredicate::Prefix(prefix) => text.trim_start().starts_with(prefix.as_str()),
            MatchPredicate::KeywordSet {
                keywords,
                exemptions,
            } => {
                for exemption in exemptions {
                    if exemption.page_index == page_index && text.contains(&exemption.keyword) {
                        return false;
                    }
                }
                keywords.iter().any(|k| text.contains(k.as_str()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(x0: f32, y0: f32, x1: f32, y1: f32, text: &str) -> (Rect, String) {
        (Rect::new(x0, y0, x1, y1), text.to_string())
    }

    #[test]
    fn rect_roundtrip_through_pdf_coordinates() {
        let r = Rect::new(10.0, 20.0, 110.0, 40.0);
        let back = Rect::from_pdf(&r.to_pdf(842.0), 842.0);
        assert!((back.x0 - r.x0).abs() < 1e-4);
        assert!((back.y0 - r.y0).abs() < 1e-4);
        assert!((back.x1 - r.x1).abs() < 1e-4);
        assert!((back.y1 - r.y1).abs() < 1e-4);
    }

    #[test]
    fn expanded_clamps_at_origin() {
        let r = Rect::new(1.0, 1.0, 50.0, 20.0).expanded(2.0);
        assert_eq!(r.x0, 0.0);
        assert_eq!(r.y0, 0.0);
        assert_eq!(r.x1, 52.0);
        assert_eq!(r.y1, 22.0);
    }

    #[test]
    fn adjacent_lines_merge_into_one_block() {
        let blocks = merge_lines_into_blocks(vec![
            line(50.0, 100.0, 200.0, 112.0, "Contact number:"),
            line(50.0, 114.0, 180.0, 126.0, "555-0100"),
        ]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "Contact number:\n555-0100");
        assert_eq!(blocks[0].rect, Rect::new(50.0, 100.0, 200.0, 126.0));
    }

    #[test]
    fn distant_lines_stay_separate() {
        let blocks = merge_lines_into_blocks(vec![
            line(50.0, 100.0, 200.0, 112.0, "Header"),
            line(50.0, 300.0, 200.0, 312.0, "Footer"),
        ]);
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn side_by_side_columns_stay_separate() {
        let blocks = merge_lines_into_blocks(vec![
            line(50.0, 100.0, 180.0, 112.0, "Left column"),
            line(300.0, 100.0, 420.0, 112.0, "Right column"),
        ]);
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn prefix_predicate_trims_leading_whitespace() {
        let p = MatchPredicate::Prefix("Tel".into());
        assert!(p.matches(0, "  Tel: 555-0100"));
        assert!(!p.matches(0, "Hotel: 555-0100"));
    }

    #[test]
    fn keyword_predicate_matches_any_keyword() {
        let p = MatchPredicate::KeywordSet {
            keywords: vec!["alpha".into(), "beta".into()],
            exemptions: vec![],
        };
        assert!(p.matches(3, "contains beta somewhere"));
        assert!(!p.matches(3, "gamma only"));
    }

    #[test]
    fn exemption_applies_only_on_its_page() {
        let p = MatchPredicate::KeywordSet {
            keywords: vec!["score".into()],
            exemptions: vec![PageExemption {
                page_index: 0,
                keyword: "score".into(),
            }],
        };
        // Exempted page: never covered.
        assert!(!p.matches(0, "the score is shown here"));
        // Identical text elsewhere: always covered.
        assert!(p.matches(1, "the score is shown here"));
    }
}
