//! Text replacement and insertion.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{HeaderStampRule, SubtitleRule, TitleRewriteRule};
use crate::error::RestampError;
use crate::pipeline::geometry::{GeometryIndex, MatchPredicate, Rect};
use crate::pipeline::redact::cover_rect;
use crate::pipeline::session::DocumentSession;

/// Where an inserted line sits relative to its anchor block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertPosition {
    #[default]
    Below,
    Above,
}

/// Estimate the rendered width of `text` at `font_size`, in points.
///
/// ASCII glyphs average half an em, everything else (CJK in practice) a full
/// em. Deliberately pessimistic: overestimating forces the enlarged-rect
/// retry, underestimating would clip.
pub fn estimated_text_width(text: &str, font_size: f32) -> f32 {
    text.chars()
        .map(|c| if c.is_ascii() { 0.5 } else { 1.0 })
        .sum::<f32>()
        * font_size
}

/// Compute the rectangle a new line of text is placed into.
///
/// Width starts at twice the anchor's width but never runs past the page's
/// right margin (10pt inset). Above-placement clamps at the page top.
pub fn insertion_rect(
    anchor: &Rect,
    page_width: f32,
    spacing: f32,
    font_size: f32,
    position: InsertPosition,
) -> Rect {
    let height = font_size * 1.5;
    let width = (anchor.width() * 2.0).min(page_width - anchor.x0 - 10.0);
    match position {
        InsertPosition::Below => Rect::new(
            anchor.x0,
            anchor.y1 + spacing,
            anchor.x0 + width,
            anchor.y1 + spacing + height,
        ),
        InsertPosition::Above => {
            let y0 = (anchor.y0 - spacing - height).max(0.0);
            Rect::new(anchor.x0, y0, anchor.x0 + width, y0 + height)
        }
    }
}

/// Widen an insertion rect to the page's right margin and grow it by half,
/// for the one retry an overflowing line gets.
pub fn enlarged_rect(rect: &Rect, page_width: f32) -> Rect {
    Rect::new(
        rect.x0,
        rect.y0,
        page_width - 10.0,
        rect.y0 + rect.height() * 1.5,
    )
}

fn random_six_digits() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64 + d.as_secs())
        .unwrap_or(0);
    format!("{:06}", nanos % 1_000_000)
}

/// Replaces and inserts text runs.
///
/// Text is always drawn with the primary TrueType font when one is
/// configured and loadable for the current document generation; otherwise
/// the built-in Helvetica. CJK replacement strings need the TrueType font,
/// so a fallback is logged loudly.
pub struct TextRewriter {
    expand: f32,
    font_path: Option<PathBuf>,
}

impl TextRewriter {
    pub fn new(expand: f32, font_path: Option<PathBuf>) -> Self {
        Self { expand, font_path }
    }

    fn load_font(&self, session: &mut DocumentSession) -> PdfFontToken {
        if let Some(path) = &self.font_path {
            match session
                .document_mut()
                .fonts_mut()
                .load_true_type_from_file(path, true)
            {
                Ok(token) => return token,
                Err(e) => {
                    warn!(path = %path.display(), error = ?e, "font load failed, using Helvetica");
                }
            }
        }
        session.document_mut().fonts_mut().helvetica()
    }

    /// Replace the first block on page 0 whose text starts with the rule's
    /// prefix. Returns `false` when no block matches.
    pub fn rewrite_title(
        &self,
        session: &mut DocumentSession,
        rule: &TitleRewriteRule,
    ) -> Result<bool, RestampError> {
        let font = self.load_font(session);
        let total = session.page_count();
        let mut page = session
            .document()
            .pages()
            .get(0)
            .map_err(|_| RestampError::PageOutOfRange { page: 0, total })?;
        let page_height = page.height().value;

        let predicate = MatchPredicate::Prefix(rule.prefix.clone());
        let target = GeometryIndex::blocks_for_page(&page)?
            .into_iter()
            .find(|block| predicate.matches(0, &block.text));

        let Some(block) = target else {
            return Ok(false);
        };

        // The title block's bounds include decorative art to its right;
        // trim to the measured text area before covering.
        let adjusted = Rect::new(
            block.rect.x0 + rule.offsets.left_inset,
            block.rect.y0 - rule.offsets.vertical_nudge,
            block.rect.x1 - rule.offsets.right_trim,
            block.rect.y1 + rule.offsets.vertical_nudge,
        );
        cover_rect(&mut page, &adjusted, self.expand)?;

        let baseline = adjusted.y0 + rule.font_size;
        page.objects_mut()
            .create_text_object(
                PdfPoints::new(adjusted.x0),
                PdfPoints::new(page_height - baseline),
                &rule.replacement,
                font,
                PdfPoints::new(rule.font_size),
            )
            .map_err(|e| RestampError::Internal(format!("creating title text: {e:?}")))?;

        debug!(replacement = %rule.replacement, "title rewritten");
        Ok(true)
    }

    /// Insert the rule's text next to the first block containing its anchor,
    /// on the side the rule's position picks.
    ///
    /// Returns `false` when no anchor block exists on the configured page.
    /// An overflowing line gets one retry in an enlarged rect; a second
    /// overflow is a [`RestampError::TextOverflow`].
    pub fn insert_subtitle(
        &self,
        session: &mut DocumentSession,
        rule: &SubtitleRule,
    ) -> Result<bool, RestampError> {
        let font = self.load_font(session);
        let total = session.page_count();
        let mut page = session
            .document()
            .pages()
            .get(rule.page_index as u16)
            .map_err(|_| RestampError::PageOutOfRange {
                page: rule.page_index,
                total,
            })?;
        let page_width = page.width().value;
        let page_height = page.height().value;

        let target = GeometryIndex::blocks_for_page(&page)?
            .into_iter()
            .find(|block| block.text.contains(&rule.anchor_text));

        let Some(block) = target else {
            return Ok(false);
        };

        let mut rect = insertion_rect(
            &block.rect,
            page_width,
            rule.spacing,
            rule.font_size,
            rule.position,
        );
        let needed = estimated_text_width(&rule.text, rule.font_size);
        if needed > rect.width() {
            rect = enlarged_rect(&rect, page_width);
        }
        if needed > rect.width() {
            return Err(RestampError::TextOverflow {
                page: rule.page_index,
                text: rule.text.clone(),
                width: rect.width(),
                height: rect.height(),
            });
        }

        let baseline = rect.y0 + rule.font_size;
        page.objects_mut()
            .create_text_object(
                PdfPoints::new(rect.x0),
                PdfPoints::new(page_height - baseline),
                &rule.text,
                font,
                PdfPoints::new(rule.font_size),
            )
            .map_err(|e| RestampError::Internal(format!("creating subtitle text: {e:?}")))?;

        debug!(page = rule.page_index, "subtitle inserted");
        Ok(true)
    }

    /// Stamp `<region>-<code>` into the header of every page.
    ///
    /// The code is generated once and reused on every page, so all pages of
    /// one document carry the same stamp. Returns the stamped text and the
    /// number of pages touched.
    pub fn stamp_header_code(
        &self,
        session: &mut DocumentSession,
        rule: &HeaderStampRule,
        region_code: &str,
    ) -> Result<(String, usize), RestampError> {
        let font = self.load_font(session);
        let code = rule.fixed_code.clone().unwrap_or_else(random_six_digits);
        let stamp = format!("{region_code}-{code}");
        let width = estimated_text_width(&stamp, rule.font_size);

        let color = PdfColor::new(
            (rule.color.0 * 255.0) as u8,
            (rule.color.1 * 255.0) as u8,
            (rule.color.2 * 255.0) as u8,
            255,
        );

        let total = session.page_count();
        for page_index in 0..total {
            let mut page = session
                .document()
                .pages()
                .get(page_index as u16)
                .map_err(|_| RestampError::PageOutOfRange {
                    page: page_index,
                    total,
                })?;
            let page_width = page.width().value;
            let page_height = page.height().value;

            // Right-aligned against the configured margin.
            let x = page_width - rule.right_margin - width;
            let baseline = rule.top_margin + rule.font_size;

            let mut object = page
                .objects_mut()
                .create_text_object(
                    PdfPoints::new(x),
                    PdfPoints::new(page_height - baseline),
                    &stamp,
                    font,
                    PdfPoints::new(rule.font_size),
                )
                .map_err(|e| RestampError::Internal(format!("creating header stamp: {e:?}")))?;
            object
                .set_fill_color(color)
                .map_err(|e| RestampError::Internal(format!("setting stamp color: {e:?}")))?;
        }

        debug!(%stamp, pages = total, "header code stamped");
        Ok((stamp, total))
    }
}
