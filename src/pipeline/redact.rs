//! Block covering.

use pdfium_render::prelude::*;
use tracing::{debug, trace};

use crate::config::RedactionRule;
use crate::error::RestampError;
use crate::pipeline::geometry::{GeometryIndex, Rect};
use crate::pipeline::session::DocumentSession;

fn white() -> PdfColor {
    PdfColor::new(255, 255, 255, 255)
}

/// Covers matching content blocks with opaque white fills.
///
/// Covering is purely additive: the original text stays in the content
/// stream underneath the fill. That makes the operation idempotent (a
/// second pass matches nothing new visually and just stacks white on white)
/// and keeps block extraction stable for later steps.
pub struct Redactor {
    expand: f32,
}

impl Redactor {
    pub fn new(expand: f32) -> Self {
        Self { expand }
    }

    /// Cover every block matching `rule`. Returns the number of covered
    /// blocks across the whole document.
    pub fn apply(
        &self,
        session: &mut DocumentSession,
        rule: &RedactionRule,
    ) -> Result<usize, RestampError> {
        let total_pages = session.page_count();
        let mut covered = 0usize;

        for page_index in 0..total_pages {
            if let Some(only) = rule.page_index {
                if only != page_index {
                    continue;
                }
            }
            covered += self.apply_to_page(session, page_index, rule)?;
        }

        debug!(covered, "redaction pass complete");
        Ok(covered)
    }

    fn apply_to_page(
        &self,
        session: &mut DocumentSession,
        page_index: usize,
        rule: &RedactionRule,
    ) -> Result<usize, RestampError> {
        let total = session.page_count();
        let mut page = session
            .document()
            .pages()
            .get(page_index as u16)
            .map_err(|_| RestampError::PageOutOfRange {
                page: page_index,
                total,
            })?;

        // Snapshot the matching rects first; covering mutates the page and
        // invalidates the block list.
        let targets: Vec<Rect> = GeometryIndex::blocks_for_page(&page)?
            .into_iter()
            .filter(|block| rule.predicate.matches(page_index, &block.text))
            .map(|block| block.rect)
            .collect();

        for rect in &targets {
            trace!(page = page_index, ?rect, "covering block");
            cover_rect(&mut page, rect, self.expand)?;
        }

        Ok(targets.len())
    }
}

/// Draw an opaque white rectangle over `rect`, expanded by `expand` points.
pub fn cover_rect(page: &mut PdfPage, rect: &Rect, expand: f32) -> Result<(), RestampError> {
    let page_height = page.height().value;
    let covered = rect.expanded(expand).to_pdf(page_height);
    page.objects_mut()
        .create_path_object_rect(covered, None, None, Some(white()))
        .map_err(|e| RestampError::Internal(format!("creating cover rect: {e:?}")))?;
    Ok(())
}
