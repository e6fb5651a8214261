//! Boundary-page extraction.

use tracing::debug;

use crate::error::RestampError;
use crate::pipeline::session::DocumentSession;

/// Drops the boundary pages from a document.
///
/// The reports carry a cover sheet up front and a disclosure sheet at the
/// back; pages [1..N-2] (0-based) survive in their original order, and all
/// later pipeline steps address pages by their post-extraction indices.
pub struct PageSetExtractor;

impl PageSetExtractor {
    /// How many pages survive extraction, or `None` when the document is too
    /// short and must be skipped without producing output.
    pub fn kept_page_count(total: usize) -> Option<usize> {
        if total <= 2 {
            None
        } else {
            Some(total - 2)
        }
    }

    /// Delete the first and the last page in place.
    ///
    /// Returns the surviving page count. Too-short documents raise
    /// [`RestampError::InsufficientPages`]; the caller reports the file as
    /// skipped and produces no output.
    pub fn extract(session: &mut DocumentSession) -> Result<usize, RestampError> {
        let total = session.page_count();
        let kept =
            Self::kept_page_count(total).ok_or_else(|| RestampError::InsufficientPages {
                path: session.path().to_path_buf(),
                pages: total,
            })?;

        let document = session.document_mut();
        // Back page first so the cover keeps index 0 until its own delete.
        let last = document.pages().len() - 1;
        document
            .pages()
            .get(last)
            .and_then(|page| page.delete())
            .map_err(|e| RestampError::Internal(format!("deleting page {last}: {e:?}")))?;
        document
            .pages()
            .get(0)
            .and_then(|page| page.delete())
            .map_err(|e| RestampError::Internal(format!("deleting page 0: {e:?}")))?;

        debug!(total, kept, "boundary pages dropped");
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kept_count_drops_both_boundary_pages() {
        assert_eq!(PageSetExtractor::kept_page_count(10), Some(8));
        assert_eq!(PageSetExtractor::kept_page_count(3), Some(1));
    }

    #[test]
    fn short_documents_are_rejected() {
        assert_eq!(PageSetExtractor::kept_page_count(2), None);
        assert_eq!(PageSetExtractor::kept_page_count(1), None);
        assert_eq!(PageSetExtractor::kept_page_count(0), None);
    }
}
