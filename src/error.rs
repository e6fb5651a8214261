//! Error types for the restamp library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`RestampError`] — the transformation of one document cannot proceed at
//!   all (unreadable file, corrupt structure, failed persistence). Returned
//!   as `Err(RestampError)` by the lower-level pipeline functions.
//!
//! * [`ServiceError`] — a failure of one of the external collaborators
//!   (token service, recognition service, chart renderer). These only ever
//!   disable the step that depends on the service; the rest of the pipeline
//!   continues.
//!
//! Inside the orchestrator neither type aborts a batch: each step's error is
//! captured into a [`crate::job::StepOutcome`], attributed to the file and
//! step, and surfaced as a status line plus the final summary.

use std::path::PathBuf;
use thiserror::Error;

/// All errors raised while transforming a single document.
#[derive(Debug, Error)]
pub enum RestampError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The document has too few pages for boundary-page extraction.
    ///
    /// Extraction drops the cover page and the back page, so anything with
    /// two pages or fewer would be emptied. The file is skipped, not failed.
    #[error("Document '{path}' has only {pages} page(s); need more than 2 to drop the cover and back pages")]
    InsufficientPages { path: PathBuf, pages: usize },

    // ── Document errors ───────────────────────────────────────────────────
    /// The PDF structure could not be parsed.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// A page index beyond the document's page count was requested.
    #[error("Page index {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── Structural mutation errors ────────────────────────────────────────
    /// Inserted text did not fit its target rectangle, even after the
    /// enlarged-rectangle retry.
    #[error("Text {text:?} does not fit in a {width:.1}x{height:.1}pt box on page {page}")]
    TextOverflow {
        page: usize,
        text: String,
        width: f32,
        height: f32,
    },

    // ── Placement resolution errors ───────────────────────────────────────
    /// No placement rectangle could be resolved for the targeted image.
    #[error("No placement found for image {ordinal} on page {page}")]
    PlacementUnresolved { page: usize, ordinal: usize },

    /// A handle from a previous document generation was used after a
    /// persist+reopen cycle.
    #[error(
        "Stale handle: resolved in generation {handle} but the document is now at generation {current}\n\
         Re-resolve pages and placements after every persist."
    )]
    StaleGeneration { handle: u64, current: u64 },

    // ── Persistence errors ────────────────────────────────────────────────
    /// Writing the temporary copy or the atomic replace failed.
    ///
    /// The temporary file has been removed and the original target is
    /// untouched.
    #[error("Failed to persist '{path}': {detail}")]
    PersistFailed { path: PathBuf, detail: String },

    /// Could not create the output or image-artifact directory.
    #[error("Failed to create output location '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Engine binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install pdfium or point PDFIUM_LIB_PATH at a directory containing the\n\
platform shared library (libpdfium.so / libpdfium.dylib / pdfium.dll)."
    )]
    EngineBindingFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failure of an external collaborator service.
///
/// Service failures never fail a document outright; they disable the step
/// that needed the service and are reported as a warning.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The token service rejected the credentials or was unreachable.
    #[error("Token request failed: {0}")]
    TokenRequest(String),

    /// No bearer token is available (authentication never succeeded).
    #[error("No bearer token available; recognition is disabled for this batch")]
    TokenMissing,

    /// The recognition service was unreachable or returned a non-2xx status.
    #[error("Recognition request failed: {0}")]
    Recognition(String),

    /// The recognition response could not be parsed.
    #[error("Recognition response malformed: {0}")]
    MalformedResponse(String),

    /// The chart renderer failed to produce a raster.
    #[error("Chart rendering failed: {0}")]
    ChartRender(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_pages_display() {
        let e = RestampError::InsufficientPages {
            path: PathBuf::from("a.pdf"),
            pages: 2,
        };
        let msg = e.to_string();
        assert!(msg.contains("only 2 page"), "got: {msg}");
        assert!(msg.contains("a.pdf"));
    }

    #[test]
    fn stale_generation_display() {
        let e = RestampError::StaleGeneration {
            handle: 1,
            current: 3,
        };
        let msg = e.to_string();
        assert!(msg.contains("generation 1"));
        assert!(msg.contains("generation 3"));
    }

    #[test]
    fn text_overflow_display() {
        let e = RestampError::TextOverflow {
            page: 2,
            text: "Subtitle".into(),
            width: 120.0,
            height: 24.0,
        };
        let msg = e.to_string();
        assert!(msg.contains("120.0x24.0"));
        assert!(msg.contains("page 2"));
    }

    #[test]
    fn service_error_is_cloneable() {
        let e = ServiceError::Recognition("HTTP 503".into());
        let e2 = e.clone();
        assert!(e2.to_string().contains("503"));
    }
}
