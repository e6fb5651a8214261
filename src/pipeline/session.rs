//! Document lifetime, generations, and crash-safe persistence.
//!
//! A [`DocumentSession`] owns one open document and a monotonic generation
//! counter. Mutation steps run against the open document; between steps the
//! session persists atomically and reopens, bumping the generation. Any
//! handle resolved against an earlier generation (image placements in
//! particular) is rejected with [`RestampError::StaleGeneration`] instead of
//! silently pointing at a rewritten object graph.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use pdfium_render::prelude::*;
use tracing::debug;

use crate::error::RestampError;

const PDF_MAGIC: [u8; 4] = *b"%PDF";

/// Bind to the pdfium shared library.
///
/// `PDFIUM_LIB_PATH` takes precedence; otherwise the system library search
/// path is used. Binding once per process and sharing the handle is fine:
/// the `thread_safe` feature serialises access internally.
pub fn bind_engine() -> Result<Pdfium, RestampError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir)),
        Err(_) => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| RestampError::EngineBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Validate that `path` is a readable PDF file.
///
/// Checks existence, readability, and the `%PDF` magic before handing the
/// file to the engine, so the caller gets a precise error instead of a
/// generic parse failure.
pub fn validate_pdf_file(path: &Path) -> Result<(), RestampError> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RestampError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => RestampError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => RestampError::CorruptPdf {
            path: path.to_path_buf(),
            detail: e.to_string(),
        },
    })?;

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)
        .map_err(|e| RestampError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("cannot read header: {e}"),
        })?;
    if magic != PDF_MAGIC {
        return Err(RestampError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

/// Monotonic document generation. Bumped on every persist+reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(pub u64);

/// Crash-safe whole-document persistence.
///
/// The document is saved to a sibling temporary file first; only after the
/// save completes is the target replaced via `rename`, which is atomic on
/// the same filesystem. A failure at any point removes the temporary file
/// and leaves the target untouched.
pub struct AtomicPersister {
    target: PathBuf,
}

impl AtomicPersister {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
        }
    }

    fn temp_path(&self, tag: &str) -> PathBuf {
        let mut name = self.target.as_os_str().to_os_string();
        name.push(format!(".{tag}.tmp"));
        PathBuf::from(name)
    }

    /// Save `document` to the sibling temporary file, returning its path.
    pub fn stage(&self, document: &PdfDocument, tag: &str) -> Result<PathBuf, RestampError> {
        let temp = self.temp_path(tag);
        document.save_to_file(&temp).map_err(|e| {
            let _ = fs::remove_file(&temp);
            RestampError::PersistFailed {
                path: self.target.clone(),
                detail: format!("saving temporary copy: {e:?}"),
            }
        })?;
        Ok(temp)
    }

    /// Atomically replace the target with the staged file.
    ///
    /// The in-memory document must already be closed: on some platforms the
    /// open handle would block the replace.
    pub fn commit(&self, temp: &Path) -> Result<(), RestampError> {
        fs::rename(temp, &self.target).map_err(|e| {
            let _ = fs::remove_file(temp);
            RestampError::PersistFailed {
                path: self.target.clone(),
                detail: format!("replacing target: {e}"),
            }
        })
    }

}

/// One open document plus its generation counter.
///
/// The borrow checker enforces the ephemerality rules by construction: pages
/// and objects borrow the document, and `persist_and_reopen` needs `&mut
/// self`, so no page handle can survive a persist.
pub struct DocumentSession<'a> {
    pdfium: &'a Pdfium,
    path: PathBuf,
    document: Option<PdfDocument<'a>>,
    generation: u64,
}

impl<'a> DocumentSession<'a> {
    /// Open `path` for in-place editing.
    pub fn open(pdfium: &'a Pdfium, path: impl Into<PathBuf>) -> Result<Self, RestampError> {
        let path = path.into();
        validate_pdf_file(&path)?;
        let document =
            pdfium
                .load_pdf_from_file(&path, None)
                .map_err(|e| RestampError::CorruptPdf {
                    path: path.clone(),
                    detail: format!("{e:?}"),
                })?;
        Ok(Self {
            pdfium,
            path,
            document: Some(document),
            generation: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn generation(&self) -> Generation {
        Generation(self.generation)
    }

    /// Reject a handle resolved in an earlier generation.
    pub fn check_generation(&self, handle: Generation) -> Result<(), RestampError> {
        if handle.0 != self.generation {
            return Err(RestampError::StaleGeneration {
                handle: handle.0,
                current: self.generation,
            });
        }
        Ok(())
    }

    pub fn document(&self) -> &PdfDocument<'a> {
        self.document
            .as_ref()
            .expect("session document is only absent mid-persist")
    }

    pub fn document_mut(&mut self) -> &mut PdfDocument<'a> {
        self.document
            .as_mut()
            .expect("session document is only absent mid-persist")
    }

    pub fn page_count(&self) -> usize {
        self.document().pages().len() as usize
    }

    /// Persist the current state atomically and reopen.
    ///
    /// On success the generation is bumped and every handle resolved before
    /// the call is stale. On failure the on-disk file keeps its previous
    /// contents and the session is closed; the error aborts the file.
    pub fn persist_and_reopen(&mut self, tag: &str) -> Result<(), RestampError> {
        let persister = AtomicPersister::new(&self.path);

        let temp = {
            let document = self.document();
            persister.stage(document, tag)?
        };

        // Close before the replace; pdfium holds the file open.
        self.document = None;
        persister.commit(&temp)?;

        let document = self
            .pdfium
            .load_pdf_from_file(&self.path, None)
            .map_err(|e| RestampError::CorruptPdf {
                path: self.path.clone(),
                detail: format!("reopening after persist: {e:?}"),
            })?;
        self.document = Some(document);
        self.generation += 1;
        debug!(path = %self.path.display(), generation = self.generation, tag, "persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_file_not_found() {
        let err = validate_pdf_file(Path::new("/nonexistent/q.pdf")).unwrap_err();
        assert!(matches!(err, RestampError::FileNotFound { .. }));
    }

    #[test]
    fn wrong_magic_is_not_a_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        fs::write(&path, b"PK\x03\x04 zip archive").unwrap();
        let err = validate_pdf_file(&path).unwrap_err();
        match err {
            RestampError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn pdf_magic_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.pdf");
        fs::write(&path, b"%PDF-1.7\n...").unwrap();
        assert!(validate_pdf_file(&path).is_ok());
    }

    #[test]
    fn temp_path_is_a_sibling() {
        let persister = AtomicPersister::new("/out/report_processed.pdf");
        let temp = persister.temp_path("redact");
        assert_eq!(
            temp,
            PathBuf::from("/out/report_processed.pdf.redact.tmp")
        );
    }

    #[test]
    fn commit_replaces_target_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("doc.pdf");
        fs::write(&target, b"old").unwrap();

        let persister = AtomicPersister::new(&target);
        let temp = dir.path().join("doc.pdf.step.tmp");
        fs::write(&temp, b"new").unwrap();

        persister.commit(&temp).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert!(!temp.exists());
    }

    #[test]
    fn failed_commit_removes_temp_and_keeps_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing-dir").join("doc.pdf");

        let persister = AtomicPersister::new(&target);
        let temp = dir.path().join("doc.pdf.step.tmp");
        fs::write(&temp, b"new").unwrap();

        assert!(persister.commit(&temp).is_err());
        assert!(!temp.exists());
        assert!(!target.exists());
    }
}
