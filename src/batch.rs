//! Batch driving.
//!
//! Files run strictly sequentially: the transformation is I/O- and
//! engine-bound, and sequential processing keeps the progress reporting and
//! the per-file logs readable. One file's failure never touches the rest of
//! the batch.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::RestampError;
use crate::job::{JobResult, StepOutcome, TransformationJob};
use crate::orchestrator::PipelineOrchestrator;
use crate::progress::BatchProgress;

/// Cooperative cancellation handle.
///
/// Checked between files only: an in-flight file always runs to completion
/// so its output is never left half-transformed.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How one file ended up, for the summary counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileDisposition {
    /// Output produced, no step failed.
    Succeeded,
    /// Output produced but at least one step failed.
    PartiallyApplied,
    /// No output on purpose (too few pages, nothing to do).
    Skipped,
    /// No output because of an error.
    Failed,
}

pub fn classify(result: &JobResult) -> FileDisposition {
    if result.produced_output() {
        if result.failed_count() == 0 {
            FileDisposition::Succeeded
        } else {
            FileDisposition::PartiallyApplied
        }
    } else if result
        .steps
        .iter()
        .all(|s| matches!(s.outcome, StepOutcome::Skipped(_)))
    {
        FileDisposition::Skipped
    } else {
        FileDisposition::Failed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub partially_applied: usize,
    pub skipped: usize,
    pub failed: usize,
    /// True when the batch stopped early on a cancellation request; files
    /// after the stop point are absent from `results`.
    pub cancelled: bool,
    pub results: Vec<JobResult>,
}

impl BatchSummary {
    fn empty(total: usize) -> Self {
        Self {
            total,
            succeeded: 0,
            partially_applied: 0,
            skipped: 0,
            failed: 0,
            cancelled: false,
            results: Vec::new(),
        }
    }

    fn record(&mut self, result: JobResult) {
        match classify(&result) {
            FileDisposition::Succeeded => self.succeeded += 1,
            FileDisposition::PartiallyApplied => self.partially_applied += 1,
            FileDisposition::Skipped => self.skipped += 1,
            FileDisposition::Failed => self.failed += 1,
        }
        self.results.push(result);
    }
}

/// Drives a sequence of jobs through one [`PipelineOrchestrator`].
pub struct BatchRunner {
    orchestrator: PipelineOrchestrator,
    cancel: CancelFlag,
}

impl BatchRunner {
    pub fn new(config: PipelineConfig) -> Result<Self, RestampError> {
        Ok(Self {
            orchestrator: PipelineOrchestrator::new(config)?,
            cancel: CancelFlag::new(),
        })
    }

    /// A handle callers can use to stop the batch between files.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub async fn run(
        &self,
        jobs: Vec<TransformationJob>,
        progress: Arc<dyn BatchProgress>,
    ) -> BatchSummary {
        let total = jobs.len();
        let mut summary = BatchSummary::empty(total);
        progress.on_batch_start(total);

        for (index, job) in jobs.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(done = index, total, "batch cancelled");
                summary.cancelled = true;
                break;
            }

            progress.on_file_start(&job.source, index, total);
            let result = self.orchestrator.process(job, Arc::clone(&progress)).await;
            progress.on_file_complete(&result);
            summary.record(result);
            progress.on_progress(index + 1, total);
        }

        progress.on_batch_complete(&summary);
        summary
    }
}

/// All PDF files directly inside `dir`, sorted by name.
pub fn collect_pdf_sources(dir: &Path) -> Result<Vec<PathBuf>, RestampError> {
    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RestampError::FileNotFound {
            path: dir.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => RestampError::PermissionDenied {
            path: dir.to_path_buf(),
        },
        _ => RestampError::Internal(format!("reading {}: {e}", dir.display())),
    })?;

    let mut sources: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                    .unwrap_or(false)
        })
        .collect();
    sources.sort();
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{StepKind, StepReport};
    use crate::progress::NoopProgress;
    use chrono::NaiveDate;
    use std::sync::atomic::AtomicUsize;

    fn result(output: Option<&str>, steps: Vec<StepReport>) -> JobResult {
        JobResult {
            source: "in.pdf".into(),
            output: output.map(PathBuf::from),
            steps,
        }
    }

    #[test]
    fn classification_covers_all_dispositions() {
        let ok = result(
            Some("out.pdf"),
            vec![StepReport::applied(StepKind::ExtractPages, "5 -> 3 pages")],
        );
        assert_eq!(classify(&ok), FileDisposition::Succeeded);

        let partial = result(
            Some("out.pdf"),
            vec![
                StepReport::applied(StepKind::ExtractPages, "5 -> 3 pages"),
                StepReport::failed(StepKind::SwapLogo, "no raster"),
            ],
        );
        assert_eq!(classify(&partial), FileDisposition::PartiallyApplied);

        let skipped = result(
            None,
            vec![StepReport::skipped(StepKind::ExtractPages, "2 pages")],
        );
        assert_eq!(classify(&skipped), FileDisposition::Skipped);

        let failed = result(
            None,
            vec![StepReport::failed(StepKind::ExtractPages, "not a PDF")],
        );
        assert_eq!(classify(&failed), FileDisposition::Failed);
    }

    #[test]
    fn pdf_sources_are_filtered_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("a.PDF"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub.pdf")).unwrap();

        let sources = collect_pdf_sources(dir.path()).unwrap();
        let names: Vec<_> = sources
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
    }

    fn job(source: PathBuf, output_dir: PathBuf) -> TransformationJob {
        TransformationJob {
            source,
            output_dir,
            image_dir: None,
            operator: None,
            region_code: None,
            effective_date: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
        }
    }

    struct Recorder {
        files: AtomicUsize,
        progress_calls: AtomicUsize,
    }

    impl BatchProgress for Recorder {
        fn on_file_complete(&self, _result: &JobResult) {
            self.files.fetch_add(1, Ordering::SeqCst);
        }
        fn on_progress(&self, _done: usize, _total: usize) {
            self.progress_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn failing_file_does_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().to_path_buf();
        let jobs = vec![
            job(PathBuf::from("/nonexistent/a.pdf"), out.clone()),
            job(PathBuf::from("/nonexistent/b.pdf"), out.clone()),
        ];

        let runner = BatchRunner::new(PipelineConfig::new()).unwrap();
        let recorder = Arc::new(Recorder {
            files: AtomicUsize::new(0),
            progress_calls: AtomicUsize::new(0),
        });
        let summary = runner.run(jobs, recorder.clone()).await;

        assert_eq!(summary.total, 2);
        assert_eq!(summary.failed, 2);
        assert!(!summary.cancelled);
        assert_eq!(recorder.files.load(Ordering::SeqCst), 2);
        // Progress fires after every file, failures included.
        assert_eq!(recorder.progress_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancellation_stops_before_the_next_file() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = vec![job(
            PathBuf::from("/nonexistent/a.pdf"),
            dir.path().to_path_buf(),
        )];

        let runner = BatchRunner::new(PipelineConfig::new()).unwrap();
        runner.cancel_flag().cancel();
        let summary = runner.run(jobs, Arc::new(NoopProgress)).await;

        assert!(summary.cancelled);
        assert!(summary.results.is_empty());
    }
}
