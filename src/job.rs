//! Job description and per-file results.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The person a batch run is attributed to. Used only for output naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub id: String,
    pub name: String,
}

/// Immutable description of one file's transformation.
#[derive(Debug, Clone)]
pub struct TransformationJob {
    /// Source PDF. Never modified.
    pub source: PathBuf,
    /// Directory the processed copy is written to.
    pub output_dir: PathBuf,
    /// Where extracted image artifacts go. `None` means a scratch directory
    /// is used and the artifacts are discarded after recognition.
    pub image_dir: Option<PathBuf>,
    pub operator: Option<Operator>,
    /// Region prefix for the per-document header code, e.g. `"SH"`.
    pub region_code: Option<String>,
    /// Date rendered into the replacement chart.
    pub effective_date: NaiveDate,
}

/// The fixed pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ExtractPages,
    RewriteTitle,
    RedactContacts,
    RedactKeywords,
    SwapLogo,
    AddLogo,
    StampHeaderCode,
    InsertSubtitle,
    ReplaceScoreChart,
}

impl StepKind {
    pub const ALL: [StepKind; 9] = [
        StepKind::ExtractPages,
        StepKind::RewriteTitle,
        StepKind::RedactContacts,
        StepKind::RedactKeywords,
        StepKind::SwapLogo,
        StepKind::AddLogo,
        StepKind::StampHeaderCode,
        StepKind::InsertSubtitle,
        StepKind::ReplaceScoreChart,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            StepKind::ExtractPages => "extract pages",
            StepKind::RewriteTitle => "rewrite title",
            StepKind::RedactContacts => "redact contact blocks",
            StepKind::RedactKeywords => "redact keyword blocks",
            StepKind::SwapLogo => "swap corner logo",
            StepKind::AddLogo => "add top-right logo",
            StepKind::StampHeaderCode => "stamp header code",
            StepKind::InsertSubtitle => "insert subtitle",
            StepKind::ReplaceScoreChart => "replace score chart",
        }
    }
}

/// What happened to one step of one file.
///
/// `Skipped` covers both "nothing matched" and "not configured"; the message
/// says which. `Failed` is non-fatal: later steps still run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum StepOutcome {
    Applied(String),
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: StepKind,
    pub outcome: StepOutcome,
}

impl StepReport {
    pub fn applied(step: StepKind, detail: impl Into<String>) -> Self {
        Self {
            step,
            outcome: StepOutcome::Applied(detail.into()),
        }
    }

    pub fn skipped(step: StepKind, reason: impl Into<String>) -> Self {
        Self {
            step,
            outcome: StepOutcome::Skipped(reason.into()),
        }
    }

    pub fn failed(step: StepKind, reason: impl Into<String>) -> Self {
        Self {
            step,
            outcome: StepOutcome::Failed(reason.into()),
        }
    }
}

/// Everything that happened to one source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub source: PathBuf,
    /// The processed copy, if one was produced. `None` when the file was
    /// rejected up front or had too few pages.
    pub output: Option<PathBuf>,
    pub steps: Vec<StepReport>,
}

impl JobResult {
    pub fn produced_output(&self) -> bool {
        self.output.is_some()
    }

    pub fn applied_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Applied(_)))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed(_)))
            .count()
    }
}

/// Compute a collision-free output path for a job.
///
/// Base name is `<id>-<name>_<stem>_processed.pdf`, or just
/// `<stem>_processed.pdf` when no operator is set. Existing files are never
/// overwritten: `_1`, `_2`, ... are appended until an unused name is found.
pub fn output_path_for(
    source: &Path,
    output_dir: &Path,
    operator: Option<&Operator>,
) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    let base = match operator {
        Some(op) => format!("{}-{}_{}_processed", op.id, op.name, stem),
        None => format!("{stem}_processed"),
    };

    let mut candidate = output_dir.join(format!("{base}.pdf"));
    let mut suffix = 1u32;
    while candidate.exists() {
        candidate = output_dir.join(format!("{base}_{suffix}.pdf"));
        suffix += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_includes_operator_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let op = Operator {
            id: "1024".into(),
            name: "lin".into(),
        };
        let path = output_path_for(Path::new("/in/report.pdf"), dir.path(), Some(&op));
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "1024-lin_report_processed.pdf"
        );
    }

    #[test]
    fn output_name_omits_prefix_without_operator() {
        let dir = tempfile::tempdir().unwrap();
        let path = output_path_for(Path::new("report.pdf"), dir.path(), None);
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "report_processed.pdf"
        );
    }

    #[test]
    fn output_name_skips_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report_processed.pdf"), b"x").unwrap();
        std::fs::write(dir.path().join("report_processed_1.pdf"), b"x").unwrap();
        let path = output_path_for(Path::new("report.pdf"), dir.path(), None);
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "report_processed_2.pdf"
        );
    }

    #[test]
    fn step_counts() {
        let result = JobResult {
            source: "a.pdf".into(),
            output: Some("a_processed.pdf".into()),
            steps: vec![
                StepReport::applied(StepKind::ExtractPages, "3 -> 1 pages"),
                StepReport::skipped(StepKind::SwapLogo, "no logo configured"),
                StepReport::failed(StepKind::ReplaceScoreChart, "recognition timed out"),
            ],
        };
        assert_eq!(result.applied_count(), 1);
        assert_eq!(result.failed_count(), 1);
        assert!(result.produced_output());
    }
}
