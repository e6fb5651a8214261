//! Per-file pipeline sequencing.
//!
//! The orchestrator runs the fixed step order against one source file:
//! extract pages, rewrite the title, cover contact and keyword blocks, swap
//! and add logos, stamp the header code, insert the subtitle, replace the
//! score chart. The source is copied to the output location first and every
//! step edits the copy in place through a [`DocumentSession`], persisting
//! atomically after each structural change.
//!
//! Failure containment: a step failure is recorded and the remaining steps
//! still run. Only a failed persist aborts the file, because the session is
//! closed at that point. Nothing here ever aborts the batch.

use std::fs;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::RestampError;
use crate::job::{output_path_for, JobResult, StepKind, StepOutcome, StepReport, TransformationJob};
use crate::pipeline::images::{ImagePlacementResolver, PlacementPolicy};
use crate::pipeline::pages::PageSetExtractor;
use crate::pipeline::redact::Redactor;
use crate::pipeline::rewrite::TextRewriter;
use crate::pipeline::session::{bind_engine, validate_pdf_file, DocumentSession};
use crate::progress::BatchProgress;
use crate::services::score_from_blocks;

pub struct PipelineOrchestrator {
    config: Arc<PipelineConfig>,
}

impl PipelineOrchestrator {
    pub fn new(config: PipelineConfig) -> Result<Self, RestampError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Transform one file on a blocking worker thread.
    ///
    /// pdfium and the collaborator services both block, so the whole file
    /// runs off the async executor.
    pub async fn process(
        &self,
        job: TransformationJob,
        progress: Arc<dyn BatchProgress>,
    ) -> JobResult {
        let config = Arc::clone(&self.config);
        let source = job.source.clone();
        let handle =
            tokio::task::spawn_blocking(move || run_pipeline(&config, &job, progress.as_ref()));
        match handle.await {
            Ok(result) => result,
            Err(e) => JobResult {
                source,
                output: None,
                steps: vec![StepReport::failed(
                    StepKind::ExtractPages,
                    format!("worker panicked: {e}"),
                )],
            },
        }
    }

    /// Synchronous entry point for callers already on a blocking thread.
    pub fn process_blocking(
        &self,
        job: &TransformationJob,
        progress: &dyn BatchProgress,
    ) -> JobResult {
        run_pipeline(&self.config, job, progress)
    }
}

fn run_pipeline(
    config: &PipelineConfig,
    job: &TransformationJob,
    progress: &dyn BatchProgress,
) -> JobResult {
    let mut result = JobResult {
        source: job.source.clone(),
        output: None,
        steps: Vec::new(),
    };

    // Reject unusable inputs before any output file exists.
    if let Err(e) = validate_pdf_file(&job.source) {
        result
            .steps
            .push(StepReport::failed(StepKind::ExtractPages, e.to_string()));
        return result;
    }

    if let Err(e) = fs::create_dir_all(&job.output_dir) {
        result.steps.push(StepReport::failed(
            StepKind::ExtractPages,
            RestampError::OutputDirFailed {
                path: job.output_dir.clone(),
                source: e,
            }
            .to_string(),
        ));
        return result;
    }

    let output = output_path_for(&job.source, &job.output_dir, job.operator.as_ref());
    if let Err(e) = fs::copy(&job.source, &output) {
        result.steps.push(StepReport::failed(
            StepKind::ExtractPages,
            format!("copying to output location: {e}"),
        ));
        return result;
    }

    let pdfium = match bind_engine() {
        Ok(p) => p,
        Err(e) => {
            let _ = fs::remove_file(&output);
            result
                .steps
                .push(StepReport::failed(StepKind::ExtractPages, e.to_string()));
            return result;
        }
    };

    let mut session = match DocumentSession::open(&pdfium, &output) {
        Ok(s) => s,
        Err(e) => {
            let _ = fs::remove_file(&output);
            result
                .steps
                .push(StepReport::failed(StepKind::ExtractPages, e.to_string()));
            return result;
        }
    };

    // Page extraction decides whether the file produces output at all.
    progress.on_status(StepKind::ExtractPages.label());
    let total_pages = session.page_count();
    match PageSetExtractor::extract(&mut session)
        .and_then(|kept| session.persist_and_reopen("pages").map(|_| kept))
    {
        Ok(kept) => {
            result.steps.push(StepReport::applied(
                StepKind::ExtractPages,
                format!("{total_pages} -> {kept} pages"),
            ));
        }
        Err(e @ RestampError::InsufficientPages { .. }) => {
            drop(session);
            let _ = fs::remove_file(&output);
            result
                .steps
                .push(StepReport::skipped(StepKind::ExtractPages, e.to_string()));
            return result;
        }
        Err(e) => {
            drop(session);
            let _ = fs::remove_file(&output);
            result
                .steps
                .push(StepReport::failed(StepKind::ExtractPages, e.to_string()));
            return result;
        }
    }
    result.output = Some(output.clone());

    let rewriter = TextRewriter::new(config.redaction_expand, config.font_path.clone());
    let redactor = Redactor::new(config.redaction_expand);

    for step in StepKind::ALL.into_iter().skip(1) {
        progress.on_status(step.label());
        let outcome = run_step(step, config, job, &mut session, &rewriter, &redactor);
        match outcome {
            Ok(outcome) => result.steps.push(StepReport { step, outcome }),
            // A fatal error here means the session is gone (persist failed
            // or the reopened file is unreadable); the remaining steps
            // cannot run. The output keeps its last persisted state.
            Err(e) => {
                warn!(step = step.label(), error = %e, "file aborted");
                result
                    .steps
                    .push(StepReport::failed(step, format!("aborted: {e}")));
                return result;
            }
        }
    }

    info!(
        source = %job.source.display(),
        output = %output.display(),
        applied = result.applied_count(),
        failed = result.failed_count(),
        "file complete"
    );
    result
}

/// Run one mutation step, translating its domain result into an outcome.
///
/// `Err` from this function is fatal for the file; everything recoverable
/// is folded into the returned [`StepOutcome`].
fn run_step(
    step: StepKind,
    config: &PipelineConfig,
    job: &TransformationJob,
    session: &mut DocumentSession,
    rewriter: &TextRewriter,
    redactor: &Redactor,
) -> Result<StepOutcome, RestampError> {
    match step {
        StepKind::ExtractPages => Err(RestampError::Internal(
            "page extraction runs before the step loop".into(),
        )),

        StepKind::RewriteTitle => {
            let Some(rule) = &config.title_rewrite else {
                return Ok(StepOutcome::Skipped("not configured".into()));
            };
            match rewriter.rewrite_title(session, rule) {
                Ok(true) => {
                    session.persist_and_reopen("title")?;
                    Ok(StepOutcome::Applied(format!(
                        "title -> {:?}",
                        rule.replacement
                    )))
                }
                Ok(false) => Ok(StepOutcome::Skipped("no matching title block".into())),
                Err(e) => Ok(StepOutcome::Failed(e.to_string())),
            }
        }

        StepKind::RedactContacts => {
            if config.contact_rules.is_empty() {
                return Ok(StepOutcome::Skipped("not configured".into()));
            }
            let mut covered = 0usize;
            for rule in &config.contact_rules {
                match redactor.apply(session, rule) {
                    Ok(n) => covered += n,
                    Err(e) => return Ok(StepOutcome::Failed(e.to_string())),
                }
            }
            if covered == 0 {
                return Ok(StepOutcome::Skipped("no matching blocks".into()));
            }
            session.persist_and_reopen("redact")?;
            Ok(StepOutcome::Applied(format!("{covered} block(s) covered")))
        }

        StepKind::RedactKeywords => {
            let Some(rule) = &config.keyword_rule else {
                return Ok(StepOutcome::Skipped("not configured".into()));
            };
            match redactor.apply(session, rule) {
                Ok(0) => Ok(StepOutcome::Skipped("no matching blocks".into())),
                Ok(covered) => {
                    session.persist_and_reopen("redact")?;
                    Ok(StepOutcome::Applied(format!("{covered} block(s) covered")))
                }
                Err(e) => Ok(StepOutcome::Failed(e.to_string())),
            }
        }

        StepKind::SwapLogo => {
            let Some(rule) = &config.logo_swap else {
                return Ok(StepOutcome::Skipped("not configured".into()));
            };
            let raster = match image::open(&rule.image_path) {
                Ok(r) => r,
                Err(e) => {
                    return Ok(StepOutcome::Failed(format!(
                        "loading logo {}: {e}",
                        rule.image_path.display()
                    )))
                }
            };
            let policy = PlacementPolicy::CornerAnchored { scale: rule.scale };
            let mut swapped = 0usize;
            let mut failures = Vec::new();
            for page_index in 0..session.page_count() {
                let placement = match ImagePlacementResolver::placement_in_corner(
                    session,
                    page_index,
                    rule.region_max_x,
                    rule.region_max_y,
                ) {
                    Ok(Some(p)) => p,
                    Ok(None) => continue,
                    Err(e) => {
                        failures.push(format!("page {page_index}: {e}"));
                        continue;
                    }
                };
                match ImagePlacementResolver::replace(
                    session,
                    &placement,
                    &raster,
                    &policy,
                    config.redaction_expand,
                ) {
                    Ok(()) => swapped += 1,
                    Err(e) => failures.push(format!("page {page_index}: {e}")),
                }
            }
            if swapped > 0 {
                session.persist_and_reopen("logo-swap")?;
            }
            match (swapped, failures.is_empty()) {
                (0, true) => Ok(StepOutcome::Skipped("no corner logo found".into())),
                (0, false) => Ok(StepOutcome::Failed(failures.join("; "))),
                (n, true) => Ok(StepOutcome::Applied(format!("{n} page(s)"))),
                (n, false) => Ok(StepOutcome::Applied(format!(
                    "{n} page(s); failures: {}",
                    failures.join("; ")
                ))),
            }
        }

        StepKind::AddLogo => {
            let Some(rule) = &config.logo_add else {
                return Ok(StepOutcome::Skipped("not configured".into()));
            };
            let raster = match image::open(&rule.image_path) {
                Ok(r) => r,
                Err(e) => {
                    return Ok(StepOutcome::Failed(format!(
                        "loading logo {}: {e}",
                        rule.image_path.display()
                    )))
                }
            };
            let policy = PlacementPolicy::FixedCorner {
                margin_x: rule.margin_x,
                margin_y: rule.margin_y,
                width: rule.width,
                height: rule.height,
                scale: rule.scale,
            };
            let mut added = 0usize;
            let mut failures = Vec::new();
            for page_index in 0..session.page_count() {
                let page_width = match page_width_of(session, page_index) {
                    Ok(w) => w,
                    Err(e) => {
                        failures.push(format!("page {page_index}: {e}"));
                        continue;
                    }
                };
                let Some(target) = policy.target_rect(None, page_width) else {
                    continue;
                };
                match ImagePlacementResolver::insert(session, page_index, &target, &raster) {
                    Ok(()) => added += 1,
                    Err(e) => failures.push(format!("page {page_index}: {e}")),
                }
            }
            if added > 0 {
                session.persist_and_reopen("logo-add")?;
            }
            match (added, failures.is_empty()) {
                (0, false) => Ok(StepOutcome::Failed(failures.join("; "))),
                (n, true) => Ok(StepOutcome::Applied(format!("{n} page(s)"))),
                (n, false) => Ok(StepOutcome::Applied(format!(
                    "{n} page(s); failures: {}",
                    failures.join("; ")
                ))),
            }
        }

        StepKind::StampHeaderCode => {
            let Some(rule) = &config.header_stamp else {
                return Ok(StepOutcome::Skipped("not configured".into()));
            };
            let Some(region) = &job.region_code else {
                return Ok(StepOutcome::Skipped("no region code on the job".into()));
            };
            match rewriter.stamp_header_code(session, rule, region) {
                Ok((stamp, pages)) => {
                    session.persist_and_reopen("stamp")?;
                    Ok(StepOutcome::Applied(format!("{stamp} on {pages} page(s)")))
                }
                Err(e) => Ok(StepOutcome::Failed(e.to_string())),
            }
        }

        StepKind::InsertSubtitle => {
            let Some(rule) = &config.subtitle else {
                return Ok(StepOutcome::Skipped("not configured".into()));
            };
            match rewriter.insert_subtitle(session, rule) {
                Ok(true) => {
                    session.persist_and_reopen("subtitle")?;
                    Ok(StepOutcome::Applied(format!(
                        "{:?} {:?}",
                        rule.position, rule.anchor_text
                    )))
                }
                Ok(false) => Ok(StepOutcome::Skipped("anchor text not found".into())),
                Err(e) => Ok(StepOutcome::Failed(e.to_string())),
            }
        }

        StepKind::ReplaceScoreChart => replace_score_chart(config, job, session),
    }
}

fn replace_score_chart(
    config: &PipelineConfig,
    job: &TransformationJob,
    session: &mut DocumentSession,
) -> Result<StepOutcome, RestampError> {
    let Some(rule) = &config.score_chart else {
        return Ok(StepOutcome::Skipped("not configured".into()));
    };
    let (Some(recognition), Some(chart)) = (&config.recognition_service, &config.chart_renderer)
    else {
        return Ok(StepOutcome::Skipped(
            "recognition or chart service not configured".into(),
        ));
    };
    if rule.page_index >= session.page_count() {
        return Ok(StepOutcome::Skipped(format!(
            "document has no page {}",
            rule.page_index
        )));
    }

    // Everything up to the actual replacement is advisory: an unresolved
    // placement, a recognition failure, or an unusable score leaves the
    // document as it was, so the step is skipped with a warning rather
    // than failed.
    let placement =
        match ImagePlacementResolver::placement_at(session, rule.page_index, rule.image_ordinal) {
            Ok(p) => p,
            Err(e) => {
                warn!(page = rule.page_index, ordinal = rule.image_ordinal, error = %e,
                      "score chart position unresolved");
                return Ok(StepOutcome::Skipped(format!("position unresolved: {e}")));
            }
        };

    let stem = job
        .source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let bytes = match ImagePlacementResolver::extract(
        session,
        &placement,
        job.image_dir.as_deref(),
        &stem,
    ) {
        Ok(b) => b,
        Err(e @ RestampError::PlacementUnresolved { .. }) => {
            return Ok(StepOutcome::Skipped(format!("position unresolved: {e}")))
        }
        Err(e) => return Ok(StepOutcome::Failed(e.to_string())),
    };

    let blocks = match recognition.recognize(&bytes) {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "score recognition failed, chart kept as-is");
            return Ok(StepOutcome::Skipped(e.to_string()));
        }
    };
    let Some(score) = score_from_blocks(&blocks) else {
        warn!(blocks = blocks.len(), "no usable score, chart kept as-is");
        return Ok(StepOutcome::Skipped(format!(
            "no score found in {} recognized block(s)",
            blocks.len()
        )));
    };

    let raster = match chart.render(score, job.effective_date) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "chart render failed, chart kept as-is");
            return Ok(StepOutcome::Skipped(e.to_string()));
        }
    };

    let policy = PlacementPolicy::CenterAnchored {
        scale: rule.scale,
        vertical_offset: rule.vertical_offset,
    };
    match ImagePlacementResolver::replace(
        session,
        &placement,
        &raster,
        &policy,
        config.redaction_expand,
    ) {
        Ok(()) => {
            session.persist_and_reopen("chart")?;
            Ok(StepOutcome::Applied(format!("score {score}")))
        }
        Err(e) => Ok(StepOutcome::Failed(e.to_string())),
    }
}

fn page_width_of(session: &DocumentSession, page_index: usize) -> Result<f32, RestampError> {
    let total = session.page_count();
    let page = session
        .document()
        .pages()
        .get(page_index as u16)
        .map_err(|_| RestampError::PageOutOfRange {
            page: page_index,
            total,
        })?;
    Ok(page.width().value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgress;
    use chrono::NaiveDate;
    use std::path::Path;

    fn job(source: &Path, output_dir: &Path) -> TransformationJob {
        TransformationJob {
            source: source.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            image_dir: None,
            operator: None,
            region_code: None,
            effective_date: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
        }
    }

    #[test]
    fn missing_source_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = PipelineOrchestrator::new(PipelineConfig::new()).unwrap();
        let result = orchestrator.process_blocking(
            &job(Path::new("/nonexistent/in.pdf"), dir.path()),
            &NoopProgress,
        );
        assert!(result.output.is_none());
        assert_eq!(result.failed_count(), 1);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn non_pdf_source_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("fake.pdf");
        std::fs::write(&source, b"not a pdf at all").unwrap();
        let out = dir.path().join("out");

        let orchestrator = PipelineOrchestrator::new(PipelineConfig::new()).unwrap();
        let result = orchestrator.process_blocking(&job(&source, &out), &NoopProgress);
        assert!(result.output.is_none());
        let detail = match &result.steps[0].outcome {
            StepOutcome::Failed(d) => d,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert!(detail.contains("not a valid PDF"), "got: {detail}");
    }
}
