//! CLI binary for restamp.
//!
//! A thin shim over the library crate: loads the settings file, maps CLI
//! flags onto jobs, and renders batch progress.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use restamp::services::{Credentials, GeneralTextClient, IamTokenClient};
use restamp::{
    collect_pdf_sources, BatchProgress, BatchRunner, BatchSummary, FileDisposition, JobResult,
    Operator, Settings, StepOutcome, TransformationJob,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar across the whole batch, one printed line per
/// finished file.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} files  ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        bar.set_prefix("Restamping");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl BatchProgress for CliProgress {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn on_file_start(&self, source: &Path, _index: usize, _total: usize) {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.bar.set_message(name);
    }

    fn on_status(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn on_file_complete(&self, result: &JobResult) {
        let name = result
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let line = match restamp::batch::classify(result) {
            FileDisposition::Succeeded => format!(
                "  {} {name}  {}",
                green("✓"),
                dim(&format!("{} step(s) applied", result.applied_count()))
            ),
            FileDisposition::PartiallyApplied => {
                let failures: Vec<String> = result
                    .steps
                    .iter()
                    .filter_map(|s| match &s.outcome {
                        StepOutcome::Failed(reason) => {
                            Some(format!("{}: {reason}", s.step.label()))
                        }
                        _ => None,
                    })
                    .collect();
                format!("  {} {name}  {}", yellow("⚠"), red(&failures.join("; ")))
            }
            FileDisposition::Skipped => {
                format!("  {} {name}  {}", dim("·"), dim("skipped"))
            }
            FileDisposition::Failed => {
                let reason = result
                    .steps
                    .first()
                    .map(|s| match &s.outcome {
                        StepOutcome::Failed(r) => r.clone(),
                        _ => String::new(),
                    })
                    .unwrap_or_default();
                format!("  {} {name}  {}", red("✗"), red(&reason))
            }
        };
        self.bar.println(line);
    }

    fn on_progress(&self, done: usize, _total: usize) {
        self.bar.set_position(done as u64);
    }

    fn on_batch_complete(&self, _summary: &BatchSummary) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Restamp every PDF in a folder
  restamp reports/ -o processed/

  # Single file, with operator attribution in the output name
  restamp report.pdf -o out/ --operator-id 1024 --operator-name lin

  # Region code for the header stamp, fixed date for the chart
  restamp reports/ -o out/ --region SH --date 2026-08-01

  # Machine-readable summary
  restamp reports/ -o out/ --json > summary.json

SETTINGS:
  Matching rules, asset paths, and recognition credentials live in a JSON
  settings file (default: restamp.json next to the working directory). The
  file is created with defaults on first run; blank rules skip their step.

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   Directory containing the pdfium shared library
                    (libpdfium.so / libpdfium.dylib / pdfium.dll)
"#;

/// Batch-restamp PDF reports: trim pages, cover blocks, swap logos.
#[derive(Parser, Debug)]
#[command(
    name = "restamp",
    version,
    about = "Batch-restamp PDF reports: trim pages, cover blocks, swap logos",
    arg_required_else_help = true,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// A PDF file or a directory of PDFs.
    input: PathBuf,

    /// Directory the processed copies are written to.
    #[arg(short, long, env = "RESTAMP_OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Settings file (created with defaults when absent).
    #[arg(short, long, env = "RESTAMP_SETTINGS", default_value = "restamp.json")]
    settings: PathBuf,

    /// Directory for extracted image artifacts.
    #[arg(long, env = "RESTAMP_IMAGE_DIR")]
    image_dir: Option<PathBuf>,

    /// Operator id for the output name prefix.
    #[arg(long)]
    operator_id: Option<String>,

    /// Operator name for the output name prefix.
    #[arg(long)]
    operator_name: Option<String>,

    /// Region code stamped into every page header; overrides the settings.
    #[arg(long)]
    region: Option<String>,

    /// Effective date for the replacement chart (YYYY-MM-DD, default today).
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Print the batch summary as JSON to stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Suppress INFO-level library logs while the bar is active; the bar and
    // its per-file lines are the user-facing feedback.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let settings = Settings::load_or_default(&cli.settings)
        .with_context(|| format!("loading settings from {}", cli.settings.display()))?;

    let mut config = settings.to_pipeline_config();
    if settings.recognition.is_configured() {
        let token = IamTokenClient::new(settings.recognition.token_endpoint.clone())
            .context("building token client")?;
        let recognition = GeneralTextClient::new(
            settings.recognition.recognition_endpoint.clone(),
            Credentials {
                username: settings.recognition.username.clone(),
                password: settings.recognition.password.clone(),
                domain: settings.recognition.domain.clone(),
                project: settings.recognition.project.clone(),
            },
            Arc::new(token),
        )
        .context("building recognition client")?;
        config = config.with_recognition_service(Arc::new(recognition));
    }

    let sources = if cli.input.is_dir() {
        collect_pdf_sources(&cli.input).context("scanning input directory")?
    } else {
        vec![cli.input.clone()]
    };
    if sources.is_empty() {
        anyhow::bail!("no PDF files found in {}", cli.input.display());
    }

    let operator = match (&cli.operator_id, &cli.operator_name) {
        (Some(id), Some(name)) => Some(Operator {
            id: id.clone(),
            name: name.clone(),
        }),
        (None, None) => {
            if settings.operator_id.is_empty() || settings.operator_name.is_empty() {
                None
            } else {
                Some(Operator {
                    id: settings.operator_id.clone(),
                    name: settings.operator_name.clone(),
                })
            }
        }
        _ => anyhow::bail!("--operator-id and --operator-name must be given together"),
    };

    let region_code = cli
        .region
        .clone()
        .or_else(|| (!settings.region_code.is_empty()).then(|| settings.region_code.clone()));
    let effective_date = cli.date.unwrap_or_else(|| chrono::Local::now().date_naive());
    let image_dir = cli
        .image_dir
        .clone()
        .or_else(|| (!settings.image_dir.is_empty()).then(|| PathBuf::from(&settings.image_dir)));

    let jobs: Vec<TransformationJob> = sources
        .into_iter()
        .map(|source| TransformationJob {
            source,
            output_dir: cli.output_dir.clone(),
            image_dir: image_dir.clone(),
            operator: operator.clone(),
            region_code: region_code.clone(),
            effective_date,
        })
        .collect();

    let runner = BatchRunner::new(config).context("invalid pipeline configuration")?;

    // Ctrl-C finishes the current file, then stops the batch.
    let cancel = runner.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nstopping after the current file...");
            cancel.cancel();
        }
    });

    let progress: Arc<dyn BatchProgress> = if show_progress {
        CliProgress::new()
    } else {
        Arc::new(restamp::NoopProgress)
    };
    let summary = runner.run(jobs, progress).await;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("serializing summary")?
        );
    } else if !cli.quiet {
        let symbol = if summary.failed == 0 {
            green("✔")
        } else {
            yellow("⚠")
        };
        eprintln!(
            "{symbol} {} succeeded, {} partial, {} skipped, {} failed  →  {}",
            bold(&summary.succeeded.to_string()),
            summary.partially_applied,
            summary.skipped,
            red(&summary.failed.to_string()),
            bold(&cli.output_dir.display().to_string()),
        );
        if summary.cancelled {
            eprintln!("{}", dim("batch cancelled before completion"));
        }
    }

    if summary.failed > 0 && summary.succeeded == 0 && summary.partially_applied == 0 {
        std::process::exit(1);
    }
    Ok(())
}
