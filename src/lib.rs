//! # restamp
//!
//! Batch restamping of PDF reports: drops the boundary pages, covers contact
//! and keyword blocks, rewrites the title, stamps a tracking code, swaps
//! logos, and replaces the embedded score chart via OCR. All editing is
//! positional and happens on a copy of each source file.
//!
//! Built on [pdfium-render](https://crates.io/crates/pdfium-render); the
//! pdfium shared library must be installed or pointed at with
//! `PDFIUM_LIB_PATH`.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use restamp::{BatchRunner, NoopProgress, PipelineConfig, TransformationJob};
//!
//! # async fn demo() -> Result<(), restamp::RestampError> {
//! let config = PipelineConfig::new()
//!     .with_font_path("assets/simhei.ttf");
//!
//! let job = TransformationJob {
//!     source: "reports/acme.pdf".into(),
//!     output_dir: "out".into(),
//!     image_dir: None,
//!     operator: None,
//!     region_code: Some("SH".into()),
//!     effective_date: chrono::NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
//! };
//!
//! let runner = BatchRunner::new(config)?;
//! let summary = runner.run(vec![job], Arc::new(NoopProgress)).await;
//! println!("{} of {} files succeeded", summary.succeeded, summary.total);
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees
//!
//! * Source files are never modified; all editing happens on the output
//!   copy, and output names never collide with existing files.
//! * Every structural change is persisted atomically (temp file + rename);
//!   a crash leaves the last fully persisted state, never a torn file.
//! * A step failure is contained to its step, a file failure to its file.

pub mod batch;
pub mod config;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod services;
pub mod settings;

pub use batch::{collect_pdf_sources, BatchRunner, BatchSummary, CancelFlag, FileDisposition};
pub use config::PipelineConfig;
pub use error::{RestampError, ServiceError};
pub use job::{JobResult, Operator, StepKind, StepOutcome, StepReport, TransformationJob};
pub use orchestrator::PipelineOrchestrator;
pub use progress::{BatchProgress, NoopProgress};
pub use settings::Settings;
