//! External collaborator services.
//!
//! The score-chart step depends on [`RecognitionService`] (OCR over an
//! extracted raster) and [`ChartRenderer`] (renders the replacement chart;
//! only a trait here, implementations live outside this crate), both injected
//! as `Arc<dyn Trait>` through [`crate::config::PipelineConfig`].
//! [`TokenService`] sits behind the recognition client: it exchanges
//! credentials for a short-lived bearer token the client caches.
//!
//! All three are synchronous and perform blocking I/O with fixed timeouts;
//! the orchestrator already runs per-file work on a blocking worker thread,
//! so the services never need their own async plumbing. A service failure
//! disables the dependent step for the current file (or, for authentication,
//! the whole batch) and is reported as a warning, never as a fatal error.

mod recognition;
mod token;

pub use recognition::{score_from_blocks, GeneralTextClient, RecognizedBlock, RecognitionService};
pub use token::{BearerToken, Credentials, IamTokenClient, TokenService};

use chrono::NaiveDate;
use image::DynamicImage;

use crate::error::ServiceError;

/// Produces the replacement score chart raster.
///
/// `score` is the value read off the original chart (0..=2000 in practice);
/// `date` is the job's effective date, rendered into the chart. The returned
/// raster is placed as-is, aspect-fit inside the resolved target rectangle.
pub trait ChartRenderer: Send + Sync {
    fn render(&self, score: u32, date: NaiveDate) -> Result<DynamicImage, ServiceError>;
}
