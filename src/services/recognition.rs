//! Text recognition over extracted rasters.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::ServiceError;
use crate::pipeline::geometry::Rect;
use crate::services::token::{BearerToken, Credentials, TokenService};

const RECOGNITION_TIMEOUT: Duration = Duration::from_secs(30);

/// One recognized run of text, in reading order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedBlock {
    pub text: String,
    /// Bounding box in image pixel coordinates, when the backend reports one.
    pub region: Option<Rect>,
}

/// OCR over a raster image.
pub trait RecognitionService: Send + Sync {
    fn recognize(&self, image_bytes: &[u8]) -> Result<Vec<RecognizedBlock>, ServiceError>;
}

/// Pull the score out of a recognition result.
///
/// The chart layout puts the score value in the third block from the end
/// (the trailing blocks are the legend and the date). The block's text may
/// carry surrounding words; the first embedded run of digits is the score.
pub fn score_from_blocks(blocks: &[RecognizedBlock]) -> Option<u32> {
    static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("static regex"));

    if blocks.len() < 3 {
        return None;
    }
    let candidate = &blocks[blocks.len() - 3].text;
    DIGITS
        .find(candidate)
        .and_then(|m| m.as_str().parse::<u32>().ok())
}

#[derive(Deserialize)]
struct WireResponse {
    result: WireResult,
}

#[derive(Deserialize)]
struct WireResult {
    words_block_list: Vec<WireBlock>,
}

#[derive(Deserialize)]
struct WireBlock {
    words: String,
    #[serde(default)]
    location: Vec<[f32; 2]>,
}

impl WireBlock {
    fn region(&self) -> Option<Rect> {
        if self.location.is_empty() {
            return None;
        }
        let mut rect = Rect::new(f32::MAX, f32::MAX, f32::MIN, f32::MIN);
        for [x, y] in &self.location {
            rect.x0 = rect.x0.min(*x);
            rect.y0 = rect.y0.min(*y);
            rect.x1 = rect.x1.max(*x);
            rect.y1 = rect.y1.max(*y);
        }
        Some(rect)
    }
}

/// HTTP client for a general-text recognition endpoint.
///
/// Authenticates lazily through the injected [`TokenService`] and caches the
/// token for the life of the client (one batch). A failed authentication is
/// cached too, so a batch with bad credentials warns once instead of
/// hammering the token endpoint for every file.
pub struct GeneralTextClient {
    endpoint: String,
    credentials: Credentials,
    token_service: Arc<dyn TokenService>,
    token: Mutex<Option<Result<BearerToken, ServiceError>>>,
    http: reqwest::blocking::Client,
}

impl GeneralTextClient {
    pub fn new(
        endpoint: impl Into<String>,
        credentials: Credentials,
        token_service: Arc<dyn TokenService>,
    ) -> Result<Self, ServiceError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(RECOGNITION_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::Recognition(format!("client build: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            credentials,
            token_service,
            token: Mutex::new(None),
            http,
        })
    }

    fn token(&self) -> Result<BearerToken, ServiceError> {
        let mut cached = self
            .token
            .lock()
            .map_err(|_| ServiceError::Recognition("token cache poisoned".into()))?;
        if cached.is_none() {
            let outcome = self.token_service.authenticate(&self.credentials);
            if let Err(e) = &outcome {
                warn!(error = %e, "token acquisition failed; recognition disabled");
            }
            *cached = Some(outcome);
        }
        match cached.as_ref() {
            Some(Ok(token)) => Ok(token.clone()),
            Some(Err(_)) => Err(ServiceError::TokenMissing),
            None => unreachable!("cache filled above"),
        }
    }
}

impl RecognitionService for GeneralTextClient {
    fn recognize(&self, image_bytes: &[u8]) -> Result<Vec<RecognizedBlock>, ServiceError> {
        let token = self.token()?;
        let payload = json!({
            "image": base64::engine::general_purpose::STANDARD.encode(image_bytes),
        });

        debug!(endpoint = %self.endpoint, bytes = image_bytes.len(), "recognition request");
        let response = self
            .http
            .post(&self.endpoint)
            .header("X-Auth-Token", token.as_str())
            .json(&payload)
            .send()
            .map_err(|e| ServiceError::Recognition(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Recognition(format!(
                "HTTP {status} from recognition endpoint"
            )));
        }

        let wire: WireResponse = response
            .json()
            .map_err(|e| ServiceError::MalformedResponse(e.to_string()))?;

        Ok(wire
            .result
            .words_block_list
            .into_iter()
            .map(|b| RecognizedBlock {
                region: b.region(),
                text: b.words,
            })
            .collect())
    }
}
