//! Chunk submission: one prepared file in, extracted text or a
//! [`BoundaryFailure`] out.
//!
//! There is no retry here. A failed submission ends the run, and the user
//! decides whether to try again; the endpoint's own rate handling is its
//! business.
//!
//! ## Failure descriptions
//!
//! The endpoint proxies an upstream OCR API and is not consistent about error
//! bodies, so the message is picked in this order:
//!
//! 1. a structured message (`{"error": "…"}`, `{"error": {"message": "…"}}`
//!    or `{"message": "…"}`),
//! 2. the raw body, truncated to [`MAX_RAW_BODY_CHARS`],
//! 3. a generic message for the phase that failed.
//!
//! The HTTP status is kept alongside so the display reads `… (HTTP 500)`.

use crate::error::BoundaryFailure;
use crate::source::SourceFile;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Longest raw response body quoted in a failure message.
pub const MAX_RAW_BODY_CHARS: usize = 300;

/// The OCR service, as seen by the orchestrator.
///
/// Implementations must not retry; one call is one upload.
#[async_trait]
pub trait OcrBoundary: Send + Sync {
    async fn submit(&self, file: &SourceFile) -> Result<String, BoundaryFailure>;
}

/// Success body. Only the text is used; `id` and `usage` are logged.
#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    usage: Option<serde_json::Value>,
}

/// HTTP implementation: one multipart POST per file, field name `file`.
#[derive(Debug, Clone)]
pub struct HttpOcrBoundary {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpOcrBoundary {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl OcrBoundary for HttpOcrBoundary {
    async fn submit(&self, file: &SourceFile) -> Result<String, BoundaryFailure> {
        let part = reqwest::multipart::Part::bytes(file.bytes().to_vec())
            .file_name(file.name().to_string())
            .mime_str(file.media_type())
            .map_err(|e| BoundaryFailure::new(format!("Invalid media type: {e}"), None))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let mut request = self.client.post(&self.endpoint).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            let message = if e.is_timeout() {
                "OCR request timed out".to_string()
            } else {
                format!("Could not reach the OCR service: {e}")
            };
            BoundaryFailure::new(message, None)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            BoundaryFailure::new(
                format!("Failed to read OCR response: {e}"),
                Some(status.as_u16()),
            )
        })?;

        if !status.is_success() {
            return Err(describe_failure(
                Some(status.as_u16()),
                &body,
                "OCR request failed",
            ));
        }
        parse_success_body(status.as_u16(), &body)
    }
}

/// Extract the text from a 2xx body.
///
/// A body that is not JSON, or lacks a text field, is a failure carrying the
/// truncated body.
pub fn parse_success_body(status: u16, body: &str) -> Result<String, BoundaryFailure> {
    match serde_json::from_str::<OcrResponse>(body) {
        Ok(OcrResponse {
            text,
            markdown,
            id,
            usage,
        }) if text.is_some() || markdown.is_some() => {
            let text = text.or(markdown).unwrap_or_default();
            debug!("OCR response id={:?} usage={:?} ({} chars)", id, usage, text.len());
            Ok(text)
        }
        Ok(_) => Err(describe_failure(
            Some(status),
            body,
            "OCR response did not contain any text",
        )),
        Err(_) => Err(BoundaryFailure::new(
            format!(
                "OCR service returned an unreadable response: {}",
                non_empty_or(truncate_chars(body.trim(), MAX_RAW_BODY_CHARS), "(empty body)")
            ),
            Some(status),
        )),
    }
}

/// Build a failure from an error body using the structured → raw → generic order.
pub fn describe_failure(status: Option<u16>, body: &str, generic: &str) -> BoundaryFailure {
    let message = structured_message(body)
        .or_else(|| {
            let raw = body.trim();
            (!raw.is_empty()).then(|| truncate_chars(raw, MAX_RAW_BODY_CHARS))
        })
        .unwrap_or_else(|| generic.to_string());
    BoundaryFailure::new(message, status)
}

fn structured_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let candidates = [
        value.get("error").and_then(|e| e.as_str()),
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str()),
        value.get("message").and_then(|m| m.as_str()),
    ];
    let found = candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|m| !m.is_empty())
        .map(str::to_string);
    found
}

/// Cut `s` to at most `max` characters, appending `…` when cut.
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

fn non_empty_or(s: String, fallback: &str) -> String {
    if s.is_empty() {
        fallback.to_string()
    } else {
        s
    }
}

/// Send one file and log the outcome.
pub async fn submit_file(
    boundary: &dyn OcrBoundary,
    file: &SourceFile,
) -> Result<String, BoundaryFailure> {
    let start = Instant::now();
    debug!("Submitting '{}' ({} bytes, {})", file.name(), file.len(), file.media_type());
    match boundary.submit(file).await {
        Ok(text) => {
            debug!(
                "'{}' returned {} chars in {:?}",
                file.name(),
                text.len(),
                start.elapsed()
            );
            Ok(text)
        }
        Err(failure) => {
            warn!("OCR failed for '{}': {}", file.name(), failure);
            Err(failure)
        }
    }
}
