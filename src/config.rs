//! Pipeline configuration.
//!
//! Every knob lives in [`PipelineConfig`], built via
//! [`PipelineConfigBuilder`]. Setters clamp obviously bad values; `build()`
//! rejects combinations that cannot work (an incoherent size policy, a zero
//! timeout).

use crate::error::OcrChunkError;
use crate::pipeline::submit::{HttpOcrBoundary, OcrBoundary};
use crate::policy::SizePolicy;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Environment variable holding the OCR endpoint URL.
pub const ENDPOINT_ENV: &str = "OCR_ENDPOINT";

/// Environment variable holding the bearer token for the endpoint.
pub const API_KEY_ENV: &str = "OCR_API_KEY";

/// Configuration for an OCR run.
///
/// # Example
/// ```rust
/// use ocr_chunker::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .endpoint("https://ocr.example.com/v1/ocr")
///     .api_key("secret")
///     .inter_chunk_pause_ms(500)
///     .build()
///     .unwrap();
/// assert_eq!(config.inter_chunk_pause_ms, 500);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Byte and page budgets. Default: the remote service's limits.
    pub policy: SizePolicy,

    /// OCR endpoint URL. If None along with `boundary`, read from `OCR_ENDPOINT`.
    pub endpoint: Option<String>,

    /// Bearer token sent with every request. Falls back to `OCR_API_KEY`.
    pub api_key: Option<String>,

    /// Pre-constructed boundary. Takes precedence over `endpoint`.
    pub boundary: Option<Arc<dyn OcrBoundary>>,

    /// Per-request timeout for OCR calls, in seconds. Default: 120.
    ///
    /// A 45 MiB chunk upload plus remote OCR of 40 pages routinely takes
    /// over a minute.
    pub request_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Pause between successive chunk submissions, in milliseconds. Default: 250.
    pub inter_chunk_pause_ms: u64,

    /// Directory or file path of the pdfium library. When unset, pdfium-auto
    /// resolves it from `PDFIUM_LIB_PATH`, its cache, or a download.
    pub pdfium_library_path: Option<PathBuf>,

    /// Optional progress callback. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            policy: SizePolicy::default(),
            endpoint: None,
            api_key: None,
            boundary: None,
            request_timeout_secs: 120,
            download_timeout_secs: 120,
            inter_chunk_pause_ms: 250,
            pdfium_library_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("policy", &self.policy)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("boundary", &self.boundary.as_ref().map(|_| "<dyn OcrBoundary>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("inter_chunk_pause_ms", &self.inter_chunk_pause_ms)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Resolve the OCR boundary, from most-specific to least-specific:
    ///
    /// 1. the pre-built `boundary`,
    /// 2. an HTTP boundary for `endpoint` (+ `api_key` or `OCR_API_KEY`),
    /// 3. an HTTP boundary for `OCR_ENDPOINT` (+ `OCR_API_KEY`).
    pub fn resolve_boundary(&self) -> Result<Arc<dyn OcrBoundary>, OcrChunkError> {
        if let Some(ref boundary) = self.boundary {
            return Ok(Arc::clone(boundary));
        }

        let endpoint = self
            .endpoint
            .clone()
            .or_else(|| non_empty_env(ENDPOINT_ENV))
            .ok_or_else(|| OcrChunkError::BoundaryNotConfigured {
                hint: format!("Pass --endpoint URL or set {ENDPOINT_ENV}."),
            })?;
        let api_key = self.api_key.clone().or_else(|| non_empty_env(API_KEY_ENV));
        debug!("Using OCR endpoint {} (auth: {})", endpoint, api_key.is_some());

        let boundary = HttpOcrBoundary::new(endpoint, api_key, self.request_timeout_secs)
            .map_err(|e| OcrChunkError::BoundaryNotConfigured {
                hint: format!("Could not build the HTTP client: {e}"),
            })?;
        Ok(Arc::new(boundary))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn policy(mut self, policy: SizePolicy) -> Self {
        self.config.policy = policy;
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn boundary(mut self, boundary: Arc<dyn OcrBoundary>) -> Self {
        self.config.boundary = Some(boundary);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    pub fn inter_chunk_pause_ms(mut self, ms: u64) -> Self {
        self.config.inter_chunk_pause_ms = ms.min(60_000);
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, OcrChunkError> {
        let c = &self.config;
        c.policy.validate()?;
        if c.request_timeout_secs == 0 {
            return Err(OcrChunkError::InvalidConfig(
                "Request timeout must be ≥ 1 second".into(),
            ));
        }
        if let Some(ref url) = c.endpoint {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(OcrChunkError::InvalidConfig(format!(
                    "Endpoint must be an http(s) URL, got '{url}'"
                )));
            }
        }
        Ok(self.config)
    }
}
