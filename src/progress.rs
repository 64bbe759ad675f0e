//! Run state machine and the progress-callback trait.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as a run moves through its phases and submits each chunk.
//!
//! Callbacks are the least-invasive integration point: a host can forward
//! events to a terminal spinner, a channel or a UI status line without the
//! library knowing how it communicates. The trait is `Send + Sync` because
//! state changes are reported from blocking worker threads as well as from
//! the async task driving the run.
//!
//! # Example
//!
//! ```rust
//! use ocr_chunker::{PipelineProgressCallback, PipelineConfig, RunState};
//! use std::sync::{Arc, Mutex};
//!
//! struct StatusLine(Mutex<String>);
//!
//! impl PipelineProgressCallback for StatusLine {
//!     fn on_state_change(&self, state: &RunState) {
//!         *self.0.lock().unwrap() = state.status_text().unwrap_or_default();
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .endpoint("http://localhost:8080/ocr")
//!     .progress_callback(Arc::new(StatusLine(Mutex::new(String::new()))))
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Phase of a single run.
///
/// ```text
/// Idle → Preparing → CompressingImage ─┐
///                  → SplittingPdf ─────┼→ SubmittingChunks(i/n) → Merging → Done
///                  → Submitting ───────┘
/// any non-Idle state → Failed
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Preparing,
    CompressingImage,
    SplittingPdf,
    /// One unsplit file is in flight.
    Submitting,
    /// Chunk `part` of `total` is in flight (1-based).
    SubmittingChunks { part: usize, total: usize },
    Merging,
    Done,
    Failed,
}

impl RunState {
    /// `true` once the run can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    /// Transient status line shown to the user; `None` means "clear it".
    pub fn status_text(&self) -> Option<String> {
        match self {
            RunState::Idle | RunState::Done | RunState::Failed => None,
            RunState::Preparing => Some("Preparing file…".to_string()),
            RunState::CompressingImage => Some("Compressing image…".to_string()),
            RunState::SplittingPdf => Some("Splitting PDF…".to_string()),
            RunState::Submitting => Some("Running OCR…".to_string()),
            RunState::SubmittingChunks { part, total } => {
                Some(format!("Running OCR on chunk {part} of {total}…"))
            }
            RunState::Merging => Some("Merging results…".to_string()),
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => f.write_str("idle"),
            RunState::Preparing => f.write_str("preparing"),
            RunState::CompressingImage => f.write_str("compressing image"),
            RunState::SplittingPdf => f.write_str("splitting PDF"),
            RunState::Submitting => f.write_str("submitting"),
            RunState::SubmittingChunks { part, total } => {
                write!(f, "submitting chunk {part}/{total}")
            }
            RunState::Merging => f.write_str("merging"),
            RunState::Done => f.write_str("done"),
            RunState::Failed => f.write_str("failed"),
        }
    }
}

/// Called by the orchestrator as a run progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `on_state_change` may be called from a blocking
/// worker thread (the splitter reports `SplittingPdf` from there).
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once when a run starts, before preparation.
    fn on_run_start(&self, name: &str, bytes: u64) {
        let _ = (name, bytes);
    }

    /// Called on every state transition.
    fn on_state_change(&self, state: &RunState) {
        let _ = state;
    }

    /// Called just before chunk `part` of `total` is sent (1-based).
    fn on_chunk_start(&self, part: usize, total: usize) {
        let _ = (part, total);
    }

    /// Called when a chunk's text comes back.
    fn on_chunk_complete(&self, part: usize, total: usize, text_len: usize) {
        let _ = (part, total, text_len);
    }

    /// Called when a chunk fails; no later chunk is sent.
    fn on_chunk_error(&self, part: usize, total: usize, error: &str) {
        let _ = (part, total, error);
    }

    /// Called once after the run ends, successfully or not.
    fn on_run_complete(&self, success: bool) {
        let _ = success;
    }
}

/// The default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
