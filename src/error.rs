//! Error types for the ocr-chunker library.
//!
//! Two distinct error types reflect two distinct layers:
//!
//! * [`OcrChunkError`]: **fatal to the run**. The file cannot be prepared
//!   (unsupported type, compression exhausted, unsplittable page) or a
//!   submission failed. Returned as `Err(OcrChunkError)` from
//!   [`crate::run::Orchestrator::run`] and the top-level `ocr_*` functions.
//!   A failed run never affects the next one.
//!
//! * [`BoundaryFailure`]: **what the OCR endpoint said**, a human-readable
//!   message plus the HTTP status where one exists. The submitter returns it
//!   for a single file; the orchestrator wraps it with the chunk position.

use crate::policy::format_mib;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the ocr-chunker library.
#[derive(Debug, Error)]
pub enum OcrChunkError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// Neither an image the OCR service accepts nor a PDF.
    #[error("Unsupported file type for '{name}' ({media_type})\nAccepted types: png, jpg, jpeg, webp, pdf.")]
    UnsupportedMediaType { name: String, media_type: String },

    /// Larger than the local acceptance ceiling; never processed.
    #[error("'{name}' is {} which exceeds the {} upload limit", format_mib(.size), format_mib(.limit))]
    FileTooLarge { name: String, size: u64, limit: u64 },

    // ── Image errors ──────────────────────────────────────────────────────
    /// The raster data could not be decoded.
    #[error("Could not decode image '{name}': {detail}")]
    ImageDecodeFailed { name: String, detail: String },

    /// Re-encoding to JPEG failed or produced no output.
    #[error("Could not re-encode image '{name}': {detail}")]
    ImageEncodeFailed { name: String, detail: String },

    /// Every scale × quality combination stayed above the budget.
    #[error(
        "Image '{name}' could not be compressed below {}; the smallest attempt was {}.\n\
Resize or crop the image manually and try again.",
        format_mib(.budget),
        format_mib(.smallest)
    )]
    CompressionExhausted {
        name: String,
        smallest: u64,
        budget: u64,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{name}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { name: String, detail: String },

    /// PDF requires a password; encrypted documents are not split.
    #[error("PDF '{name}' is encrypted and requires a password.\nRemove the password and try again.")]
    PasswordRequired { name: String },

    /// The document has no pages to split.
    #[error("PDF '{name}' has no pages")]
    EmptyPdf { name: String },

    /// A single page alone is above the hard PDF limit.
    #[error(
        "Page {page} of '{name}' is {} on its own, above the {} limit.\n\
A page cannot be split further; reduce it manually (e.g. lower image resolution) and try again.",
        format_mib(.size),
        format_mib(.limit)
    )]
    UnsplittablePage {
        name: String,
        page: usize,
        size: u64,
        limit: u64,
    },

    /// Copying or saving a page range failed inside pdfium.
    #[error("Failed to split '{name}' at pages {start}–{end}: {detail}")]
    SplitFailed {
        name: String,
        start: usize,
        end: usize,
        detail: String,
    },

    // ── Boundary errors ───────────────────────────────────────────────────
    /// No OCR endpoint configured.
    #[error("OCR endpoint is not configured.\n{hint}")]
    BoundaryNotConfigured { hint: String },

    /// The single (unsplit) submission failed.
    #[error("OCR request for '{name}' failed: {failure}")]
    SubmissionFailed {
        name: String,
        failure: BoundaryFailure,
    },

    /// One chunk of a split run failed; later chunks were not sent.
    #[error("OCR failed on chunk {part} of {total}: {failure}")]
    ChunkFailed {
        part: usize,
        total: usize,
        failure: BoundaryFailure,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is needed to read and split PDFs. You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Allow the one-time download into the pdfium cache (needs network).\n\
  • Build with --features bundled to embed the library in the binary.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrChunkError {
    /// The chunk position for boundary failures during a split run.
    pub fn chunk_position(&self) -> Option<(usize, usize)> {
        match self {
            OcrChunkError::ChunkFailed { part, total, .. } => Some((*part, *total)),
            _ => None,
        }
    }

    /// `true` for failures raised before anything was sent to the endpoint.
    pub fn is_preparation_failure(&self) -> bool {
        !matches!(
            self,
            OcrChunkError::SubmissionFailed { .. }
                | OcrChunkError::ChunkFailed { .. }
                | OcrChunkError::OutputWriteFailed { .. }
        )
    }
}

/// The OCR endpoint's answer to a failed submission.
///
/// `status` is `None` for transport failures (connection refused, timeout)
/// where no HTTP response was received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryFailure {
    pub message: String,
    pub status: Option<u16>,
}

impl BoundaryFailure {
    pub fn new(message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }
}

impl fmt::Display for BoundaryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {status})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for BoundaryFailure {}
