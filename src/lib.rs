//! # ocr-chunker
//!
//! Get one merged OCR text out of images and PDFs that are too large for a
//! remote OCR service's per-request limits.
//!
//! The service rejects images over 10 MiB and PDFs over 50 MiB or 100
//! pages. This crate makes any file up to 200 MiB fit: oversized images are
//! re-encoded as JPEG, oversized PDFs are split into page-range chunks, the
//! chunks are submitted one at a time, and the fragments are joined back in
//! order.
//!
//! ## Pipeline Overview
//!
//! ```text
//! file
//!  │
//!  ├─ 1. Input     resolve local file, URL or buffer; reject > 200 MiB
//!  ├─ 2. Prepare   image > 10 MiB → JPEG scale/quality search
//!  │               PDF > 50 MiB or > 100 pages → ≤ 40-page, ≤ 45 MiB chunks
//!  ├─ 3. Submit    sequential multipart uploads, 250 ms apart
//!  └─ 4. Merge     trimmed fragments joined with a blank line
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocr_chunker::{ocr_file, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Endpoint from OCR_ENDPOINT (+ OCR_API_KEY) when not set here
//!     let config = PipelineConfig::default();
//!     let output = ocr_file("scan.pdf", &config).await?;
//!     println!("{}", output.text);
//!     eprintln!("{} submissions via {}", output.stats.submissions, output.route.label());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr-chunk` binary (clap + indicatif + anyhow + tracing-subscriber) |
//! | `bundled` | off   | Embeds libpdfium in the binary; set `PDFIUM_BUNDLE_LIB` at build time |
//!
//! PDF handling needs a pdfium shared library at runtime. Unless a path is
//! configured, `pdfium-auto` finds it or downloads it once into its cache; see
//! [`pipeline::pdf::PdfiumEngine`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod policy;
pub mod progress;
pub mod run;
pub mod session;
pub mod source;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{BoundaryFailure, OcrChunkError};
pub use output::{PreparedInput, PreparedRoute, RunOutput, RunStats};
pub use pipeline::pdf::{PdfDocumentModel, PdfEngine, PdfiumEngine};
pub use pipeline::submit::{HttpOcrBoundary, OcrBoundary};
pub use policy::{Budget, SizePolicy};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback, RunState};
pub use run::{ocr_bytes, ocr_file, ocr_sync, ocr_to_file, plan, Orchestrator};
pub use session::{ActiveRun, RunOutcome, Session};
pub use source::{MediaKind, SourceFile};
