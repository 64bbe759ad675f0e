//! Pipeline stages for budget-aware OCR submission.
//!
//! Each submodule implements exactly one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ compress | split ──▶ submit ──▶ merge
//! (path/URL)  (image)  (pdfium)   (HTTP)    (join)
//! ```
//!
//! 1. [`input`]    resolve a path, URL or buffer to a [`crate::SourceFile`]
//!    and enforce the acceptance ceiling
//! 2. [`compress`] re-encode an oversized image as JPEG under the image
//!    budget; CPU-bound, runs in `spawn_blocking`
//! 3. [`split`]    partition an oversized PDF into page-range chunks through
//!    the [`pdf`] document model; also `spawn_blocking`
//! 4. [`submit`]   one multipart upload per file, the only stage with
//!    network I/O
//! 5. [`merge`]    join the ordered fragments

pub mod compress;
pub mod input;
pub mod merge;
pub mod pdf;
pub mod split;
pub mod submit;
