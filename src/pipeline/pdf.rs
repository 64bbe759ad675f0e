//! PDF document model: load once, copy page ranges into fresh documents,
//! serialise them to bytes.
//!
//! ## Why a trait?
//!
//! The splitting loop in [`crate::pipeline::split`] only needs three things
//! from a PDF library: a page count, and "give me pages `[a, b)` as a
//! standalone PDF". Expressing that as [`PdfDocumentModel`] keeps the loop
//! independent of pdfium, so its termination and partition guarantees are
//! testable without a native library.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and CPU-heavy
//! serialisation. Every call through [`PdfEngine`] is made from a
//! `spawn_blocking` thread by the orchestrator, never from a Tokio worker.

use crate::error::OcrChunkError;
use pdfium_render::prelude::*;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A loaded PDF that can materialise contiguous page ranges.
pub trait PdfDocumentModel {
    fn page_count(&self) -> usize;

    /// Copy pages `[pages.start, pages.end)` (0-based) into a new document
    /// and return its serialised bytes.
    fn extract_pages(&self, pages: Range<usize>) -> Result<Vec<u8>, OcrChunkError>;
}

/// Opens PDF bytes as a [`PdfDocumentModel`] for the duration of `visit`.
///
/// The document only lives inside the closure because pdfium documents
/// borrow both the library handle and the source bytes.
pub trait PdfEngine: Send + Sync + 'static {
    fn with_document<R>(
        &self,
        name: &str,
        bytes: &[u8],
        visit: impl FnOnce(&dyn PdfDocumentModel) -> Result<R, OcrChunkError>,
    ) -> Result<R, OcrChunkError>;
}

/// The production engine, backed by pdfium-render.
///
/// An explicitly configured library path is bound as-is. Otherwise
/// `pdfium-auto` resolves the library: `PDFIUM_LIB_PATH`, then its on-disk
/// cache, then a one-time download into that cache.
#[derive(Debug, Clone, Default)]
pub struct PdfiumEngine {
    library_path: Option<PathBuf>,
}

impl PdfiumEngine {
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    fn bind(&self) -> Result<Pdfium, OcrChunkError> {
        match &self.library_path {
            Some(path) => pdfium_auto::bind_pdfium_from_path(&library_file(path)),
            None => pdfium_auto::bind_pdfium_silent(),
        }
        .map_err(|e| OcrChunkError::PdfiumBindingFailed(e.to_string()))
    }
}

/// Accept either the library file itself or the directory containing it.
fn library_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}

impl PdfEngine for PdfiumEngine {
    fn with_document<R>(
        &self,
        name: &str,
        bytes: &[u8],
        visit: impl FnOnce(&dyn PdfDocumentModel) -> Result<R, OcrChunkError>,
    ) -> Result<R, OcrChunkError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| load_error(name, e))?;
        debug!("Loaded '{}': {} pages", name, document.pages().len());

        let model = PdfiumDocument {
            pdfium: &pdfium,
            document,
            name,
        };
        visit(&model)
    }
}

fn load_error(name: &str, e: PdfiumError) -> OcrChunkError {
    let detail = format!("{:?}", e);
    if detail.contains("Password") || detail.contains("password") {
        OcrChunkError::PasswordRequired {
            name: name.to_string(),
        }
    } else {
        OcrChunkError::CorruptPdf {
            name: name.to_string(),
            detail,
        }
    }
}

struct PdfiumDocument<'a> {
    pdfium: &'a Pdfium,
    document: PdfDocument<'a>,
    name: &'a str,
}

impl PdfiumDocument<'_> {
    fn split_error(&self, pages: &Range<usize>, detail: String) -> OcrChunkError {
        OcrChunkError::SplitFailed {
            name: self.name.to_string(),
            start: pages.start + 1,
            end: pages.end,
            detail,
        }
    }
}

impl PdfDocumentModel for PdfiumDocument<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn extract_pages(&self, pages: Range<usize>) -> Result<Vec<u8>, OcrChunkError> {
        if pages.is_empty() || pages.end > self.page_count() {
            return Err(self.split_error(&pages, "page range out of bounds".to_string()));
        }
        let first = PdfPageIndex::try_from(pages.start)
            .map_err(|e| self.split_error(&pages, e.to_string()))?;
        let last = PdfPageIndex::try_from(pages.end - 1)
            .map_err(|e| self.split_error(&pages, e.to_string()))?;

        let mut chunk = self
            .pdfium
            .create_new_pdf()
            .map_err(|e| self.split_error(&pages, format!("{:?}", e)))?;
        chunk
            .pages_mut()
            .copy_page_range_from_document(&self.document, first..=last, 0)
            .map_err(|e| self.split_error(&pages, format!("{:?}", e)))?;
        chunk
            .save_to_bytes()
            .map_err(|e| self.split_error(&pages, format!("{:?}", e)))
    }
}
