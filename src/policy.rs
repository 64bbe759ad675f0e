//! Size budgets: the remote OCR service's hard limits and our local margins.
//!
//! The hard limits mirror what the OCR endpoint enforces and are never
//! exceeded by anything we submit. The chunk target sits strictly below the
//! hard PDF limit because re-serialising a page range adds container overhead
//! (fonts and shared resources are copied into every chunk).

use crate::error::OcrChunkError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

const MIB: u64 = 1024 * 1024;

/// Largest image the OCR endpoint accepts.
pub const MAX_IMAGE_BYTES: u64 = 10 * MIB;

/// Largest PDF the OCR endpoint accepts.
pub const MAX_PDF_BYTES: u64 = 50 * MIB;

/// Most pages the OCR endpoint accepts in one PDF.
pub const MAX_PDF_PAGES: usize = 100;

/// Byte target for each split chunk.
pub const PDF_CHUNK_TARGET_BYTES: u64 = 45 * MIB;

/// Starting page count for each chunk before byte-driven shrinkage.
pub const MAX_PAGES_PER_CHUNK: usize = 40;

/// Files above this size are rejected before any processing.
pub const MAX_ACCEPTED_FILE_BYTES: u64 = 200 * MIB;

/// A byte ceiling plus an optional unit-of-work ceiling (pages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub max_bytes: u64,
    pub max_pages: Option<usize>,
}

impl Budget {
    /// `true` when both the byte size and (if bounded) the page count fit.
    pub fn admits(&self, bytes: u64, pages: Option<usize>) -> bool {
        if bytes > self.max_bytes {
            return false;
        }
        match (self.max_pages, pages) {
            (Some(limit), Some(pages)) => pages <= limit,
            _ => true,
        }
    }
}

/// Every limit the pipeline consults, in one value.
///
/// [`SizePolicy::default()`] matches the remote service. Tests and the CLI can
/// lower the numbers, but a policy is fixed once a pipeline is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizePolicy {
    pub max_image_bytes: u64,
    pub max_pdf_bytes: u64,
    pub max_pdf_pages: usize,
    pub pdf_chunk_target_bytes: u64,
    pub max_pages_per_chunk: usize,
    pub max_accepted_file_bytes: u64,
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self {
            max_image_bytes: MAX_IMAGE_BYTES,
            max_pdf_bytes: MAX_PDF_BYTES,
            max_pdf_pages: MAX_PDF_PAGES,
            pdf_chunk_target_bytes: PDF_CHUNK_TARGET_BYTES,
            max_pages_per_chunk: MAX_PAGES_PER_CHUNK,
            max_accepted_file_bytes: MAX_ACCEPTED_FILE_BYTES,
        }
    }
}

impl SizePolicy {
    pub fn image_budget(&self) -> Budget {
        Budget {
            max_bytes: self.max_image_bytes,
            max_pages: None,
        }
    }

    pub fn pdf_budget(&self) -> Budget {
        Budget {
            max_bytes: self.max_pdf_bytes,
            max_pages: Some(self.max_pdf_pages),
        }
    }

    /// Per-chunk target used by the splitter.
    pub fn chunk_budget(&self) -> Budget {
        Budget {
            max_bytes: self.pdf_chunk_target_bytes,
            max_pages: Some(self.max_pages_per_chunk),
        }
    }

    pub fn image_within_budget(&self, bytes: u64) -> bool {
        self.image_budget().admits(bytes, None)
    }

    pub fn pdf_within_budget(&self, bytes: u64, pages: usize) -> bool {
        self.pdf_budget().admits(bytes, Some(pages))
    }

    /// Reject a file before any processing when it exceeds the local ceiling.
    pub fn check_acceptance(&self, name: &str, bytes: u64) -> Result<(), OcrChunkError> {
        if bytes > self.max_accepted_file_bytes {
            return Err(OcrChunkError::FileTooLarge {
                name: name.to_string(),
                size: bytes,
                limit: self.max_accepted_file_bytes,
            });
        }
        Ok(())
    }

    /// Check that the limits are coherent with each other.
    pub fn validate(&self) -> Result<(), OcrChunkError> {
        let zero = [
            ("max_image_bytes", self.max_image_bytes == 0),
            ("max_pdf_bytes", self.max_pdf_bytes == 0),
            ("max_pdf_pages", self.max_pdf_pages == 0),
            ("pdf_chunk_target_bytes", self.pdf_chunk_target_bytes == 0),
            ("max_pages_per_chunk", self.max_pages_per_chunk == 0),
            ("max_accepted_file_bytes", self.max_accepted_file_bytes == 0),
        ];
        if let Some((field, _)) = zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(OcrChunkError::InvalidConfig(format!(
                "{field} must be greater than zero"
            )));
        }
        if self.pdf_chunk_target_bytes > self.max_pdf_bytes {
            return Err(OcrChunkError::InvalidConfig(format!(
                "chunk target ({} bytes) exceeds the PDF limit ({} bytes)",
                self.pdf_chunk_target_bytes, self.max_pdf_bytes
            )));
        }
        if self.max_pages_per_chunk > self.max_pdf_pages {
            return Err(OcrChunkError::InvalidConfig(format!(
                "max pages per chunk ({}) exceeds the PDF page limit ({})",
                self.max_pages_per_chunk, self.max_pdf_pages
            )));
        }
        Ok(())
    }
}

/// Format a byte count as MiB with one decimal, for messages.
pub fn format_mib(bytes: impl Borrow<u64>) -> String {
    format!("{:.1} MiB", *bytes.borrow() as f64 / MIB as f64)
}
