//! PDF splitting: partition a document into ordered page-range chunks that
//! each fit the per-chunk byte and page budget.
//!
//! ## Algorithm
//!
//! ```text
//! cursor = 0
//! while cursor < total:
//!     end = min(cursor + max_pages_per_chunk, total)
//!     bytes = extract(cursor..end)
//!     while len(bytes) > chunk_target and end - cursor > 1:
//!         end -= 1; bytes = extract(cursor..end)
//!     if len(bytes) > hard_pdf_limit: fail (single page too large)
//!     emit chunk; cursor = end
//! ```
//!
//! The inner loop always terminates: it either fits or bottoms out at one
//! page. A lone page between the target and the hard limit is accepted,
//! since the target is only a safety margin. Because every accepted chunk
//! starts at the previous chunk's end and the loop runs until `cursor ==
//! total`, chunks partition `[0, total)` exactly once, in order.

use crate::error::OcrChunkError;
use crate::pipeline::pdf::PdfDocumentModel;
use crate::policy::SizePolicy;
use crate::source::SourceFile;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, info};

/// One page-range sub-document, ready to submit.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// 1-based submission order.
    pub part: usize,
    /// 0-based, half-open page range in the source document.
    pub pages: Range<usize>,
    pub file: SourceFile,
}

impl Chunk {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn summary(&self) -> ChunkSummary {
        ChunkSummary {
            part: self.part,
            first_page: self.pages.start + 1,
            last_page: self.pages.end,
            bytes: self.file.len(),
            name: self.file.name().to_string(),
        }
    }
}

/// Serializable description of a chunk (1-based inclusive page numbers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSummary {
    pub part: usize,
    pub first_page: usize,
    pub last_page: usize,
    pub bytes: u64,
    pub name: String,
}

/// Result of a split: chunks in submission order plus the source page count.
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub chunks: Vec<Chunk>,
    pub total_pages: usize,
}

/// `{base}.part-{n}.pdf`
pub fn chunk_name(source: &SourceFile, part: usize) -> String {
    format!("{}.part-{}.pdf", source.base_name(), part)
}

/// Split `document` (loaded from `source`) into budget-satisfying chunks.
///
/// Blocking; call it from inside [`crate::pipeline::pdf::PdfEngine::with_document`].
pub fn split_document(
    document: &dyn PdfDocumentModel,
    source: &SourceFile,
    policy: &SizePolicy,
) -> Result<SplitOutcome, OcrChunkError> {
    let total_pages = document.page_count();
    if total_pages == 0 {
        return Err(OcrChunkError::EmptyPdf {
            name: source.name().to_string(),
        });
    }

    let max_pages = policy.max_pages_per_chunk.max(1);
    let target = policy.pdf_chunk_target_bytes;
    info!(
        "Splitting '{}' ({} bytes, {} pages) into chunks of ≤{} pages / ≤{} bytes",
        source.name(),
        source.len(),
        total_pages,
        max_pages,
        target
    );

    let mut chunks = Vec::new();
    let mut cursor = 0;

    while cursor < total_pages {
        let mut end = (cursor + max_pages).min(total_pages);
        let mut bytes = document.extract_pages(cursor..end)?;

        while bytes.len() as u64 > target && end - cursor > 1 {
            end -= 1;
            debug!(
                "Pages {}..{} serialise to {} bytes; shrinking to {} pages",
                cursor,
                end + 1,
                bytes.len(),
                end - cursor
            );
            bytes = document.extract_pages(cursor..end)?;
        }

        let size = bytes.len() as u64;
        if size > policy.max_pdf_bytes {
            return Err(OcrChunkError::UnsplittablePage {
                name: source.name().to_string(),
                page: cursor + 1,
                size,
                limit: policy.max_pdf_bytes,
            });
        }

        let part = chunks.len() + 1;
        debug!("Chunk {}: pages {}–{} ({} bytes)", part, cursor + 1, end, size);
        chunks.push(Chunk {
            part,
            pages: cursor..end,
            file: SourceFile::new(chunk_name(source, part), "application/pdf", bytes),
        });
        cursor = end;
    }

    info!("Split '{}' into {} chunks", source.name(), chunks.len());
    Ok(SplitOutcome {
        chunks,
        total_pages,
    })
}
