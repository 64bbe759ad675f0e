//! Result types: what a run produced and how the input was prepared.

use crate::pipeline::compress::CompressionChoice;
use crate::pipeline::split::ChunkSummary;
use crate::source::SourceFile;
use serde::{Deserialize, Serialize};

/// How the source was turned into submittable files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum PreparedRoute {
    /// Already within budget; submitted unchanged.
    Direct {
        #[serde(skip_serializing_if = "Option::is_none")]
        total_pages: Option<usize>,
    },
    /// Re-encoded as JPEG.
    Compressed(CompressionChoice),
    /// Split into page-range chunks.
    Split {
        total_pages: usize,
        chunks: Vec<ChunkSummary>,
    },
}

impl PreparedRoute {
    pub fn label(&self) -> &'static str {
        match self {
            PreparedRoute::Direct { .. } => "direct",
            PreparedRoute::Compressed(_) => "compressed",
            PreparedRoute::Split { .. } => "split",
        }
    }
}

/// The ordered, ready-to-submit files for one source.
///
/// Every file is within the remote budgets. `files` has exactly one entry
/// unless the route is [`PreparedRoute::Split`].
#[derive(Debug, Clone)]
pub struct PreparedInput {
    pub source_name: String,
    pub source_bytes: u64,
    pub route: PreparedRoute,
    pub files: Vec<SourceFile>,
}

impl PreparedInput {
    pub fn submission_count(&self) -> usize {
        self.files.len()
    }

    pub fn is_split(&self) -> bool {
        matches!(self.route, PreparedRoute::Split { .. })
    }

    pub fn submitted_bytes(&self) -> u64 {
        self.files.iter().map(SourceFile::len).sum()
    }
}

/// Timing and volume figures for a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub source_bytes: u64,
    pub submitted_bytes: u64,
    pub submissions: usize,
    /// Fragments that were empty after trimming and left out of the merge.
    pub empty_fragments: usize,
    pub prepare_duration_ms: u64,
    pub ocr_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a successful run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    /// The merged document.
    pub text: String,
    /// Raw text per submission, in part order.
    pub fragments: Vec<String>,
    pub route: PreparedRoute,
    pub stats: RunStats,
}
