//! Merge per-submission fragments into the final document.
//!
//! Fragments arrive in part order (submission is sequential), so merging is
//! a join: trim each fragment, drop the empty ones, separate the rest with a
//! blank line. Text split across a page boundary stays split.

/// Separator between fragments.
pub const FRAGMENT_SEPARATOR: &str = "\n\n";

/// Fragments collected so far, one per completed submission, in part order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineResult {
    fragments: Vec<String>,
}

impl PipelineResult {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            fragments: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, fragment: String) {
        self.fragments.push(fragment);
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Fragments that contribute nothing to the merge.
    pub fn empty_count(&self) -> usize {
        self.fragments.iter().filter(|f| f.trim().is_empty()).count()
    }

    pub fn merge(&self) -> String {
        merge_fragments(&self.fragments)
    }

    pub fn into_fragments(self) -> Vec<String> {
        self.fragments
    }
}

pub fn merge_fragments<S: AsRef<str>>(fragments: &[S]) -> String {
    fragments
        .iter()
        .map(|f| f.as_ref().trim())
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join(FRAGMENT_SEPARATOR)
}
