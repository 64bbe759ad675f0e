//! The per-file state machine: prepare, submit sequentially, merge.
//!
//! ```text
//! Idle → Preparing ─┬─ image over budget ──▶ CompressingImage ─┐
//!                   ├─ PDF over budget ────▶ SplittingPdf ─────┤
//!                   └─ within budget ──────────────────────────┤
//!                                                              ▼
//!                         Submitting | SubmittingChunks(i/n) → Merging → Done
//! ```
//!
//! Any error moves the run to `Failed` and is returned; nothing is retried
//! and no later chunk is sent after a failure. Chunk submissions are
//! strictly sequential with a fixed pause between them, so fragments come
//! back in part order without any reordering.

use crate::config::PipelineConfig;
use crate::error::OcrChunkError;
use crate::output::{PreparedInput, PreparedRoute, RunOutput, RunStats};
use crate::pipeline::compress::compress_image;
use crate::pipeline::input;
use crate::pipeline::merge::PipelineResult;
use crate::pipeline::pdf::{PdfEngine, PdfiumEngine};
use crate::pipeline::split::{split_document, Chunk};
use crate::pipeline::submit::{submit_file, OcrBoundary};
use crate::progress::{NoopProgressCallback, ProgressCallback, RunState};
use crate::source::{MediaKind, SourceFile};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Drives one file at a time through the pipeline.
///
/// `E` is the PDF engine; production code uses [`PdfiumEngine`].
pub struct Orchestrator<E = PdfiumEngine> {
    config: PipelineConfig,
    engine: Arc<E>,
}

impl Orchestrator<PdfiumEngine> {
    pub fn new(config: PipelineConfig) -> Self {
        let engine = PdfiumEngine::new(config.pdfium_library_path.clone());
        Self::with_engine(config, engine)
    }
}

/// Outcome of the single PDF parse: either the page count of a file that
/// fits, or the finished split.
enum PdfPlan {
    WithinBudget(usize),
    Split(Vec<Chunk>, usize),
}

impl<E: PdfEngine> Orchestrator<E> {
    pub fn with_engine(config: PipelineConfig, engine: E) -> Self {
        Self {
            config,
            engine: Arc::new(engine),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn default_progress(&self) -> ProgressCallback {
        self.config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback))
    }

    /// Run `file` end to end, reporting to the configured callback.
    pub async fn run(&self, file: SourceFile) -> Result<RunOutput, OcrChunkError> {
        let progress = self.default_progress();
        self.run_observed(file, progress).await
    }

    /// Run `file` end to end, reporting to `progress`.
    pub async fn run_observed(
        &self,
        file: SourceFile,
        progress: ProgressCallback,
    ) -> Result<RunOutput, OcrChunkError> {
        progress.on_run_start(file.name(), file.len());
        let result = self.execute(&file, &progress).await;
        match &result {
            Ok(output) => {
                progress.on_state_change(&RunState::Done);
                info!(
                    "'{}' done: {} submissions, {} chars in {}ms",
                    file.name(),
                    output.stats.submissions,
                    output.text.len(),
                    output.stats.total_duration_ms
                );
            }
            Err(e) => {
                progress.on_state_change(&RunState::Failed);
                warn!("'{}' failed: {}", file.name(), e);
            }
        }
        progress.on_run_complete(result.is_ok());
        result
    }

    async fn execute(
        &self,
        file: &SourceFile,
        progress: &ProgressCallback,
    ) -> Result<RunOutput, OcrChunkError> {
        let total_start = Instant::now();

        // ── Step 1: Prepare ──────────────────────────────────────────────
        progress.on_state_change(&RunState::Preparing);
        let boundary = self.config.resolve_boundary()?;
        let prepared = self.prepare_observed(file, progress).await?;
        let prepare_duration_ms = total_start.elapsed().as_millis() as u64;

        // ── Step 2: Submit ───────────────────────────────────────────────
        let ocr_start = Instant::now();
        let result = self.submit_all(boundary.as_ref(), &prepared, progress).await?;
        let ocr_duration_ms = ocr_start.elapsed().as_millis() as u64;

        // ── Step 3: Merge ────────────────────────────────────────────────
        progress.on_state_change(&RunState::Merging);
        let text = result.merge();
        let stats = RunStats {
            source_bytes: prepared.source_bytes,
            submitted_bytes: prepared.submitted_bytes(),
            submissions: result.len(),
            empty_fragments: result.empty_count(),
            prepare_duration_ms,
            ocr_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };
        debug!("Merged {} fragments into {} chars", stats.submissions, text.len());

        Ok(RunOutput {
            text,
            fragments: result.into_fragments(),
            route: prepared.route,
            stats,
        })
    }

    /// Decide the route and produce the ready-to-submit files, without
    /// contacting the OCR boundary.
    pub async fn prepare(&self, file: &SourceFile) -> Result<PreparedInput, OcrChunkError> {
        let progress = self.default_progress();
        self.prepare_observed(file, &progress).await
    }

    async fn prepare_observed(
        &self,
        file: &SourceFile,
        progress: &ProgressCallback,
    ) -> Result<PreparedInput, OcrChunkError> {
        let policy = &self.config.policy;
        policy.check_acceptance(file.name(), file.len())?;
        let kind = file.kind()?;
        debug!("Preparing '{}' as {} ({} bytes)", file.name(), kind, file.len());

        let (route, files) = match kind {
            MediaKind::Image if policy.image_within_budget(file.len()) => {
                (PreparedRoute::Direct { total_pages: None }, vec![file.clone()])
            }
            MediaKind::Image => {
                progress.on_state_change(&RunState::CompressingImage);
                let source = file.clone();
                let policy = policy.clone();
                let compressed = tokio::task::spawn_blocking(move || compress_image(&source, &policy))
                    .await
                    .map_err(|e| OcrChunkError::Internal(format!("Compression task panicked: {e}")))??;
                (PreparedRoute::Compressed(compressed.choice()), vec![compressed.file])
            }
            MediaKind::Pdf => self.prepare_pdf(file, progress).await?,
        };

        Ok(PreparedInput {
            source_name: file.name().to_string(),
            source_bytes: file.len(),
            route,
            files,
        })
    }

    /// Parse the PDF once: count pages, and split in the same pass when the
    /// file is over either budget.
    async fn prepare_pdf(
        &self,
        file: &SourceFile,
        progress: &ProgressCallback,
    ) -> Result<(PreparedRoute, Vec<SourceFile>), OcrChunkError> {
        let engine = Arc::clone(&self.engine);
        let policy = self.config.policy.clone();
        let source = file.clone();
        let progress = Arc::clone(progress);

        let plan = tokio::task::spawn_blocking(move || {
            let bytes = source.shared_bytes();
            engine.with_document(source.name(), &bytes, |doc| {
                let total_pages = doc.page_count();
                if policy.pdf_within_budget(source.len(), total_pages) {
                    return Ok(PdfPlan::WithinBudget(total_pages));
                }
                info!(
                    "'{}' is over budget ({} bytes, {} pages); splitting",
                    source.name(),
                    source.len(),
                    total_pages
                );
                progress.on_state_change(&RunState::SplittingPdf);
                let outcome = split_document(doc, &source, &policy)?;
                Ok(PdfPlan::Split(outcome.chunks, outcome.total_pages))
            })
        })
        .await
        .map_err(|e| OcrChunkError::Internal(format!("PDF task panicked: {e}")))??;

        match plan {
            PdfPlan::WithinBudget(total_pages) => Ok((
                PreparedRoute::Direct {
                    total_pages: Some(total_pages),
                },
                vec![file.clone()],
            )),
            PdfPlan::Split(chunks, total_pages) => {
                let route = PreparedRoute::Split {
                    total_pages,
                    chunks: chunks.iter().map(Chunk::summary).collect(),
                };
                Ok((route, chunks.into_iter().map(|c| c.file).collect()))
            }
        }
    }

    async fn submit_all(
        &self,
        boundary: &dyn OcrBoundary,
        prepared: &PreparedInput,
        progress: &ProgressCallback,
    ) -> Result<PipelineResult, OcrChunkError> {
        let mut result = PipelineResult::with_capacity(prepared.files.len());

        if !prepared.is_split() {
            progress.on_state_change(&RunState::Submitting);
            let file = prepared.files.first().ok_or_else(|| {
                OcrChunkError::Internal("prepared input has no files".to_string())
            })?;
            let text = submit_file(boundary, file).await.map_err(|failure| {
                OcrChunkError::SubmissionFailed {
                    name: prepared.source_name.clone(),
                    failure,
                }
            })?;
            result.push(text);
            return Ok(result);
        }

        let total = prepared.files.len();
        let pause = Duration::from_millis(self.config.inter_chunk_pause_ms);
        for (i, chunk) in prepared.files.iter().enumerate() {
            let part = i + 1;
            if i > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            progress.on_state_change(&RunState::SubmittingChunks { part, total });
            progress.on_chunk_start(part, total);
            info!("Submitting chunk {}/{} ({} bytes)", part, total, chunk.len());

            match submit_file(boundary, chunk).await {
                Ok(text) => {
                    progress.on_chunk_complete(part, total, text.len());
                    result.push(text);
                }
                Err(failure) => {
                    progress.on_chunk_error(part, total, &failure.to_string());
                    return Err(OcrChunkError::ChunkFailed {
                        part,
                        total,
                        failure,
                    });
                }
            }
        }
        Ok(result)
    }
}

// ── Entry points ─────────────────────────────────────────────────────────

/// OCR a local file or URL and return the merged text.
///
/// # Example
/// ```rust,no_run
/// use ocr_chunker::{ocr_file, PipelineConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PipelineConfig::builder()
///     .endpoint("http://localhost:8080/api/ocr")
///     .build()?;
/// let output = ocr_file("scan.pdf", &config).await?;
/// println!("{}", output.text);
/// # Ok(())
/// # }
/// ```
pub async fn ocr_file(
    input_str: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<RunOutput, OcrChunkError> {
    let input_str = input_str.as_ref();
    info!("Starting OCR: {}", input_str);
    let file = input::resolve_input(input_str, &config.policy, config.download_timeout_secs).await?;
    Orchestrator::new(config.clone()).run(file).await
}

/// OCR an in-memory buffer; the media type is derived from `name`.
pub async fn ocr_bytes(
    name: impl Into<String>,
    bytes: Vec<u8>,
    config: &PipelineConfig,
) -> Result<RunOutput, OcrChunkError> {
    let file = input::from_bytes(name, bytes, &config.policy)?;
    Orchestrator::new(config.clone()).run(file).await
}

/// OCR a file and write the merged text to `output_path`.
///
/// Uses atomic write (temp file + rename) so a failed run never leaves a
/// partial file behind.
pub async fn ocr_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<RunOutput, OcrChunkError> {
    let output = ocr_file(input_str, config).await?;
    write_atomic(output_path.as_ref(), &output.text).await?;
    Ok(output)
}

/// Write `contents` to `path` via a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<(), OcrChunkError> {
    let write_err = |e| OcrChunkError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, contents).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

/// Resolve and prepare a file without contacting the OCR boundary.
pub async fn plan(
    input_str: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<PreparedInput, OcrChunkError> {
    let file = input::resolve_input(input_str.as_ref(), &config.policy, config.download_timeout_secs)
        .await?;
    Orchestrator::new(config.clone()).prepare(&file).await
}

/// Synchronous wrapper around [`ocr_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn ocr_sync(
    input_str: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<RunOutput, OcrChunkError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| OcrChunkError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(ocr_file(input_str, config))
}
