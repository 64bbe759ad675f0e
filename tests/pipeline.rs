//! Orchestrator and session tests against an in-memory OCR boundary and an
//! in-memory PDF document model.
//!
//! Budgets are scaled down from MiB to KiB so the scenarios run on small
//! buffers: a "60 MiB, 120-page PDF" here is 60 KiB of bytes whose pages
//! serialise to 0.5 KiB each.

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use ocr_chunker::pipeline::compress::{encode_jpeg, QUALITY_STEPS, SCALE_STEPS};
use ocr_chunker::{
    BoundaryFailure, OcrBoundary, OcrChunkError, Orchestrator, PdfDocumentModel, PdfEngine,
    PipelineConfig, PipelineProgressCallback, PreparedRoute, RunOutcome, RunState, Session,
    SizePolicy, SourceFile,
};
use std::collections::HashMap;
use std::io::Cursor;
use std::ops::Range;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

const KIB: u64 = 1024;

// ── Test doubles ─────────────────────────────────────────────────────────────

struct Call {
    name: String,
    media_type: String,
    bytes: Vec<u8>,
    at: Instant,
}

/// Records every upload and answers `text of {name}` unless told otherwise.
#[derive(Default)]
struct ScriptedBoundary {
    calls: Mutex<Vec<Call>>,
    /// Failure to return on the n-th call (1-based).
    fail_on: Mutex<HashMap<usize, BoundaryFailure>>,
    /// Extra latency on the n-th call (1-based).
    delays: Mutex<HashMap<usize, Duration>>,
    /// A file with this name waits for `release` after signalling `entered`.
    hold_name: Option<String>,
    entered: Notify,
    release: Notify,
}

impl ScriptedBoundary {
    fn failing_on(call: usize, failure: BoundaryFailure) -> Self {
        let b = Self::default();
        b.fail_on.lock().unwrap().insert(call, failure);
        b
    }

    fn holding(name: &str) -> Self {
        Self {
            hold_name: Some(name.to_string()),
            ..Self::default()
        }
    }

    fn call_names(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|c| c.name.clone()).collect()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl OcrBoundary for ScriptedBoundary {
    async fn submit(&self, file: &SourceFile) -> Result<String, BoundaryFailure> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call {
                name: file.name().to_string(),
                media_type: file.media_type().to_string(),
                bytes: file.bytes().to_vec(),
                at: Instant::now(),
            });
            calls.len()
        };

        if self.hold_name.as_deref() == Some(file.name()) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        let delay = self.delays.lock().unwrap().get(&n).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.fail_on.lock().unwrap().remove(&n);
        match failure {
            Some(f) => Err(f),
            None => Ok(format!("text of {}", file.name())),
        }
    }
}

/// Pages with fixed serialised sizes; every extracted range costs 16 bytes
/// of container overhead. Input bytes must start with `%PDF`.
struct FakeEngine {
    page_bytes: Vec<u64>,
}

impl FakeEngine {
    fn uniform(pages: usize, bytes_per_page: u64) -> Self {
        Self {
            page_bytes: vec![bytes_per_page; pages],
        }
    }
}

struct FakeDocument<'a> {
    page_bytes: &'a [u64],
}

impl PdfDocumentModel for FakeDocument<'_> {
    fn page_count(&self) -> usize {
        self.page_bytes.len()
    }

    fn extract_pages(&self, pages: Range<usize>) -> Result<Vec<u8>, OcrChunkError> {
        let size = 16 + self.page_bytes[pages].iter().sum::<u64>();
        Ok(vec![b'%'; size as usize])
    }
}

impl PdfEngine for FakeEngine {
    fn with_document<R>(
        &self,
        name: &str,
        bytes: &[u8],
        visit: impl FnOnce(&dyn PdfDocumentModel) -> Result<R, OcrChunkError>,
    ) -> Result<R, OcrChunkError> {
        if !bytes.starts_with(b"%PDF") {
            return Err(OcrChunkError::CorruptPdf {
                name: name.to_string(),
                detail: "missing header".into(),
            });
        }
        visit(&FakeDocument {
            page_bytes: &self.page_bytes,
        })
    }
}

/// Stands in for a machine without libpdfium.
struct UnboundEngine;

impl PdfEngine for UnboundEngine {
    fn with_document<R>(
        &self,
        _name: &str,
        _bytes: &[u8],
        _visit: impl FnOnce(&dyn PdfDocumentModel) -> Result<R, OcrChunkError>,
    ) -> Result<R, OcrChunkError> {
        Err(OcrChunkError::PdfiumBindingFailed("libpdfium.so not found".into()))
    }
}

#[derive(Default)]
struct StateRecorder {
    states: Mutex<Vec<RunState>>,
    completed: Mutex<Vec<usize>>,
}

impl PipelineProgressCallback for StateRecorder {
    fn on_state_change(&self, state: &RunState) {
        self.states.lock().unwrap().push(state.clone());
    }

    fn on_chunk_complete(&self, part: usize, _total: usize, _text_len: usize) {
        self.completed.lock().unwrap().push(part);
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn kib_policy() -> SizePolicy {
    SizePolicy {
        max_image_bytes: 10 * KIB,
        max_pdf_bytes: 50 * KIB,
        max_pdf_pages: 100,
        pdf_chunk_target_bytes: 45 * KIB,
        max_pages_per_chunk: 40,
        max_accepted_file_bytes: 200 * KIB,
    }
}

fn config(boundary: &Arc<ScriptedBoundary>, pause_ms: u64) -> PipelineConfig {
    PipelineConfig::builder()
        .policy(kib_policy())
        .boundary(boundary.clone())
        .inter_chunk_pause_ms(pause_ms)
        .build()
        .unwrap()
}

fn pdf_file(name: &str, size: u64) -> SourceFile {
    let mut bytes = b"%PDF-1.7\n".to_vec();
    bytes.resize(size as usize, b' ');
    SourceFile::new(name, "application/pdf", bytes)
}

fn noise(width: u32, height: u32, seed: u32) -> RgbImage {
    let mut state = seed;
    RgbImage::from_fn(width, height, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let [r, g, b, _] = state.to_le_bytes();
        Rgb([r, g, b])
    })
}

fn encode(img: RgbImage, format: image::ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), format)
        .unwrap();
    buf
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn small_jpeg_is_submitted_once_unchanged() {
    let boundary = Arc::new(ScriptedBoundary::default());
    let orch = Orchestrator::with_engine(config(&boundary, 0), FakeEngine::uniform(1, 1));
    let jpeg = encode(noise(24, 24, 7), image::ImageFormat::Jpeg);
    assert!((jpeg.len() as u64) < 10 * KIB);
    let file = SourceFile::new("photo.jpg", "image/jpeg", jpeg.clone());

    let out = tokio_test::assert_ok!(orch.run(file).await);

    assert_eq!(boundary.call_count(), 1);
    let calls = boundary.calls.lock().unwrap();
    assert_eq!(calls[0].bytes, jpeg);
    assert_eq!(calls[0].name, "photo.jpg");
    assert_eq!(out.route, PreparedRoute::Direct { total_pages: None });
    assert_eq!(out.text, "text of photo.jpg");
    assert_eq!(out.stats.submissions, 1);
}

#[tokio::test]
async fn large_pdf_is_split_by_page_limit_and_merged_in_order() {
    let boundary = Arc::new(ScriptedBoundary::default());
    let recorder = Arc::new(StateRecorder::default());
    let cfg = PipelineConfig::builder()
        .policy(kib_policy())
        .boundary(boundary.clone())
        .inter_chunk_pause_ms(0)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let orch = Orchestrator::with_engine(cfg, FakeEngine::uniform(120, KIB / 2));

    let out = orch.run(pdf_file("report.pdf", 60 * KIB)).await.unwrap();

    match &out.route {
        PreparedRoute::Split { total_pages, chunks } => {
            assert_eq!(*total_pages, 120);
            let ranges: Vec<_> = chunks.iter().map(|c| (c.first_page, c.last_page)).collect();
            assert_eq!(ranges, vec![(1, 40), (41, 80), (81, 120)]);
            assert!(chunks.iter().all(|c| c.bytes <= 45 * KIB));
        }
        other => panic!("expected a split, got {other:?}"),
    }
    assert_eq!(
        boundary.call_names(),
        vec!["report.part-1.pdf", "report.part-2.pdf", "report.part-3.pdf"]
    );
    assert!(boundary
        .calls
        .lock()
        .unwrap()
        .iter()
        .all(|c| c.media_type == "application/pdf"));
    assert_eq!(
        out.text,
        "text of report.part-1.pdf\n\ntext of report.part-2.pdf\n\ntext of report.part-3.pdf"
    );

    let states = recorder.states.lock().unwrap().clone();
    assert_eq!(
        states,
        vec![
            RunState::Preparing,
            RunState::SplittingPdf,
            RunState::SubmittingChunks { part: 1, total: 3 },
            RunState::SubmittingChunks { part: 2, total: 3 },
            RunState::SubmittingChunks { part: 3, total: 3 },
            RunState::Merging,
            RunState::Done,
        ]
    );
    assert_eq!(*recorder.completed.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn oversized_png_is_compressed_with_first_fitting_combination() {
    let png = encode(noise(128, 128, 0x1234_5678), image::ImageFormat::Png);
    let rgb = image::load_from_memory(&png).unwrap().to_rgb8();
    let budget = encode_jpeg(&rgb, QUALITY_STEPS[0]).unwrap().len() as u64 - 1;
    assert!(png.len() as u64 > budget);

    let boundary = Arc::new(ScriptedBoundary::default());
    let recorder = Arc::new(StateRecorder::default());
    let cfg = PipelineConfig::builder()
        .policy(SizePolicy {
            max_image_bytes: budget,
            ..kib_policy()
        })
        .boundary(boundary.clone())
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let orch = Orchestrator::with_engine(cfg, FakeEngine::uniform(1, 1));

    let out = orch
        .run(SourceFile::new("scan.png", "image/png", png))
        .await
        .unwrap();

    let choice = match out.route {
        PreparedRoute::Compressed(c) => c,
        other => panic!("expected compression, got {other:?}"),
    };
    // Scale 1.0 / quality 90 was just over budget, so at least one step down.
    assert!(choice.attempts >= 2);
    assert!(SCALE_STEPS.contains(&choice.scale));
    assert!(choice.scale < 1.0 || choice.quality < QUALITY_STEPS[0]);

    let calls = boundary.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name, "scan.jpg");
    assert_eq!(calls[0].media_type, "image/jpeg");
    assert!(calls[0].bytes.len() as u64 <= budget);
    assert_eq!(
        recorder.states.lock().unwrap()[..3],
        [RunState::Preparing, RunState::CompressingImage, RunState::Submitting]
    );
}

#[tokio::test]
async fn page_too_large_on_its_own_fails_before_any_submission() {
    let boundary = Arc::new(ScriptedBoundary::default());
    let orch = Orchestrator::with_engine(config(&boundary, 0), FakeEngine::uniform(1, 55 * KIB));

    let err = tokio_test::assert_err!(orch.run(pdf_file("poster.pdf", 56 * KIB)).await);

    assert!(matches!(err, OcrChunkError::UnsplittablePage { page: 1, .. }));
    assert!(err.to_string().contains("manually"));
    assert!(err.is_preparation_failure());
    assert_eq!(boundary.call_count(), 0);
}

#[tokio::test]
async fn failed_chunk_halts_the_run_and_names_its_position() {
    let boundary = Arc::new(ScriptedBoundary::failing_on(
        2,
        BoundaryFailure::new("upstream error", Some(500)),
    ));
    let orch = Orchestrator::with_engine(config(&boundary, 0), FakeEngine::uniform(120, KIB / 2));

    let err = orch.run(pdf_file("report.pdf", 60 * KIB)).await.unwrap_err();

    assert_eq!(err.chunk_position(), Some((2, 3)));
    let msg = err.to_string();
    assert!(msg.contains("chunk 2 of 3"), "got: {msg}");
    assert!(msg.contains("HTTP 500"), "got: {msg}");
    // Chunk 3 is never sent.
    assert_eq!(boundary.call_count(), 2);
}

#[tokio::test]
async fn unsupported_type_fails_without_network_call() {
    let boundary = Arc::new(ScriptedBoundary::default());
    let orch = Orchestrator::with_engine(config(&boundary, 0), FakeEngine::uniform(1, 1));

    let err = orch
        .run(SourceFile::new("notes.txt", "text/plain", b"hello".to_vec()))
        .await
        .unwrap_err();

    assert!(matches!(err, OcrChunkError::UnsupportedMediaType { .. }));
    assert_eq!(boundary.call_count(), 0);
}

// ── Properties ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn pdf_within_budget_passes_through_byte_for_byte() {
    let boundary = Arc::new(ScriptedBoundary::default());
    let orch = Orchestrator::with_engine(config(&boundary, 0), FakeEngine::uniform(100, 100));
    let file = pdf_file("memo.pdf", 50 * KIB);

    let out = orch.run(file.clone()).await.unwrap();

    assert_eq!(out.route, PreparedRoute::Direct { total_pages: Some(100) });
    let calls = boundary.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].bytes, file.bytes());
    assert_eq!(calls[0].name, "memo.pdf");
}

#[tokio::test]
async fn page_budget_alone_triggers_a_split() {
    let boundary = Arc::new(ScriptedBoundary::default());
    let orch = Orchestrator::with_engine(config(&boundary, 0), FakeEngine::uniform(101, 10));

    let prepared = orch.prepare(&pdf_file("long.pdf", 4 * KIB)).await.unwrap();

    assert!(prepared.is_split());
    assert_eq!(prepared.submission_count(), 3);
    assert_eq!(boundary.call_count(), 0, "prepare never submits");
}

#[tokio::test]
async fn byte_budget_shrinks_chunks_below_page_limit() {
    let boundary = Arc::new(ScriptedBoundary::default());
    let orch = Orchestrator::with_engine(config(&boundary, 0), FakeEngine::uniform(50, 2 * KIB));

    let prepared = orch.prepare(&pdf_file("scan.pdf", 100 * KIB)).await.unwrap();

    let summaries = match prepared.route {
        PreparedRoute::Split { chunks, .. } => chunks,
        other => panic!("expected a split, got {other:?}"),
    };
    assert_eq!(summaries[0].last_page, 22);
    let mut next = 1;
    for c in &summaries {
        assert_eq!(c.first_page, next);
        assert!(c.bytes <= 45 * KIB);
        next = c.last_page + 1;
    }
    assert_eq!(next, 51);
}

#[tokio::test]
async fn chunks_are_paused_between_but_not_before_or_after() {
    let boundary = Arc::new(ScriptedBoundary::default());
    let orch = Orchestrator::with_engine(config(&boundary, 60), FakeEngine::uniform(120, KIB / 2));

    let started = Instant::now();
    orch.run(pdf_file("report.pdf", 60 * KIB)).await.unwrap();
    let elapsed = started.elapsed();

    let calls = boundary.calls.lock().unwrap();
    assert_eq!(calls.len(), 3);
    for pair in calls.windows(2) {
        let gap = pair[1].at.duration_since(pair[0].at);
        assert!(gap >= Duration::from_millis(60), "gap was {gap:?}");
    }
    // Two pauses, not three or four.
    assert!(elapsed >= Duration::from_millis(120));
    assert!(calls[0].at.duration_since(started) < Duration::from_millis(60));
}

#[tokio::test]
async fn merge_order_follows_parts_not_latency() {
    let boundary = Arc::new(ScriptedBoundary::default());
    boundary
        .delays
        .lock()
        .unwrap()
        .insert(1, Duration::from_millis(40));
    let orch = Orchestrator::with_engine(config(&boundary, 0), FakeEngine::uniform(120, KIB / 2));

    let out = orch.run(pdf_file("r.pdf", 60 * KIB)).await.unwrap();

    assert_eq!(
        out.fragments,
        vec!["text of r.part-1.pdf", "text of r.part-2.pdf", "text of r.part-3.pdf"]
    );
}

#[tokio::test]
async fn missing_pdfium_fails_pdf_runs_without_submitting() {
    let boundary = Arc::new(ScriptedBoundary::default());
    let orch = Orchestrator::with_engine(config(&boundary, 0), UnboundEngine);

    // Within the byte budget, but the page count cannot be checked.
    let err = orch.run(pdf_file("small.pdf", 8 * KIB)).await.unwrap_err();
    assert!(matches!(err, OcrChunkError::PdfiumBindingFailed(_)));
    assert!(err.is_preparation_failure());

    let err = orch.run(pdf_file("big.pdf", 60 * KIB)).await.unwrap_err();
    assert!(matches!(err, OcrChunkError::PdfiumBindingFailed(_)));
    assert_eq!(boundary.call_count(), 0);

    // Images never need pdfium.
    orch.run(SourceFile::new("a.png", "image/png", vec![0u8; 8]))
        .await
        .unwrap();
    assert_eq!(boundary.call_count(), 1);
}

#[tokio::test]
async fn unloadable_pdfium_library_fails_preparation() {
    let cfg = PipelineConfig::builder()
        .policy(kib_policy())
        .pdfium_library_path("/nonexistent/libpdfium.so")
        .build()
        .unwrap();
    let orch = Orchestrator::new(cfg);

    let err = orch.prepare(&pdf_file("long.pdf", 8 * KIB)).await.unwrap_err();
    assert!(matches!(err, OcrChunkError::PdfiumBindingFailed(_)), "got: {err}");
}

#[tokio::test]
async fn file_over_acceptance_ceiling_is_rejected() {
    let boundary = Arc::new(ScriptedBoundary::default());
    let orch = Orchestrator::with_engine(config(&boundary, 0), FakeEngine::uniform(1, 1));

    let err = orch.run(pdf_file("huge.pdf", 201 * KIB)).await.unwrap_err();
    assert!(matches!(err, OcrChunkError::FileTooLarge { .. }));
    assert_eq!(boundary.call_count(), 0);
}

#[tokio::test]
async fn empty_fragments_are_dropped_from_the_merge() {
    struct Sparse;

    #[async_trait]
    impl OcrBoundary for Sparse {
        async fn submit(&self, file: &SourceFile) -> Result<String, BoundaryFailure> {
            Ok(if file.name().ends_with("part-2.pdf") {
                "  \n".to_string()
            } else {
                format!("  {}  \n", file.name())
            })
        }
    }

    let cfg = PipelineConfig::builder()
        .policy(kib_policy())
        .boundary(Arc::new(Sparse))
        .inter_chunk_pause_ms(0)
        .build()
        .unwrap();
    let orch = Orchestrator::with_engine(cfg, FakeEngine::uniform(120, KIB / 2));

    let out = orch.run(pdf_file("d.pdf", 60 * KIB)).await.unwrap();
    assert_eq!(out.text, "d.part-1.pdf\n\nd.part-3.pdf");
    assert_eq!(out.fragments.len(), 3);
    assert_eq!(out.stats.empty_fragments, 1);
}

// ── Session ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn newer_run_supersedes_one_still_in_flight() {
    let boundary = Arc::new(ScriptedBoundary::holding("first.png"));
    let orch = Orchestrator::with_engine(config(&boundary, 0), FakeEngine::uniform(1, 1));
    let session = Session::new(orch);

    let background = session.clone();
    let first = tokio::spawn(async move {
        background
            .run(SourceFile::new("first.png", "image/png", vec![1u8; 64]))
            .await
    });
    boundary.entered.notified().await;

    let second = session
        .run(SourceFile::new("second.png", "image/png", vec![2u8; 64]))
        .await;
    assert!(matches!(second, RunOutcome::Completed { generation: 2, .. }));

    boundary.release.notify_one();
    let first = first.await.unwrap();
    assert!(first.is_superseded());
    assert!(matches!(first, RunOutcome::Superseded { generation: 1 }));

    let snap = session.snapshot();
    assert_eq!(snap.generation, 2);
    assert_eq!(snap.file_name.as_deref(), Some("second.png"));
    assert_eq!(snap.text.as_deref(), Some("text of second.png"));
    assert_eq!(snap.state, RunState::Done);
    assert_eq!(snap.status, None);
    assert_eq!(snap.error, None);
}

#[tokio::test]
async fn session_failure_keeps_error_and_discards_partial_text() {
    let boundary = Arc::new(ScriptedBoundary::failing_on(
        2,
        BoundaryFailure::new("upstream error", Some(500)),
    ));
    let orch = Orchestrator::with_engine(config(&boundary, 0), FakeEngine::uniform(120, KIB / 2));
    let session = Session::new(orch);

    let outcome = session.run(pdf_file("report.pdf", 60 * KIB)).await;

    match outcome {
        RunOutcome::Failed { generation, error } => {
            assert_eq!(generation, 1);
            assert_eq!(error.chunk_position(), Some((2, 3)));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    let snap = session.snapshot();
    assert_eq!(snap.state, RunState::Failed);
    assert_eq!(snap.text, None);
    assert_eq!(snap.chunks_completed, 1);
    assert!(snap.error.unwrap().contains("chunk 2 of 3"));
}

#[tokio::test]
async fn new_file_clears_previous_result() {
    let boundary = Arc::new(ScriptedBoundary::default());
    let orch = Orchestrator::with_engine(config(&boundary, 0), FakeEngine::uniform(1, 1));
    let session = Session::new(orch);

    session
        .run(SourceFile::new("a.png", "image/png", vec![0u8; 8]))
        .await;
    assert!(session.snapshot().text.is_some());

    let outcome = session
        .run(SourceFile::new("b.txt", "text/plain", vec![0u8; 8]))
        .await;
    assert!(matches!(outcome, RunOutcome::Failed { generation: 2, .. }));
    let snap = session.snapshot();
    assert_eq!(snap.text, None);
    assert!(snap.error.is_some());
}

#[tokio::test]
async fn unresolvable_input_is_rejected_without_touching_active_run() {
    let boundary = Arc::new(ScriptedBoundary::default());
    let orch = Orchestrator::with_engine(config(&boundary, 0), FakeEngine::uniform(1, 1));
    let session = Session::new(orch);
    session
        .run(SourceFile::new("a.png", "image/png", vec![0u8; 8]))
        .await;

    let outcome = session.open("/definitely/not/here.png").await;

    assert!(matches!(
        outcome,
        RunOutcome::Rejected {
            error: OcrChunkError::FileNotFound { .. }
        }
    ));
    assert_eq!(session.current_generation(), 1);
    assert_eq!(session.snapshot().text.as_deref(), Some("text of a.png"));
}
