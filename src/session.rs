//! One user's active run, with implicit cancellation by generation id.
//!
//! Selecting a new file does not abort the run already in flight: its
//! boundary call finishes normally. Instead every run is tagged with a
//! monotonically increasing generation, and status updates and the final
//! commit only land while that generation is still the current one. A
//! stale run's result is observed and thrown away.

use crate::error::OcrChunkError;
use crate::output::RunOutput;
use crate::pipeline::input;
use crate::pipeline::pdf::{PdfEngine, PdfiumEngine};
use crate::progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback, RunState};
use crate::run::Orchestrator;
use crate::source::SourceFile;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// What the session currently shows for its active run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActiveRun {
    pub generation: u64,
    pub file_name: Option<String>,
    pub state: RunState,
    /// Transient status line; cleared on `Done` and `Failed`.
    pub status: Option<String>,
    /// Merged text of a completed run.
    pub text: Option<String>,
    /// User-facing message of a failed run.
    pub error: Option<String>,
    /// Chunks that came back before the run ended. Kept for diagnostics;
    /// partial text is never shown as a result.
    pub chunks_completed: usize,
}

/// How a call to [`Session::run`] ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The run finished and its output is now the session's result.
    Completed { generation: u64, output: RunOutput },
    /// The run failed and its error is now the session's error.
    Failed { generation: u64, error: OcrChunkError },
    /// A newer run started before this one finished; its result was dropped.
    Superseded { generation: u64 },
    /// The input never became a file (missing, too large, download failed).
    Rejected { error: OcrChunkError },
}

impl RunOutcome {
    pub fn is_superseded(&self) -> bool {
        matches!(self, RunOutcome::Superseded { .. })
    }
}

struct Shared {
    next_generation: AtomicU64,
    active: Mutex<ActiveRun>,
}

impl Shared {
    fn active(&self) -> MutexGuard<'_, ActiveRun> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the active-run state for one user.
pub struct Session<E = PdfiumEngine> {
    orchestrator: Arc<Orchestrator<E>>,
    shared: Arc<Shared>,
}

impl<E> Clone for Session<E> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: PdfEngine> Session<E> {
    pub fn new(orchestrator: Orchestrator<E>) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            shared: Arc::new(Shared {
                next_generation: AtomicU64::new(0),
                active: Mutex::new(ActiveRun::default()),
            }),
        }
    }

    /// Copy of the current active-run state.
    pub fn snapshot(&self) -> ActiveRun {
        self.shared.active().clone()
    }

    pub fn current_generation(&self) -> u64 {
        self.shared.active().generation
    }

    /// Resolve `input_str` (path or URL) and run it. A file that cannot be
    /// resolved is rejected without disturbing the active run.
    pub async fn open(&self, input_str: &str) -> RunOutcome {
        let config = self.orchestrator.config();
        match input::resolve_input(input_str, &config.policy, config.download_timeout_secs).await {
            Ok(file) => self.run(file).await,
            Err(error) => RunOutcome::Rejected { error },
        }
    }

    /// Make `file` the active input and run it to completion.
    ///
    /// Any earlier run's text and error are discarded immediately; if that
    /// run is still in flight, it finishes as [`RunOutcome::Superseded`].
    pub async fn run(&self, file: SourceFile) -> RunOutcome {
        let generation = self.shared.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut active = self.shared.active();
            *active = ActiveRun {
                generation,
                file_name: Some(file.name().to_string()),
                ..ActiveRun::default()
            };
        }
        debug!("Run {} started for '{}'", generation, file.name());

        let observer = Arc::new(GenerationObserver {
            shared: Arc::clone(&self.shared),
            generation,
            inner: self
                .orchestrator
                .config()
                .progress_callback
                .clone()
                .unwrap_or_else(|| Arc::new(NoopProgressCallback)),
        });
        let result = self.orchestrator.run_observed(file, observer).await;

        let mut active = self.shared.active();
        if active.generation != generation {
            debug!(
                "Run {} finished after run {} started; discarding its result",
                generation, active.generation
            );
            return RunOutcome::Superseded { generation };
        }
        active.status = None;
        match result {
            Ok(output) => {
                active.state = RunState::Done;
                active.text = Some(output.text.clone());
                RunOutcome::Completed { generation, output }
            }
            Err(error) => {
                active.state = RunState::Failed;
                active.error = Some(error.to_string());
                RunOutcome::Failed { generation, error }
            }
        }
    }
}

/// Applies a run's progress to the session only while the run is current,
/// and forwards it to the configured callback under the same condition.
struct GenerationObserver {
    shared: Arc<Shared>,
    generation: u64,
    inner: ProgressCallback,
}

impl GenerationObserver {
    /// Apply `update` if this run is still current; returns whether it was.
    fn apply(&self, update: impl FnOnce(&mut ActiveRun)) -> bool {
        let mut active = self.shared.active();
        if active.generation != self.generation {
            return false;
        }
        update(&mut active);
        true
    }
}

impl PipelineProgressCallback for GenerationObserver {
    fn on_run_start(&self, name: &str, bytes: u64) {
        if self.apply(|_| {}) {
            self.inner.on_run_start(name, bytes);
        }
    }

    fn on_state_change(&self, state: &RunState) {
        // Done and Failed are committed together with the result.
        if state.is_terminal() {
            if self.apply(|_| {}) {
                self.inner.on_state_change(state);
            }
            return;
        }
        let applied = self.apply(|active| {
            active.state = state.clone();
            active.status = state.status_text();
        });
        if applied {
            self.inner.on_state_change(state);
        }
    }

    fn on_chunk_start(&self, part: usize, total: usize) {
        if self.apply(|_| {}) {
            self.inner.on_chunk_start(part, total);
        }
    }

    fn on_chunk_complete(&self, part: usize, total: usize, text_len: usize) {
        if self.apply(|active| active.chunks_completed = part) {
            self.inner.on_chunk_complete(part, total, text_len);
        }
    }

    fn on_chunk_error(&self, part: usize, total: usize, error: &str) {
        if self.apply(|_| {}) {
            self.inner.on_chunk_error(part, total, error);
        }
    }

    fn on_run_complete(&self, success: bool) {
        if self.apply(|_| {}) {
            self.inner.on_run_complete(success);
        }
    }
}
