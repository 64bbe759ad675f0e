//! CLI binary for ocr-chunker.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use ocr_chunker::{
    ocr_file, ocr_to_file, plan, PipelineConfig, PipelineProgressCallback, PreparedInput,
    PreparedRoute, ProgressCallback, RunOutput, RunState, SizePolicy,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner carrying the status text, switched to a
/// chunk counter once a split run starts submitting.
struct CliProgressCallback {
    bar: ProgressBar,
    chunk_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("OCR");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            chunk_started: Mutex::new(None),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("OCR");
    }

    fn chunk_elapsed(&self) -> f64 {
        self.chunk_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_run_start(&self, name: &str, bytes: u64) {
        self.bar.println(format!(
            "{} {} {}",
            cyan("◆"),
            bold(name),
            dim(&ocr_chunker::policy::format_mib(bytes))
        ));
    }

    fn on_state_change(&self, state: &RunState) {
        if let Some(text) = state.status_text() {
            self.bar.set_message(text);
        }
    }

    fn on_chunk_start(&self, part: usize, total: usize) {
        if part == 1 {
            self.activate_bar(total);
        }
        if let Ok(mut t) = self.chunk_started.lock() {
            *t = Some(Instant::now());
        }
    }

    fn on_chunk_complete(&self, part: usize, total: usize, text_len: usize) {
        let secs = self.chunk_elapsed();
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            part,
            total,
            dim(&format!("{text_len:>6} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_chunk_error(&self, part: usize, total: usize, error: &str) {
        let secs = self.chunk_elapsed();
        let msg = match error.char_indices().nth(80) {
            Some((idx, _)) => format!("{}\u{2026}", &error[..idx]),
            None => error.to_string(),
        };
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {}  {}",
            red("✗"),
            part,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
    }

    fn on_run_complete(&self, _success: bool) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR an image or PDF (text on stdout)
  ocr-chunk --endpoint https://ocr.example.com/api/ocr scan.pdf

  # Write Markdown to a file
  ocr-chunk scan.pdf -o scan.md

  # Show how a large PDF would be split, without calling the endpoint
  ocr-chunk --plan-only big-report.pdf

  # JSON output with route and timing
  ocr-chunk --json photo.png > photo.json

LIMITS (remote service):
  Images  ≤ 10 MiB        → larger images are re-encoded as JPEG
  PDFs    ≤ 50 MiB, ≤ 100 pages → larger PDFs are split into
                            ≤ 40-page chunks of ≤ 45 MiB
  Files over 200 MiB are rejected.

ENVIRONMENT VARIABLES:
  OCR_ENDPOINT        OCR endpoint URL
  OCR_API_KEY         Bearer token for the endpoint
  PDFIUM_LIB_PATH     Existing libpdfium to use instead of the cached download
  RUST_LOG            Override log filter
"#;

/// OCR images and PDFs of any size through a size-limited OCR endpoint.
#[derive(Parser, Debug)]
#[command(
    name = "ocr-chunk",
    version,
    about = "OCR images and PDFs of any size through a size-limited OCR endpoint",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path or HTTP/HTTPS URL (png, jpg, jpeg, webp, pdf).
    input: String,

    /// Write Markdown to this file instead of stdout.
    #[arg(short, long, env = "OCR_CHUNK_OUTPUT")]
    output: Option<PathBuf>,

    /// OCR endpoint URL.
    #[arg(long, env = "OCR_ENDPOINT")]
    endpoint: Option<String>,

    /// Bearer token for the OCR endpoint.
    #[arg(long, env = "OCR_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Output structured JSON (RunOutput) instead of text.
    #[arg(long, env = "OCR_CHUNK_JSON")]
    json: bool,

    /// Print how the file would be prepared, without calling the endpoint.
    #[arg(long)]
    plan_only: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "OCR_CHUNK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OCR_CHUNK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OCR_CHUNK_QUIET")]
    quiet: bool,

    /// Pause between chunk submissions in milliseconds.
    #[arg(long, env = "OCR_CHUNK_PAUSE_MS", default_value_t = 250)]
    pause_ms: u64,

    /// Starting page count per PDF chunk (1–100).
    #[arg(long, env = "OCR_CHUNK_MAX_PAGES", default_value_t = 40,
          value_parser = clap::value_parser!(u16).range(1..=100))]
    max_pages_per_chunk: u16,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "OCR_CHUNK_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-request OCR timeout in seconds.
    #[arg(long, env = "OCR_CHUNK_REQUEST_TIMEOUT", default_value_t = 120)]
    request_timeout: u64,

    /// Path to the pdfium library (file or directory). Without it, pdfium
    /// is taken from PDFIUM_LIB_PATH or downloaded once into a local cache.
    #[arg(long)]
    pdfium_lib: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner carries the status; INFO logs would tear through it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.plan_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Ensure PDFium engine is available ───────────────────────────────
    // Only PDFs need it. An explicit --pdfium-lib skips the download layer.
    let wants_pdfium =
        cli.pdfium_lib.is_none() && cli.input.to_ascii_lowercase().ends_with(".pdf");

    #[cfg(feature = "bundled")]
    if wants_pdfium {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_bundled())
            .context("Failed to extract bundled PDFium engine")?;
    }

    #[cfg(not(feature = "bundled"))]
    if wants_pdfium && !pdfium_auto::is_pdfium_cached() {
        ensure_pdfium(cli.quiet)?;
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Plan-only mode ───────────────────────────────────────────────────
    if cli.plan_only {
        let prepared = plan(&cli.input, &config)
            .await
            .context("Failed to prepare input")?;
        print_plan(&prepared, cli.json)?;
        return Ok(());
    }

    // ── Run ──────────────────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        let output = ocr_to_file(&cli.input, output_path, &config)
            .await
            .context("OCR failed")?;
        if !cli.quiet {
            print_summary(&output);
            eprintln!("   → {}", bold(&output_path.display().to_string()));
        }
    } else {
        let output = ocr_file(&cli.input, &config).await.context("OCR failed")?;

        if cli.json {
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            println!("{json}");
        } else {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(output.text.as_bytes())
                .context("Failed to write to stdout")?;
            if !output.text.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }

        if !cli.quiet && !cli.json {
            print_summary(&output);
        }
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
/// First-run download of the pdfium library into the pdfium-auto cache.
#[cfg(not(feature = "bundled"))]
fn ensure_pdfium(quiet: bool) -> Result<()> {
    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  "),
    );
    bar.set_prefix("PDF engine");
    bar.enable_steady_tick(Duration::from_millis(80));

    let on_progress = |downloaded: u64, total: Option<u64>| {
        if let Some(t) = total {
            if bar.length() != Some(t) {
                bar.set_length(t);
            }
        }
        bar.set_position(downloaded);
    };
    tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(Some(&on_progress)))
        .context("Failed to download PDFium engine")?;

    bar.finish_with_message("ready");
    Ok(())
}

fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let policy = SizePolicy {
        max_pages_per_chunk: cli.max_pages_per_chunk as usize,
        ..SizePolicy::default()
    };

    let mut builder = PipelineConfig::builder()
        .policy(policy)
        .inter_chunk_pause_ms(cli.pause_ms)
        .download_timeout_secs(cli.download_timeout)
        .request_timeout_secs(cli.request_timeout);

    if let Some(ref url) = cli.endpoint {
        builder = builder.endpoint(url.clone());
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref path) = cli.pdfium_lib {
        builder = builder.pdfium_library_path(path.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(output: &RunOutput) {
    let stats = &output.stats;
    let route = match &output.route {
        PreparedRoute::Direct { .. } => "submitted as-is".to_string(),
        PreparedRoute::Compressed(c) => {
            format!("compressed at scale {:.1}, quality {}", c.scale, c.quality)
        }
        PreparedRoute::Split { chunks, .. } => format!("split into {} chunks", chunks.len()),
    };
    eprintln!(
        "{}  {} chars  {}  {}ms",
        green("✔"),
        output.text.chars().count(),
        dim(&route),
        stats.total_duration_ms,
    );
}

fn print_plan(prepared: &PreparedInput, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&prepared.route).context("Failed to serialise plan")?
        );
        return Ok(());
    }

    println!("File:         {}", prepared.source_name);
    println!(
        "Size:         {}",
        ocr_chunker::policy::format_mib(prepared.source_bytes)
    );
    match &prepared.route {
        PreparedRoute::Direct { total_pages } => {
            println!("Route:        direct (within budget)");
            if let Some(pages) = total_pages {
                println!("Pages:        {pages}");
            }
        }
        PreparedRoute::Compressed(c) => {
            println!("Route:        JPEG re-encode");
            match c.dimensions {
                Some((w, h)) => println!("Scale:        {:.1} ({w}x{h})", c.scale),
                None => println!("Scale:        {:.1}", c.scale),
            }
            println!("Quality:      {}", c.quality);
            println!("Attempts:     {}", c.attempts);
            println!(
                "Result:       {}",
                ocr_chunker::policy::format_mib(prepared.submitted_bytes())
            );
        }
        PreparedRoute::Split {
            total_pages,
            chunks,
        } => {
            println!("Route:        split");
            println!("Pages:        {total_pages}");
            println!("Chunks:       {}", chunks.len());
            for c in chunks {
                println!(
                    "  {:>3}. pages {:>4}–{:<4}  {:>10}  {}",
                    c.part,
                    c.first_page,
                    c.last_page,
                    ocr_chunker::policy::format_mib(c.bytes),
                    dim(&c.name)
                );
            }
        }
    }
    Ok(())
}
