//! Running a detile job on a background worker.
//!
//! [`Pipeline::start`] moves the whole job onto a `spawn_blocking` thread
//! and hands back a [`PipelineHandle`] at once. pdfium is CPU-bound and
//! keeps thread-local state, so the backend is built on that thread by a
//! factory closure and never leaves it. The only thing the two sides share
//! is the bounded event channel described in [`crate::progress`].
//!
//! ```text
//! observer task                     worker thread (spawn_blocking)
//! ─────────────                     ──────────────────────────────
//! Pipeline::start ──spawn──▶  resolve input ─▶ bind backend ─▶ open
//!        │                          │
//!        │  ◀── Progress(1, k, n) ──┤ step 1: descriptors, tile size
//!        │  ◀── Progress(2, k, n) ──┤ step 2: rasterise into staging
//!        │  ◀── Progress(3, k, n) ──┤ step 3: composite, finalize
//!        │                          │ purge staging
//!        │  ◀── Completed / Failed ─┘
//! ```

use crate::config::DetileConfig;
use crate::error::DetileError;
use crate::output::{DetileOutput, DetileStats, DocumentSummary};
use crate::pipeline::composite::GridCompositor;
use crate::pipeline::grid::GridLayout;
use crate::pipeline::input;
use crate::pipeline::pdfium::PdfiumBackend;
use crate::pipeline::render::PageRasterizer;
use crate::pipeline::source::{is_uniform, Backend, DocumentSource, PageDescriptor, TileSize};
use crate::progress::{PipelineEvent, ProgressReporter, Step};
use crate::staging::StagingArea;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::pin::Pin;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

/// A boxed stream of pipeline events, ending with exactly one terminal event.
pub type EventStream = Pin<Box<dyn Stream<Item = PipelineEvent> + Send>>;

/// A configured detile job that has not started yet.
#[derive(Debug)]
pub struct Pipeline {
    config: DetileConfig,
}

impl Pipeline {
    pub fn new(config: DetileConfig) -> Self {
        Self { config }
    }

    /// Start the job with the pdfium backend.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> PipelineHandle {
        self.start_with(PdfiumBackend::bind)
    }

    /// Start the job with the backend produced by `factory`, which runs on
    /// the worker thread.
    pub fn start_with<B, F>(self, factory: F) -> PipelineHandle
    where
        B: Backend + 'static,
        F: FnOnce() -> Result<B, DetileError> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.config.event_buffer);
        let config = self.config;
        let worker = tokio::task::spawn_blocking(move || {
            let mut reporter = ProgressReporter::new(tx);
            let result = run_blocking(&config, factory, &mut reporter);
            match &result {
                Ok(out) => info!(
                    "Detile complete: {} pages → {} in {}ms",
                    out.stats.page_count,
                    out.output_path.display(),
                    out.stats.total_duration_ms
                ),
                Err(e) => warn!("Detile failed: {}", e),
            }
            reporter.finish(result);
        });
        PipelineHandle { events: rx, worker }
    }
}

/// Observer side of a running job.
///
/// Dropping the handle does not stop the worker; the run finishes and
/// cleans up its staging area on its own.
pub struct PipelineHandle {
    events: mpsc::Receiver<PipelineEvent>,
    worker: JoinHandle<()>,
}

impl PipelineHandle {
    /// Next event, or `None` once the terminal event has been taken.
    pub async fn next_event(&mut self) -> Option<PipelineEvent> {
        self.events.recv().await
    }

    /// All remaining events as a stream. A worker that dies without sending
    /// its terminal event yields a final `Failed(Internal)`.
    pub fn into_stream(self) -> EventStream {
        let worker = self.worker;
        let tail = stream::once(worker).filter_map(|joined| async move {
            joined.err().map(|e| {
                PipelineEvent::Failed(DetileError::Internal(format!(
                    "pipeline worker died: {e}"
                )))
            })
        });
        Box::pin(ReceiverStream::new(self.events).chain(tail))
    }

    /// Drain events and return the run's result. Progress is discarded.
    pub async fn wait(mut self) -> Result<DetileOutput, DetileError> {
        let mut outcome = None;
        while let Some(event) = self.events.recv().await {
            match event {
                PipelineEvent::Progress(p) => {
                    debug!("{} {}/{}", p.step, p.completed, p.total)
                }
                PipelineEvent::Completed(out) => outcome = Some(Ok(out)),
                PipelineEvent::Failed(e) => outcome = Some(Err(e)),
            }
        }
        let joined = self.worker.await;
        match (outcome, joined) {
            (Some(result), _) => result,
            (None, Err(e)) => Err(DetileError::Internal(format!(
                "pipeline worker died: {e}"
            ))),
            (None, Ok(())) => Err(DetileError::Internal(
                "pipeline ended without a result".into(),
            )),
        }
    }
}

/// Detile with the pdfium backend and wait for the result.
///
/// # Example
/// ```rust,no_run
/// use pdf_detile::{detile, DetileConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = DetileConfig::builder("site-plan.pdf", 4).scale(2.0).build()?;
/// let output = detile(config).await?;
/// println!("{} ({} × {} px)", output.output_path.display(),
///     output.stats.canvas_width_px, output.stats.canvas_height_px);
/// # Ok(())
/// # }
/// ```
pub async fn detile(config: DetileConfig) -> Result<DetileOutput, DetileError> {
    Pipeline::new(config).start().wait().await
}

/// Synchronous wrapper around [`detile`].
///
/// Creates a temporary tokio runtime internally.
pub fn detile_sync(config: DetileConfig) -> Result<DetileOutput, DetileError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DetileError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(detile(config))
}

/// Read page count and tile size without rendering anything.
pub async fn inspect(path: impl AsRef<Path>) -> Result<DocumentSummary, DetileError> {
    inspect_with(path, None, PdfiumBackend::bind).await
}

/// [`inspect`] for a possibly encrypted source, with a caller-supplied
/// backend.
pub async fn inspect_with<B, F>(
    path: impl AsRef<Path>,
    password: Option<String>,
    factory: F,
) -> Result<DocumentSummary, DetileError>
where
    B: Backend + 'static,
    F: FnOnce() -> Result<B, DetileError> + Send + 'static,
{
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<DocumentSummary, DetileError> {
        let path = input::resolve_input(&path)?;
        let backend = factory()?;
        let source = backend.open(&path, password.as_deref())?;
        let descriptors = read_descriptors(&*source, &path, |_, _| {})?;
        let first = descriptors[0];
        Ok(DocumentSummary {
            page_count: descriptors.len(),
            tile_width_units: first.width_units,
            tile_height_units: first.height_units,
            unit_scale: first.unit_scale,
            uniform: is_uniform(&descriptors),
        })
    })
    .await
    .map_err(|e| DetileError::Internal(format!("inspect task failed: {e}")))?
}

// ── Worker ───────────────────────────────────────────────────────────────

fn run_blocking<B, F>(
    config: &DetileConfig,
    factory: F,
    progress: &mut ProgressReporter,
) -> Result<DetileOutput, DetileError>
where
    B: Backend,
    F: FnOnce() -> Result<B, DetileError>,
{
    let total_start = Instant::now();
    info!(
        "Starting detile: {} ({} columns)",
        config.input_path.display(),
        config.columns
    );

    let input_path = input::resolve_input(&config.input_path)?;
    let backend = factory()?;
    let source = backend.open(&input_path, config.password.as_deref())?;

    // ── Step 1: Extract descriptors ──────────────────────────────────────
    let extract_start = Instant::now();
    let descriptors = read_descriptors(&*source, &input_path, |completed, total| {
        progress.advance(Step::Extract, completed, total)
    })?;
    let tile = TileSize::from_descriptors(&descriptors, config.scale)?;
    let layout = GridLayout::new(
        descriptors.len(),
        config.columns,
        tile,
        config.vertical_compensation,
    )?;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    info!(
        "{} pages of {:.2} x {:.2} in → {} x {} grid",
        layout.page_count(),
        descriptors[0].width_inches(),
        descriptors[0].height_inches(),
        layout.columns(),
        layout.rows()
    );

    // ── Steps 2 & 3: Rasterise and composite via staging ────────────────
    let staging = StagingArea::for_run(&config.staging_root())?;
    let staged = rasterize_and_composite(config, &backend, &*source, &layout, &staging, progress);

    // The staging area goes before the terminal event in every outcome.
    let (render_duration_ms, composite_duration_ms) = match (staged, staging.purge()) {
        (Ok(durations), Ok(())) => durations,
        (Ok(durations), Err(e)) => {
            warn!("Output written but staging cleanup failed: {}", e);
            durations
        }
        (Err(e), purged) => {
            if let Err(p) = purged {
                warn!("Staging cleanup after failure also failed: {}", p);
            }
            return Err(e);
        }
    };

    Ok(DetileOutput {
        output_path: config.output_path.clone(),
        stats: DetileStats {
            extract_duration_ms,
            render_duration_ms,
            composite_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
            ..DetileStats::from_layout(&layout)
        },
    })
}

/// Descriptors of every page, in order, reporting each one to `on_page`.
fn read_descriptors(
    source: &dyn DocumentSource,
    path: &Path,
    mut on_page: impl FnMut(usize, usize),
) -> Result<Vec<PageDescriptor>, DetileError> {
    let total = source.page_count();
    if total == 0 {
        return Err(DetileError::EmptyDocument {
            path: path.to_path_buf(),
        });
    }
    let mut descriptors = Vec::with_capacity(total);
    for index in 0..total {
        descriptors.push(source.descriptor(index)?);
        on_page(index + 1, total);
    }
    Ok(descriptors)
}

/// Steps 2 and 3. Returns `(render_ms, composite_ms)`.
fn rasterize_and_composite<B: Backend>(
    config: &DetileConfig,
    backend: &B,
    source: &dyn DocumentSource,
    layout: &GridLayout,
    staging: &StagingArea,
    progress: &mut ProgressReporter,
) -> Result<(u64, u64), DetileError> {
    let render_start = Instant::now();
    let artifacts = PageRasterizer::new(staging, config.raster_format, layout.tile_width())
        .rasterize_all(source, progress)?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(
        "Rendered {} pages in {}ms",
        artifacts.len(),
        render_duration_ms
    );

    let composite_start = Instant::now();
    let assembler = backend.new_assembler()?;
    GridCompositor::new(layout).composite(assembler, &artifacts, &config.output_path, progress)?;
    Ok((
        render_duration_ms,
        composite_start.elapsed().as_millis() as u64,
    ))
}
