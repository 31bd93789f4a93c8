//! Pipeline integration tests against an in-memory rendering backend.
//!
//! The fake backend renders solid-colour tiles and records every call the
//! compositor makes on its assembler, so these tests exercise the whole
//! worker (input checks, staging, ordering, cleanup) without pdfium.
//!
//! Run with:
//!   cargo test --test pipeline

use futures::StreamExt;
use image::{DynamicImage, Rgba, RgbaImage};
use pdf_detile::pipeline::composite::DocumentAssembler;
use pdf_detile::pipeline::source::{
    Backend, DocumentSource, PageDescriptor, SurfaceError, VectorSurface,
};
use pdf_detile::{
    inspect_with, DetileConfig, DetileError, DetileOutput, ErrorKind, Pipeline, PipelineEvent,
    ProgressEvent, RasterFormat, Step, VerticalCompensation, WireMessage,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Fake backend ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Call {
    AddPage(u32, u32),
    /// Path, x, y, width, and whether the raster existed when drawn.
    Draw(PathBuf, f32, f32, u32, bool),
    Finalize(PathBuf),
}

#[derive(Clone, Default)]
struct FakeDocument {
    /// Width/height of each page in points.
    pages: Vec<(f32, f32)>,
    /// 0-based page whose rasterisation fails.
    fail_raster_at: Option<usize>,
    fail_finalize: bool,
    /// After writing the output, replace the staging directory with a file.
    block_staging_cleanup: bool,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl FakeDocument {
    fn uniform(n: usize) -> Self {
        Self {
            pages: vec![(10.0, 20.0); n],
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn draws(&self) -> Vec<(f32, f32)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Draw(_, x, y, _, _) => Some((x, y)),
                _ => None,
            })
            .collect()
    }
}

struct FakeBackend(FakeDocument);

impl Backend for FakeBackend {
    fn open<'a>(
        &'a self,
        _path: &Path,
        password: Option<&'a str>,
    ) -> Result<Box<dyn DocumentSource + 'a>, DetileError> {
        assert!(password.is_none());
        Ok(Box::new(FakeSource(&self.0)))
    }

    fn new_assembler(&self) -> Result<Box<dyn DocumentAssembler + '_>, DetileError> {
        Ok(Box::new(RecordingAssembler {
            calls: self.0.calls.clone(),
            fail_finalize: self.0.fail_finalize,
            block_staging_cleanup: self.0.block_staging_cleanup,
            staging_dir: None,
        }))
    }
}

struct FakeSource<'a>(&'a FakeDocument);

impl DocumentSource for FakeSource<'_> {
    fn page_count(&self) -> usize {
        self.0.pages.len()
    }

    fn descriptor(&self, index: usize) -> Result<PageDescriptor, DetileError> {
        let (w, h) = self.0.pages[index];
        Ok(PageDescriptor {
            source_index: index,
            width_units: w,
            height_units: h,
            unit_scale: 72.0,
        })
    }

    fn surface(&self, index: usize) -> Result<Box<dyn VectorSurface + '_>, DetileError> {
        let (w, h) = self.0.pages[index];
        Ok(Box::new(SolidSurface {
            aspect: h / w,
            broken: self.0.fail_raster_at == Some(index),
        }))
    }
}

struct SolidSurface {
    aspect: f32,
    broken: bool,
}

impl VectorSurface for SolidSurface {
    fn rasterize(&self, width_px: u32) -> Result<DynamicImage, SurfaceError> {
        if self.broken {
            return Err("content stream ended unexpectedly".into());
        }
        let height = (width_px as f32 * self.aspect).round() as u32;
        Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width_px,
            height,
            Rgba([200, 40, 40, 255]),
        )))
    }
}

struct RecordingAssembler {
    calls: Arc<Mutex<Vec<Call>>>,
    fail_finalize: bool,
    block_staging_cleanup: bool,
    staging_dir: Option<PathBuf>,
}

impl DocumentAssembler for RecordingAssembler {
    fn add_page(&mut self, width_px: u32, height_px: u32) -> Result<(), DetileError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::AddPage(width_px, height_px));
        Ok(())
    }

    fn draw_image(
        &mut self,
        path: &Path,
        x_px: f32,
        y_px: f32,
        width_px: u32,
    ) -> Result<(), DetileError> {
        self.staging_dir = path.parent().map(Path::to_path_buf);
        self.calls.lock().unwrap().push(Call::Draw(
            path.to_path_buf(),
            x_px,
            y_px,
            width_px,
            path.is_file(),
        ));
        Ok(())
    }

    fn finalize(self: Box<Self>, output_path: &Path) -> Result<(), DetileError> {
        if self.fail_finalize {
            return Err(DetileError::composition("disk full"));
        }
        std::fs::write(output_path, b"%PDF-1.7\n").map_err(|source| {
            DetileError::OutputWriteFailed {
                path: output_path.to_path_buf(),
                source,
            }
        })?;
        if self.block_staging_cleanup {
            if let Some(dir) = &self.staging_dir {
                std::fs::remove_dir_all(dir).unwrap();
                std::fs::write(dir, b"not a directory").unwrap();
            }
        }
        self.calls
            .lock()
            .unwrap()
            .push(Call::Finalize(output_path.to_path_buf()));
        Ok(())
    }
}

// ── Test helpers ─────────────────────────────────────────────────────────────

/// A scratch directory holding a `tiles.pdf` input and an empty staging root.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("tiles.pdf"), b"%PDF-1.7\n%fake\n").unwrap();
        std::fs::create_dir(dir.path().join("staging")).unwrap();
        Self { dir }
    }

    fn input(&self) -> PathBuf {
        self.dir.path().join("tiles.pdf")
    }

    fn staging_root(&self) -> PathBuf {
        self.dir.path().join("staging")
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("tiles_detiled.pdf")
    }

    fn config(&self, columns: usize) -> DetileConfig {
        DetileConfig::builder(self.input(), columns)
            .staging_root(self.staging_root())
            .build()
            .unwrap()
    }

    fn staging_entries(&self) -> usize {
        std::fs::read_dir(self.staging_root()).unwrap().count()
    }
}

/// Run `config` against `doc` and collect every event in order.
async fn run_events(config: DetileConfig, doc: &FakeDocument) -> Vec<PipelineEvent> {
    let doc = doc.clone();
    let mut handle = Pipeline::new(config).start_with(move || Ok(FakeBackend(doc)));
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    events
}

async fn run(config: DetileConfig, doc: &FakeDocument) -> Result<DetileOutput, DetileError> {
    let doc = doc.clone();
    Pipeline::new(config)
        .start_with(move || Ok(FakeBackend(doc)))
        .wait()
        .await
}

fn progress_of(events: &[PipelineEvent]) -> Vec<ProgressEvent> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Progress(p) => Some(*p),
            _ => None,
        })
        .collect()
}

// ── Grid scenarios ───────────────────────────────────────────────────────────

#[tokio::test]
async fn six_pages_three_columns() {
    let ws = Workspace::new();
    let doc = FakeDocument::uniform(6);

    let out = run(ws.config(3), &doc).await.unwrap();

    assert_eq!(out.output_path, ws.output());
    assert!(out.output_path.is_file());
    assert_eq!((out.stats.columns, out.stats.rows), (3, 2));
    assert_eq!((out.stats.canvas_width_px, out.stats.canvas_height_px), (30, 40));

    let calls = doc.calls();
    assert_eq!(calls[0], Call::AddPage(30, 40));
    // Tile 4 sits in row 1, column 1.
    assert_eq!(doc.draws()[4], (10.0, 20.0));
}

#[tokio::test]
async fn single_column_stacks_every_page() {
    let ws = Workspace::new();
    let doc = FakeDocument::uniform(4);

    let out = run(ws.config(1), &doc).await.unwrap();

    assert_eq!((out.stats.columns, out.stats.rows), (1, 4));
    assert_eq!(out.stats.canvas_width_px, 10);
    let expected: Vec<_> = (0..4).map(|i| (0.0, 20.0 * i as f32)).collect();
    assert_eq!(doc.draws(), expected);
}

#[tokio::test]
async fn partial_last_row_is_on_the_canvas() {
    let ws = Workspace::new();
    let doc = FakeDocument::uniform(7);

    let out = run(ws.config(3), &doc).await.unwrap();

    assert_eq!(out.stats.rows, 3);
    assert_eq!(out.stats.canvas_height_px, 60);
    let draws = doc.draws();
    assert_eq!(draws.len(), 7);
    assert_eq!(draws[6], (0.0, 40.0));
    assert!(draws[6].1 + 20.0 <= out.stats.canvas_height_px as f32);
}

#[tokio::test]
async fn exactly_one_output_page() {
    let ws = Workspace::new();
    let doc = FakeDocument::uniform(9);

    run(ws.config(3), &doc).await.unwrap();

    let calls = doc.calls();
    let pages = calls
        .iter()
        .filter(|c| matches!(c, Call::AddPage(..)))
        .count();
    assert_eq!(pages, 1);
    assert!(matches!(calls.last(), Some(Call::Finalize(_))));
    // Every raster was still staged when it was drawn.
    assert!(calls
        .iter()
        .all(|c| !matches!(c, Call::Draw(_, _, _, _, false))));
}

#[tokio::test]
async fn legacy_compensation_pulls_rows_up() {
    let ws = Workspace::new();
    let doc = FakeDocument::uniform(4);
    let config = DetileConfig::builder(ws.input(), 2)
        .staging_root(ws.staging_root())
        .vertical_compensation(VerticalCompensation::legacy())
        .build()
        .unwrap();

    run(config, &doc).await.unwrap();

    assert_eq!(doc.draws(), vec![(0.0, 0.0), (10.0, 0.0), (0.0, 19.5), (10.0, 19.5)]);
}

#[tokio::test]
async fn scale_multiplies_tile_pixels() {
    let ws = Workspace::new();
    let doc = FakeDocument::uniform(2);
    let config = DetileConfig::builder(ws.input(), 2)
        .staging_root(ws.staging_root())
        .scale(3.0)
        .raster_format(RasterFormat::Jpeg { quality: 80 })
        .build()
        .unwrap();

    let out = run(config, &doc).await.unwrap();

    assert_eq!((out.stats.tile_width_px, out.stats.tile_height_px), (30, 60));
    assert_eq!(doc.calls()[0], Call::AddPage(60, 60));
    match &doc.calls()[1] {
        Call::Draw(path, _, _, width, _) => {
            assert_eq!(*width, 30);
            assert_eq!(path.extension().unwrap(), "jpeg");
        }
        other => panic!("unexpected call: {other:?}"),
    }
}

// ── Progress ordering ────────────────────────────────────────────────────────

#[tokio::test]
async fn progress_is_strictly_ordered() {
    let ws = Workspace::new();
    let doc = FakeDocument::uniform(5);

    let events = run_events(ws.config(2), &doc).await;

    let progress = progress_of(&events);
    assert_eq!(progress.len(), 15);
    for (chunk, step) in progress
        .chunks(5)
        .zip([Step::Extract, Step::Rasterize, Step::Composite])
    {
        let completed: Vec<_> = chunk.iter().map(|p| p.completed).collect();
        assert_eq!(completed, vec![1, 2, 3, 4, 5]);
        assert!(chunk.iter().all(|p| p.step == step && p.total == 5));
    }

    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(matches!(events.last(), Some(PipelineEvent::Completed(_))));
}

#[tokio::test]
async fn progress_survives_a_tiny_buffer() {
    let ws = Workspace::new();
    let doc = FakeDocument::uniform(8);
    let config = DetileConfig::builder(ws.input(), 4)
        .staging_root(ws.staging_root())
        .event_buffer(1)
        .build()
        .unwrap();

    let events = run_events(config, &doc).await;

    assert_eq!(progress_of(&events).len(), 24);
    assert!(matches!(events.last(), Some(PipelineEvent::Completed(_))));
}

#[tokio::test]
async fn stream_ends_with_terminal_event() {
    let ws = Workspace::new();
    let doc = FakeDocument::uniform(3);
    let doc2 = doc.clone();

    let events: Vec<_> = Pipeline::new(ws.config(3))
        .start_with(move || Ok(FakeBackend(doc2)))
        .into_stream()
        .collect()
        .await;

    assert_eq!(events.len(), 10);
    assert!(events[..9].iter().all(|e| !e.is_terminal()));
    assert!(matches!(events[9], PipelineEvent::Completed(_)));
}

// ── Staging cleanup ──────────────────────────────────────────────────────────

#[tokio::test]
async fn staging_purged_after_success() {
    let ws = Workspace::new();
    let doc = FakeDocument::uniform(4);

    run(ws.config(2), &doc).await.unwrap();

    assert_eq!(ws.staging_entries(), 0);
}

#[tokio::test]
async fn staging_purged_after_raster_failure() {
    let ws = Workspace::new();
    let doc = FakeDocument {
        fail_raster_at: Some(2),
        ..FakeDocument::uniform(5)
    };

    let events = run_events(ws.config(2), &doc).await;

    match events.last() {
        Some(PipelineEvent::Failed(DetileError::RasterisationFailed { page, detail })) => {
            assert_eq!(*page, 3);
            assert!(detail.contains("content stream"));
        }
        other => panic!("unexpected terminal event: {other:?}"),
    }
    // Two pages were rendered before the failure, and the run stopped there.
    let rendered = progress_of(&events)
        .iter()
        .filter(|p| p.step == Step::Rasterize)
        .count();
    assert_eq!(rendered, 2);
    assert!(doc.calls().is_empty());
    assert_eq!(ws.staging_entries(), 0);
    assert!(!ws.output().exists());
}

#[tokio::test]
async fn staging_purged_after_composition_failure() {
    let ws = Workspace::new();
    let doc = FakeDocument {
        fail_finalize: true,
        ..FakeDocument::uniform(4)
    };

    let err = run(ws.config(2), &doc).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Composition);
    assert_eq!(ws.staging_entries(), 0);
    assert!(!ws.output().exists());
}

#[tokio::test]
async fn cleanup_failure_keeps_written_output() {
    let ws = Workspace::new();
    let doc = FakeDocument {
        block_staging_cleanup: true,
        ..FakeDocument::uniform(4)
    };

    let events = run_events(ws.config(2), &doc).await;

    match events.last() {
        Some(PipelineEvent::Completed(output)) => assert_eq!(output.output_path, ws.output()),
        other => panic!("unexpected terminal event: {other:?}"),
    }
    assert!(ws.output().is_file());
    assert!(matches!(doc.calls().last(), Some(Call::Finalize(_))));
}

#[tokio::test]
async fn unrelated_files_in_staging_root_survive() {
    let ws = Workspace::new();
    let keep = ws.staging_root().join("notes.txt");
    std::fs::write(&keep, "mine").unwrap();
    let doc = FakeDocument::uniform(2);

    run(ws.config(2), &doc).await.unwrap();

    assert!(keep.is_file());
    assert_eq!(ws.staging_entries(), 1);
}

#[tokio::test]
async fn concurrent_runs_do_not_collide() {
    let ws = Workspace::new();
    let other_input = ws.dir.path().join("other.pdf");
    std::fs::copy(ws.input(), &other_input).unwrap();
    let doc_a = FakeDocument::uniform(6);
    let doc_b = FakeDocument::uniform(6);
    let config_b = DetileConfig::builder(&other_input, 3)
        .staging_root(ws.staging_root())
        .build()
        .unwrap();

    let (a, b) = tokio::join!(run(ws.config(2), &doc_a), run(config_b, &doc_b));

    assert!(a.unwrap().output_path.is_file());
    assert!(b.unwrap().output_path.is_file());
    assert_eq!(ws.staging_entries(), 0);
}

// ── Input errors ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_input_creates_nothing() {
    let ws = Workspace::new();
    let doc = FakeDocument::uniform(3);
    let config = DetileConfig::builder(ws.dir.path().join("absent.pdf"), 3)
        .staging_root(ws.staging_root())
        .build()
        .unwrap();

    let events = run_events(config, &doc).await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        PipelineEvent::Failed(e) => {
            assert!(matches!(e, DetileError::FileNotFound { .. }));
            assert_eq!(e.kind(), ErrorKind::Input);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(ws.staging_entries(), 0);
    assert!(!ws.dir.path().join("absent_detiled.pdf").exists());
}

#[tokio::test]
async fn wrong_extension_rejected() {
    let ws = Workspace::new();
    let txt = ws.dir.path().join("tiles.txt");
    std::fs::write(&txt, b"%PDF-1.7\n").unwrap();
    let config = DetileConfig::builder(&txt, 2)
        .staging_root(ws.staging_root())
        .build()
        .unwrap();

    let err = run(config, &FakeDocument::uniform(2)).await.unwrap_err();

    assert!(matches!(err, DetileError::WrongExtension { .. }));
    assert_eq!(ws.staging_entries(), 0);
}

#[tokio::test]
async fn mismatched_tiles_rejected_before_staging() {
    let ws = Workspace::new();
    let doc = FakeDocument {
        pages: vec![(10.0, 20.0), (10.0, 20.0), (20.0, 10.0)],
        ..FakeDocument::default()
    };

    let err = run(ws.config(3), &doc).await.unwrap_err();

    match err {
        DetileError::MismatchedPageSize { page, .. } => assert_eq!(page, 3),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(ws.staging_entries(), 0);
    assert!(doc.calls().is_empty());
}

#[tokio::test]
async fn empty_document_rejected() {
    let ws = Workspace::new();

    let err = run(ws.config(2), &FakeDocument::default()).await.unwrap_err();

    assert!(matches!(err, DetileError::EmptyDocument { .. }));
    assert_eq!(ws.staging_entries(), 0);
}

#[tokio::test]
async fn backend_bind_failure_is_terminal() {
    let ws = Workspace::new();

    let err = Pipeline::new(ws.config(2))
        .start_with(|| -> Result<FakeBackend, DetileError> {
            Err(DetileError::PdfiumBindingFailed("no library".into()))
        })
        .wait()
        .await
        .unwrap_err();

    assert!(matches!(err, DetileError::PdfiumBindingFailed(_)));
    assert_eq!(ws.staging_entries(), 0);
}

// ── Wire protocol and inspection ─────────────────────────────────────────────

#[tokio::test]
async fn wire_messages_for_a_run() {
    let ws = Workspace::new();
    let doc = FakeDocument::uniform(2);

    let lines: Vec<String> = run_events(ws.config(2), &doc)
        .await
        .iter()
        .map(|e| serde_json::to_string(&e.to_wire()).unwrap())
        .collect();

    assert_eq!(lines[0], r#"{"step":1,"progress":1,"progressMax":2}"#);
    assert_eq!(lines[5], r#"{"step":3,"progress":2,"progressMax":2}"#);
    let last: WireMessage = serde_json::from_str(&lines[6]).unwrap();
    assert_eq!(
        last,
        WireMessage::Complete {
            output_path: ws.output()
        }
    );
}

#[tokio::test]
async fn inspect_reports_grid_inputs() {
    let ws = Workspace::new();
    let doc = FakeDocument::uniform(7);

    let summary = inspect_with(ws.input(), None, move || Ok(FakeBackend(doc)))
        .await
        .unwrap();

    assert_eq!(summary.page_count, 7);
    assert!(summary.uniform);
    assert_eq!(summary.grid(3), (3, 3));
    assert_eq!(ws.staging_entries(), 0);
}
