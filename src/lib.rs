//! # pdf-detile
//!
//! Reassemble a drawing that was printed across a grid of pages back into
//! one oversized PDF page.
//!
//! ## Why this crate?
//!
//! Large-format plans and posters are often distributed as "tiled" PDFs:
//! the drawing is cut into letter-sized pieces, one per page, so it can be
//! printed at home. Viewing or plotting the whole drawing again means
//! putting those pieces back in their grid. Given the column count, this
//! crate renders every page and lays the pieces out row by row on a single
//! page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! tiled PDF (N pages)
//!  │
//!  ├─ 0. Input      check extension and %PDF magic, open via pdfium
//!  ├─ 1. Extract    per-page size, uniform-size check, grid geometry
//!  ├─ 2. Rasterize  each page → staged PNG/JPEG (spawn_blocking worker)
//!  ├─ 3. Composite  one C×R canvas page, one image object per tile
//!  └─ 4. Cleanup    staging purged, then Completed / Failed
//! ```
//!
//! Progress for steps 1–3 arrives over a bounded channel as
//! [`PipelineEvent`]s; see [`progress`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_detile::{detile, DetileConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DetileConfig::builder("house-plans.pdf", 4).build()?;
//!     let output = detile(config).await?;
//!     eprintln!("{} pages → {}×{} grid in {}",
//!         output.stats.page_count,
//!         output.stats.columns,
//!         output.stats.rows,
//!         output.output_path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `detile` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf-detile = { version = "0.3", default-features = false }
//! ```
//!
//! ## pdfium
//!
//! The default backend binds to pdfium at run time: `PDFIUM_LIB_PATH` if
//! set, then a library in the working directory, then the system library.
//! Nothing else in the pipeline depends on pdfium; implement
//! [`pipeline::source::Backend`] and call [`Pipeline::start_with`] to use
//! another engine.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod detile;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod staging;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    DetileConfig, DetileConfigBuilder, DetileRequest, RasterFormat, VerticalCompensation,
};
pub use detile::{
    detile, detile_sync, inspect, inspect_with, EventStream, Pipeline, PipelineHandle,
};
pub use error::{DetileError, ErrorKind};
pub use output::{DetileOutput, DetileStats, DocumentSummary};
pub use progress::{PipelineEvent, ProgressEvent, Step, WireMessage};
pub use stream::detile_stream;
