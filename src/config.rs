//! Configuration types for a detile run.
//!
//! All run behaviour is controlled through [`DetileConfig`], built via its
//! [`DetileConfigBuilder`]. A config is immutable once built and is moved
//! into exactly one [`crate::Pipeline`], which owns it for the duration of
//! the run.

use crate::error::DetileError;
use crate::pipeline::input::default_output_path;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for one detile run.
///
/// # Example
/// ```rust
/// use pdf_detile::{DetileConfig, RasterFormat};
///
/// let config = DetileConfig::builder("poster.pdf", 3)
///     .scale(2.0)
///     .raster_format(RasterFormat::Jpeg { quality: 90 })
///     .build()
///     .unwrap();
/// assert_eq!(config.output_path.file_name().unwrap(), "poster_detiled.pdf");
/// ```
#[derive(Debug, Clone)]
pub struct DetileConfig {
    /// Source PDF whose pages are the tiles.
    pub input_path: PathBuf,

    /// Number of tiles per row of the original grid. Must be ≥ 1.
    pub columns: usize,

    /// Pixels per document unit when rasterising. Default: 1.0.
    ///
    /// PDF pages are measured in points (1/72 in), so 1.0 renders at 72 DPI
    /// and 4.0 at 288 DPI. The composite page size grows linearly with it.
    pub scale: f32,

    /// Where the composite PDF is written. Default: `<stem>_detiled.pdf`
    /// beside the input.
    pub output_path: PathBuf,

    /// Per-row vertical shift applied while compositing. Default: none.
    pub vertical_compensation: VerticalCompensation,

    /// Image format of the staged per-page rasters. Default: PNG.
    pub raster_format: RasterFormat,

    /// Directory under which the per-run staging directory is created.
    /// Default: the OS temp directory.
    pub staging_root: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Capacity of the bounded progress channel. Default: 32.
    ///
    /// The worker blocks when the observer falls this many events behind;
    /// events are never dropped or coalesced.
    pub event_buffer: usize,
}

impl DetileConfig {
    /// Create a builder for detiling `input` into `columns` columns.
    pub fn builder(input: impl Into<PathBuf>, columns: usize) -> DetileConfigBuilder {
        let input_path = input.into();
        DetileConfigBuilder {
            config: Self {
                output_path: default_output_path(&input_path),
                input_path,
                columns,
                scale: 1.0,
                vertical_compensation: VerticalCompensation::default(),
                raster_format: RasterFormat::default(),
                staging_root: None,
                password: None,
                event_buffer: 32,
            },
        }
    }

    /// The directory under which this run's staging directory lives.
    pub fn staging_root(&self) -> PathBuf {
        self.staging_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Builder for [`DetileConfig`].
#[derive(Debug)]
pub struct DetileConfigBuilder {
    config: DetileConfig,
}

impl DetileConfigBuilder {
    pub fn scale(mut self, scale: f32) -> Self {
        self.config.scale = scale;
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_path = path.into();
        self
    }

    pub fn vertical_compensation(mut self, compensation: VerticalCompensation) -> Self {
        self.config.vertical_compensation = compensation;
        self
    }

    pub fn raster_format(mut self, format: RasterFormat) -> Self {
        self.config.raster_format = format;
        self
    }

    pub fn staging_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_root = Some(dir.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn event_buffer(mut self, n: usize) -> Self {
        self.config.event_buffer = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DetileConfig, DetileError> {
        let c = &self.config;
        if c.columns == 0 {
            return Err(DetileError::InvalidConfig(
                "Column count must be ≥ 1".into(),
            ));
        }
        if !c.scale.is_finite() || c.scale <= 0.0 {
            return Err(DetileError::InvalidConfig(format!(
                "Scale must be a positive number, got {}",
                c.scale
            )));
        }
        if c.event_buffer == 0 {
            return Err(DetileError::InvalidConfig(
                "Event buffer must be ≥ 1".into(),
            ));
        }
        if let VerticalCompensation::Linear { px_per_row } = c.vertical_compensation {
            if !px_per_row.is_finite() {
                return Err(DetileError::InvalidConfig(format!(
                    "Row compensation must be finite, got {px_per_row}"
                )));
            }
        }
        if let RasterFormat::Jpeg { quality } = c.raster_format {
            if !(1..=100).contains(&quality) {
                return Err(DetileError::InvalidConfig(format!(
                    "JPEG quality must be 1–100, got {quality}"
                )));
            }
        }
        if resolved(&c.output_path) == resolved(&c.input_path) {
            return Err(DetileError::InvalidConfig(format!(
                "Output path {} would overwrite the input",
                c.output_path.display()
            )));
        }
        Ok(self.config)
    }
}

/// `path` with its parent directory canonicalised, so `a.pdf`, `./a.pdf`
/// and `dir/../a.pdf` compare equal even when the file does not exist yet.
fn resolved(path: &Path) -> PathBuf {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let parent = parent
        .canonicalize()
        .unwrap_or_else(|_| parent.to_path_buf());
    match path.file_name() {
        Some(name) => parent.join(name),
        None => path.to_path_buf(),
    }
}

// ── Interactive request ──────────────────────────────────────────────────

/// A "file selected" request from an interactive front end: a dropped or
/// picked file plus the column count typed next to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetileRequest {
    pub path: PathBuf,
    pub columns: usize,
}

impl DetileRequest {
    pub fn new(path: impl AsRef<Path>, columns: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            columns,
        }
    }

    /// Turn the request into a validated config with default settings.
    pub fn into_config(self) -> Result<DetileConfig, DetileError> {
        DetileConfig::builder(self.path, self.columns).build()
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Vertical adjustment subtracted from each tile's y offset, per grid row.
///
/// Some printed tile sets overlap by a hair between rows. Older detilers
/// silently pulled every row up by `row / 2` pixels; here that shift
/// is opt-in via [`VerticalCompensation::legacy`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalCompensation {
    /// Rows are stacked exactly `tile height` apart. (default)
    #[default]
    None,
    /// Row `r` is shifted up by `r * px_per_row` pixels.
    Linear { px_per_row: f32 },
}

impl VerticalCompensation {
    /// Half a pixel per row, as older detilers applied unconditionally.
    pub fn legacy() -> Self {
        VerticalCompensation::Linear { px_per_row: 0.5 }
    }

    /// Pixels subtracted from the y offset of tiles in `row`.
    pub fn offset_for_row(&self, row: usize) -> f32 {
        match self {
            VerticalCompensation::None => 0.0,
            VerticalCompensation::Linear { px_per_row } => row as f32 * px_per_row,
        }
    }
}

/// File format of the staged per-page rasters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RasterFormat {
    /// Lossless; keeps line work crisp. (default)
    #[default]
    Png,
    /// Smaller staging files at the cost of compression artefacts.
    Jpeg { quality: u8 },
}

impl RasterFormat {
    /// File extension used for staged artifacts of this format.
    pub fn extension(&self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpeg { .. } => "jpeg",
        }
    }
}
