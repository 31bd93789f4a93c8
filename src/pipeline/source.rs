//! The rendering-engine seam: how the pipeline sees a source document.
//!
//! The pipeline never talks to pdfium directly. It goes through three
//! traits, implemented for real by [`crate::pipeline::pdfium`] and by fakes
//! in the tests:
//!
//! * [`Backend`]: opens sources and creates output assemblers.
//! * [`DocumentSource`]: one open source: page count, per-page
//!   [`PageDescriptor`], and an opaque [`VectorSurface`] per page.
//! * [`crate::pipeline::composite::DocumentAssembler`]: writes the output.

use crate::error::DetileError;
use crate::pipeline::composite::DocumentAssembler;
use image::DynamicImage;
use std::path::Path;

/// Error type a [`VectorSurface`] may fail with.
pub type SurfaceError = Box<dyn std::error::Error + Send + Sync>;

/// Largest width/height difference, in document units, still treated as
/// the same tile size. Half a point absorbs rounding in PDF producers.
pub const SIZE_TOLERANCE_UNITS: f32 = 0.5;

/// Physical description of one source page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageDescriptor {
    /// 0-based position of the page in the source.
    pub source_index: usize,
    pub width_units: f32,
    pub height_units: f32,
    /// Document units per inch (72 for PDF points).
    pub unit_scale: f32,
}

impl PageDescriptor {
    pub fn width_inches(&self) -> f32 {
        self.width_units / self.unit_scale
    }

    pub fn height_inches(&self) -> f32 {
        self.height_units / self.unit_scale
    }

    fn same_size_as(&self, other: &PageDescriptor) -> bool {
        (self.width_units - other.width_units).abs() <= SIZE_TOLERANCE_UNITS
            && (self.height_units - other.height_units).abs() <= SIZE_TOLERANCE_UNITS
    }
}

/// Rasterisable content of one page. Only the rasteriser consumes it.
pub trait VectorSurface {
    /// Render the page `width_px` pixels wide, keeping its aspect ratio.
    fn rasterize(&self, width_px: u32) -> Result<DynamicImage, SurfaceError>;
}

/// One opened source document.
pub trait DocumentSource {
    fn page_count(&self) -> usize;

    fn descriptor(&self, index: usize) -> Result<PageDescriptor, DetileError>;

    fn surface(&self, index: usize) -> Result<Box<dyn VectorSurface + '_>, DetileError>;
}

/// Factory for sources and output assemblers.
///
/// A backend is created on the worker thread and never leaves it.
pub trait Backend {
    /// Open the source at `path`. Fails with an Input-category error.
    fn open<'a>(
        &'a self,
        path: &Path,
        password: Option<&'a str>,
    ) -> Result<Box<dyn DocumentSource + 'a>, DetileError>;

    /// Start a new, empty output document.
    fn new_assembler(&self) -> Result<Box<dyn DocumentAssembler + '_>, DetileError>;
}

/// Validated common size of every tile, in document units and pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileSize {
    pub width_units: f32,
    pub height_units: f32,
    pub width_px: u32,
    pub height_px: u32,
}

impl TileSize {
    /// Check that every descriptor matches the first and convert that size
    /// to pixels at `scale`.
    pub fn from_descriptors(
        descriptors: &[PageDescriptor],
        scale: f32,
    ) -> Result<Self, DetileError> {
        let first = descriptors
            .first()
            .ok_or_else(|| DetileError::Internal("no page descriptors".into()))?;

        if let Some(odd) = descriptors.iter().find(|d| !d.same_size_as(first)) {
            return Err(DetileError::MismatchedPageSize {
                page: odd.source_index + 1,
                expected_width: first.width_units,
                expected_height: first.height_units,
                found_width: odd.width_units,
                found_height: odd.height_units,
            });
        }

        Ok(Self {
            width_units: first.width_units,
            height_units: first.height_units,
            width_px: to_pixels(first.width_units, scale),
            height_px: to_pixels(first.height_units, scale),
        })
    }
}

/// `units * scale` rounded to whole pixels, never below one.
pub fn to_pixels(units: f32, scale: f32) -> u32 {
    let px = (units * scale).round();
    if px.is_finite() && px >= 1.0 {
        px.min(u32::MAX as f32) as u32
    } else {
        1
    }
}

/// Whether every descriptor shares the first one's size.
pub fn is_uniform(descriptors: &[PageDescriptor]) -> bool {
    match descriptors.first() {
        Some(first) => descriptors.iter().all(|d| d.same_size_as(first)),
        None => true,
    }
}
