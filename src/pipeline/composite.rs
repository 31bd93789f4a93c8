//! Compositing: draw every staged tile onto one output page.
//!
//! The compositor owns placement; the [`DocumentAssembler`] owns the output
//! format. The assembler sees one `add_page` for the whole canvas, one
//! `draw_image` per tile in page order, then `finalize`. It is never asked
//! for a second page, and tiles are never drawn out of order.

use crate::error::DetileError;
use crate::pipeline::grid::GridLayout;
use crate::pipeline::render::RasterArtifact;
use crate::progress::{ProgressReporter, Step};
use std::path::Path;
use tracing::{debug, info};

/// Writes the composite document. Coordinates are pixels from the top-left
/// of the page.
pub trait DocumentAssembler {
    /// Add the (only) page, `width_px` × `height_px`.
    fn add_page(&mut self, width_px: u32, height_px: u32) -> Result<(), DetileError>;

    /// Draw the raster at `path` with its top-left corner at `(x_px, y_px)`,
    /// scaled to `width_px` wide with its aspect ratio preserved.
    fn draw_image(&mut self, path: &Path, x_px: f32, y_px: f32, width_px: u32)
        -> Result<(), DetileError>;

    /// Write the finished document to `output_path`. Either the whole file
    /// appears there or nothing does.
    fn finalize(self: Box<Self>, output_path: &Path) -> Result<(), DetileError>;
}

/// Places rasters on the grid and streams them into an assembler.
pub struct GridCompositor<'a> {
    layout: &'a GridLayout,
}

impl<'a> GridCompositor<'a> {
    pub fn new(layout: &'a GridLayout) -> Self {
        Self { layout }
    }

    /// Draw `artifacts` (one per page, in page order) and finalize the
    /// output at `output_path`.
    pub(crate) fn composite(
        &self,
        mut assembler: Box<dyn DocumentAssembler + '_>,
        artifacts: &[RasterArtifact],
        output_path: &Path,
        progress: &mut ProgressReporter,
    ) -> Result<(), DetileError> {
        let layout = self.layout;
        if artifacts.len() != layout.page_count() {
            return Err(DetileError::Internal(format!(
                "{} rasters staged for {} pages",
                artifacts.len(),
                layout.page_count()
            )));
        }

        info!(
            "Compositing {} tiles onto a {}x{} px canvas ({} columns x {} rows)",
            layout.page_count(),
            layout.canvas_width(),
            layout.canvas_height(),
            layout.columns(),
            layout.rows()
        );
        assembler.add_page(layout.canvas_width(), layout.canvas_height())?;

        let total = artifacts.len();
        for (artifact, placement) in artifacts.iter().zip(layout.placements()) {
            if artifact.page_index != placement.index {
                return Err(DetileError::Internal(format!(
                    "raster for page {} arrived in slot {}",
                    artifact.page_index + 1,
                    placement.index + 1
                )));
            }
            assembler.draw_image(
                &artifact.file_path,
                placement.x_px,
                placement.y_px,
                layout.tile_width(),
            )?;
            debug!(
                "Placed page {} at row {}, column {} ({}, {})",
                placement.index + 1,
                placement.row,
                placement.column,
                placement.x_px,
                placement.y_px
            );
            progress.advance(Step::Composite, placement.index + 1, total);
        }

        assembler.finalize(output_path)?;
        info!("Wrote {}", output_path.display());
        Ok(())
    }
}
