//! Page rasterisation: render each tile into the staging area.
//!
//! Pages are rendered strictly in index order, one at a time. Each raster is
//! written and fsynced before its progress event goes out, so an observer
//! that sees `(2, k, n)` knows `k` artifacts are durably on disk.
//!
//! ## Why stage on disk?
//!
//! A tile rendered at a useful scale is tens of megabytes of RGBA. Holding
//! every tile of a large grid in memory until compositing would make peak
//! memory grow with the page count; staging keeps it at one tile.

use crate::config::RasterFormat;
use crate::error::DetileError;
use crate::pipeline::source::DocumentSource;
use crate::progress::{ProgressReporter, Step};
use crate::staging::StagingArea;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A staged raster of one page, consumed once by the compositor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterArtifact {
    pub page_index: usize,
    /// Lives inside the run's staging area.
    pub file_path: PathBuf,
    pub pixel_width: u32,
}

/// Renders every page of a source into a staging area.
pub struct PageRasterizer<'a> {
    staging: &'a StagingArea,
    format: RasterFormat,
    width_px: u32,
}

impl<'a> PageRasterizer<'a> {
    /// Rasteriser writing `format` files `width_px` wide into `staging`.
    pub fn new(staging: &'a StagingArea, format: RasterFormat, width_px: u32) -> Self {
        Self {
            staging,
            format,
            width_px,
        }
    }

    /// Render pages `0..page_count` in order. The first failing page aborts
    /// the whole run.
    pub(crate) fn rasterize_all(
        &self,
        source: &dyn DocumentSource,
        progress: &mut ProgressReporter,
    ) -> Result<Vec<RasterArtifact>, DetileError> {
        let total = source.page_count();
        let mut artifacts = Vec::with_capacity(total);
        for index in 0..total {
            artifacts.push(self.rasterize_page(source, index)?);
            progress.advance(Step::Rasterize, index + 1, total);
        }
        Ok(artifacts)
    }

    /// Render one page and write it to its staging path.
    pub fn rasterize_page(
        &self,
        source: &dyn DocumentSource,
        index: usize,
    ) -> Result<RasterArtifact, DetileError> {
        let failed = |detail: String| DetileError::RasterisationFailed {
            page: index + 1,
            detail,
        };

        let surface = source.surface(index)?;
        let image = surface
            .rasterize(self.width_px)
            .map_err(|e| failed(e.to_string()))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(failed("engine returned an empty bitmap".into()));
        }

        let file_path = self.staging.artifact_path(index, self.format);
        write_durably(&image, &file_path, self.format)
            .map_err(|e| failed(format!("writing {}: {e}", file_path.display())))?;

        debug!(
            "Rendered page {} → {}x{} px ({})",
            index + 1,
            image.width(),
            image.height(),
            file_path.display()
        );

        Ok(RasterArtifact {
            page_index: index,
            file_path,
            pixel_width: image.width(),
        })
    }
}

/// Encode `image` to `path` and fsync it.
fn write_durably(
    image: &DynamicImage,
    path: &Path,
    format: RasterFormat,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut writer = BufWriter::new(File::create(path)?);
    match format {
        RasterFormat::Png => image.write_to(&mut writer, ImageFormat::Png)?,
        RasterFormat::Jpeg { quality } => {
            // JPEG has no alpha channel; pdfium bitmaps are RGBA.
            let rgb = image.to_rgb8();
            JpegEncoder::new_with_quality(&mut writer, quality).encode_image(&rgb)?;
        }
    }
    writer.flush()?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(())
}
