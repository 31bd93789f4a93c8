//! pdfium-backed implementation of the rendering-engine seam.
//!
//! One pdfium binding does both jobs: it opens and rasterises the tiled
//! source, and it creates the composite output document.
//!
//! ## Threading
//!
//! pdfium keeps thread-local state and is not async-safe. The pipeline
//! therefore constructs the backend inside its `spawn_blocking` worker and
//! drops it there; nothing in this module crosses threads.
//!
//! ## Coordinates
//!
//! The compositor places tiles from the top-left; PDF user space grows up
//! from the bottom-left. [`PdfiumAssembler::draw_image`] flips y.

use crate::error::DetileError;
use crate::pipeline::composite::DocumentAssembler;
use crate::pipeline::source::{Backend, DocumentSource, PageDescriptor, SurfaceError, VectorSurface};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// PDF user space is measured in points.
const POINTS_PER_INCH: f32 = 72.0;

/// Rendering engine and document assembler backed by pdfium.
pub struct PdfiumBackend {
    pdfium: Pdfium,
}

impl PdfiumBackend {
    /// Bind to pdfium: `PDFIUM_LIB_PATH` if set, else a library in the
    /// working directory, else the system library.
    pub fn bind() -> Result<Self, DetileError> {
        let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
            Some(path) => Pdfium::bind_to_library(PathBuf::from(path)),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| DetileError::PdfiumBindingFailed(format!("{:?}", e)))?;

        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl Backend for PdfiumBackend {
    fn open<'a>(
        &'a self,
        path: &Path,
        password: Option<&'a str>,
    ) -> Result<Box<dyn DocumentSource + 'a>, DetileError> {
        let document = self
            .pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| classify_load_error(path, password.is_some(), format!("{:?}", e)))?;
        info!("PDF loaded: {} pages", document.pages().len());
        Ok(Box::new(PdfiumSource {
            path: path.to_path_buf(),
            document,
        }))
    }

    fn new_assembler(&self) -> Result<Box<dyn DocumentAssembler + '_>, DetileError> {
        let document = self
            .pdfium
            .create_new_pdf()
            .map_err(|e| DetileError::composition(format!("creating output PDF: {:?}", e)))?;
        Ok(Box::new(PdfiumAssembler {
            document,
            page_height: None,
        }))
    }
}

/// pdfium reports load failures as a handful of internal codes; map the
/// ones a user can act on.
fn classify_load_error(path: &Path, had_password: bool, err_str: String) -> DetileError {
    let path = path.to_path_buf();
    if err_str.contains("Password") || err_str.contains("password") {
        if had_password {
            DetileError::WrongPassword { path }
        } else {
            DetileError::PasswordRequired { path }
        }
    } else if err_str.contains("Security") {
        DetileError::UnsupportedPdf {
            path,
            detail: err_str,
        }
    } else {
        DetileError::CorruptPdf {
            path,
            detail: err_str,
        }
    }
}

// ── Source ───────────────────────────────────────────────────────────────

struct PdfiumSource<'a> {
    path: PathBuf,
    document: PdfDocument<'a>,
}

impl PdfiumSource<'_> {
    fn page(&self, index: usize) -> Result<PdfPage<'_>, String> {
        let index = u16::try_from(index).map_err(|_| format!("page index {index} out of range"))?;
        self.document.pages().get(index).map_err(|e| format!("{:?}", e))
    }
}

impl DocumentSource for PdfiumSource<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn descriptor(&self, index: usize) -> Result<PageDescriptor, DetileError> {
        let page = self.page(index).map_err(|e| DetileError::CorruptPdf {
            path: self.path.clone(),
            detail: format!("page {}: {}", index + 1, e),
        })?;
        Ok(PageDescriptor {
            source_index: index,
            width_units: page.width().value,
            height_units: page.height().value,
            unit_scale: POINTS_PER_INCH,
        })
    }

    fn surface(&self, index: usize) -> Result<Box<dyn VectorSurface + '_>, DetileError> {
        let page = self
            .page(index)
            .map_err(|detail| DetileError::RasterisationFailed {
                page: index + 1,
                detail,
            })?;
        Ok(Box::new(PdfiumSurface { page }))
    }
}

struct PdfiumSurface<'a> {
    page: PdfPage<'a>,
}

impl VectorSurface for PdfiumSurface<'_> {
    fn rasterize(&self, width_px: u32) -> Result<DynamicImage, SurfaceError> {
        let width = i32::try_from(width_px)?;
        let render_config = PdfRenderConfig::new()
            .set_target_width(width)
            .render_form_data(true)
            .render_annotations(true);
        let bitmap = self
            .page
            .render_with_config(&render_config)
            .map_err(|e| format!("{:?}", e))?;
        Ok(bitmap.as_image())
    }
}

// ── Assembler ────────────────────────────────────────────────────────────

/// Builds the composite PDF: one custom-size page with one image object per
/// tile. One canvas pixel is one PDF point.
pub struct PdfiumAssembler<'a> {
    document: PdfDocument<'a>,
    page_height: Option<f32>,
}

impl DocumentAssembler for PdfiumAssembler<'_> {
    fn add_page(&mut self, width_px: u32, height_px: u32) -> Result<(), DetileError> {
        if self.page_height.is_some() {
            return Err(DetileError::composition("output already has its page"));
        }
        self.document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(
                PdfPoints::new(width_px as f32),
                PdfPoints::new(height_px as f32),
            ))
            .map_err(|e| DetileError::composition(format!("adding page: {:?}", e)))?;
        self.page_height = Some(height_px as f32);
        debug!("Output page {}x{} pt", width_px, height_px);
        Ok(())
    }

    fn draw_image(
        &mut self,
        path: &Path,
        x_px: f32,
        y_px: f32,
        width_px: u32,
    ) -> Result<(), DetileError> {
        let page_height = self
            .page_height
            .ok_or_else(|| DetileError::composition("draw_image before add_page"))?;
        let image = image::open(path).map_err(|e| {
            DetileError::composition(format!("reading {}: {}", path.display(), e))
        })?;

        let width = width_px as f32;
        let height = image.height() as f32 * width / image.width().max(1) as f32;
        let bottom = page_height - y_px - height;

        let mut page = self
            .document
            .pages()
            .last()
            .map_err(|e| DetileError::composition(format!("{:?}", e)))?;
        page.objects_mut()
            .create_image_object(
                PdfPoints::new(x_px),
                PdfPoints::new(bottom),
                &image,
                Some(PdfPoints::new(width)),
                Some(PdfPoints::new(height)),
            )
            .map_err(|e| {
                DetileError::composition(format!("placing {}: {:?}", path.display(), e))
            })?;
        Ok(())
    }

    fn finalize(self: Box<Self>, output_path: &Path) -> Result<(), DetileError> {
        if self.page_height.is_none() {
            return Err(DetileError::composition("finalize before add_page"));
        }
        let write_err = |source: io::Error| DetileError::OutputWriteFailed {
            path: output_path.to_path_buf(),
            source,
        };

        let parent = match output_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(write_err)?;

        // Write beside the target and rename into place; a failure before the
        // rename drops (and deletes) the temp file.
        let mut tmp = tempfile::Builder::new()
            .prefix(".detile-")
            .suffix(".pdf.tmp")
            .tempfile_in(parent)
            .map_err(write_err)?;
        self.document
            .save_to_writer(tmp.as_file_mut())
            .map_err(|e| DetileError::composition(format!("serialising output: {:?}", e)))?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(output_path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}
