//! Pipeline stages for reassembling a tiled PDF.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and the rendering backend can be swapped without
//! touching the placement math.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ source ──▶ render ──▶ grid ──▶ composite
//! (path)   (pages)    (staging)  (math)   (one page)
//! ```
//!
//! 1. [`input`]:     validate the user-supplied path before any work
//! 2. [`source`]:    the rendering-engine seam: descriptors and surfaces
//! 3. [`render`]:    rasterise each page into the staging area, in order
//! 4. [`grid`]:      pure row/column/pixel placement for every tile
//! 5. [`composite`]: draw the staged rasters onto one output page
//!
//! [`pdfium`] implements the [`source::Backend`] seam with pdfium-render.

pub mod composite;
pub mod grid;
pub mod input;
pub mod pdfium;
pub mod render;
pub mod source;
