//! Error types for the pdf-detile library.
//!
//! A detile run is single-attempt: any failure aborts the whole run and the
//! caller re-runs from scratch. There is therefore one fatal error type,
//! [`DetileError`], whose variants fall into the categories reported by
//! [`DetileError::kind`]:
//!
//! * **Usage**: the request itself is invalid (bad column count, bad scale).
//! * **Input**: the source cannot be read, is not a PDF, is password
//!   protected, or its tiles disagree on size. Raised before any staging
//!   directory exists.
//! * **Rasterization**: one page failed to render; the run is aborted.
//! * **Composition**: the composite page could not be assembled or written.
//! * **Staging**: the scratch directory could not be created or purged.
//!
//! Page numbers carried inside errors are 1-indexed, matching what a user
//! sees in a PDF viewer; everything else in the crate indexes from zero.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf-detile library.
#[derive(Debug, Error)]
pub enum DetileError {
    // ── Usage errors ──────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input path does not carry a `.pdf` extension.
    #[error("Input '{path}' is not a .pdf file")]
    WrongExtension { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf repaired.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// The PDF uses a feature (e.g. a security handler) the engine cannot open.
    #[error("PDF '{path}' uses an unsupported feature: {detail}")]
    UnsupportedPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The document has no pages to detile.
    #[error("PDF '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    /// A tile's dimensions differ from the first tile's. `page` is 1-indexed.
    #[error(
        "Page {page} is {found_width:.2}x{found_height:.2} units but the first page is \
{expected_width:.2}x{expected_height:.2}; all tiles must share one size"
    )]
    MismatchedPageSize {
        page: usize,
        expected_width: f32,
        expected_height: f32,
        found_width: f32,
        found_height: f32,
    },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Place libpdfium next to the executable, install it system-wide,\n\
or set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Rasterization errors ──────────────────────────────────────────────
    /// The rendering engine failed for a specific page. `page` is 1-indexed.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Composition errors ────────────────────────────────────────────────
    /// The composite canvas would exceed addressable pixel dimensions.
    #[error("Composite canvas too large: {columns} columns x {rows} rows of {tile_width}x{tile_height} px")]
    CanvasTooLarge {
        columns: usize,
        rows: usize,
        tile_width: u32,
        tile_height: u32,
    },

    /// The document assembler rejected a page or image.
    #[error("Composition failed: {detail}")]
    CompositionFailed { detail: String },

    /// Could not create or write the output PDF.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Staging errors ────────────────────────────────────────────────────
    /// The staging directory could not be created, listed, or purged.
    #[error("Staging area '{path}' failed: {source}")]
    StagingFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error category a [`DetileError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Usage,
    Input,
    Rasterization,
    Composition,
    Staging,
    Internal,
}

impl ErrorKind {
    /// Process exit code for this category: `2` for usage errors, `1` otherwise.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Usage => 2,
            _ => 1,
        }
    }
}

impl DetileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DetileError::InvalidConfig(_) => ErrorKind::Usage,
            DetileError::FileNotFound { .. }
            | DetileError::PermissionDenied { .. }
            | DetileError::WrongExtension { .. }
            | DetileError::NotAPdf { .. }
            | DetileError::CorruptPdf { .. }
            | DetileError::UnsupportedPdf { .. }
            | DetileError::PasswordRequired { .. }
            | DetileError::WrongPassword { .. }
            | DetileError::EmptyDocument { .. }
            | DetileError::MismatchedPageSize { .. }
            | DetileError::PdfiumBindingFailed(_) => ErrorKind::Input,
            DetileError::RasterisationFailed { .. } => ErrorKind::Rasterization,
            DetileError::CanvasTooLarge { .. }
            | DetileError::CompositionFailed { .. }
            | DetileError::OutputWriteFailed { .. } => ErrorKind::Composition,
            DetileError::StagingFailed { .. } => ErrorKind::Staging,
            DetileError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand for [`DetileError::CompositionFailed`], for assembler implementations.
    pub fn composition(detail: impl Into<String>) -> Self {
        DetileError::CompositionFailed {
            detail: detail.into(),
        }
    }
}
