//! Input resolution: validate the user-supplied source path before any work.
//!
//! Every check here runs before the staging directory exists, so a bad
//! input never leaves anything behind on disk. We validate the PDF magic
//! bytes (`%PDF`) up front so callers get a meaningful error rather than an
//! opaque rendering-engine failure.

use crate::error::DetileError;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Check that `path` names a readable `.pdf` file with a PDF header.
pub fn resolve_input(path: &Path) -> Result<PathBuf, DetileError> {
    if !has_pdf_extension(path) {
        return Err(DetileError::WrongExtension {
            path: path.to_path_buf(),
        });
    }

    if !path.is_file() {
        return Err(DetileError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match File::open(path) {
        Ok(f) => {
            let mut head = Vec::with_capacity(4);
            f.take(4)
                .read_to_end(&mut head)
                .map_err(|e| DetileError::CorruptPdf {
                    path: path.to_path_buf(),
                    detail: e.to_string(),
                })?;
            if head != b"%PDF" {
                // Short files are zero-padded.
                let mut magic = [0u8; 4];
                magic[..head.len()].copy_from_slice(&head);
                return Err(DetileError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Err(DetileError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(DetileError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path.to_path_buf())
}

/// Case-insensitive `.pdf` extension check.
pub fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// `<dir>/<stem>_detiled.pdf` for an input at `<dir>/<stem>.pdf`.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}_detiled.pdf"))
}
