//! Staging area: the scratch directory holding per-page rasters during a run.
//!
//! Each run gets its own directory (see [`StagingArea::for_run`]), so two
//! runs in parallel never see each other's artifacts. Only files matching the
//! artifact naming convention (`tile-NNNNN.png` / `tile-NNNNN.jpeg`) are
//! ever listed or deleted; anything else found in the directory is left
//! alone, and the directory itself is removed only once it is empty.
//!
//! [`StagingArea`] purges on drop as a last resort (e.g. a panic mid-run);
//! the pipeline calls [`StagingArea::purge`] explicitly on every exit path so
//! cleanup failures can be reported.

use crate::config::RasterFormat;
use crate::error::DetileError;
use std::path::{Path, PathBuf};
use std::{fs, io};
use tracing::{debug, warn};

const ARTIFACT_PREFIX: &str = "tile-";
const ARTIFACT_EXTENSIONS: [&str; 2] = ["png", "jpeg"];
const RUN_DIR_PREFIX: &str = "detile-";

/// Staged file name for page `index`.
pub fn artifact_name(index: usize, format: RasterFormat) -> String {
    format!("{ARTIFACT_PREFIX}{index:05}.{}", format.extension())
}

/// Whether `name` follows the artifact naming convention.
pub fn is_artifact_name(name: &str) -> bool {
    let Some(rest) = name.strip_prefix(ARTIFACT_PREFIX) else {
        return false;
    };
    let Some((index, ext)) = rest.split_once('.') else {
        return false;
    };
    !index.is_empty()
        && index.bytes().all(|b| b.is_ascii_digit())
        && ARTIFACT_EXTENSIONS.contains(&ext)
}

/// A staging directory owned by one run.
#[derive(Debug)]
pub struct StagingArea {
    dir: PathBuf,
    purged: bool,
}

impl StagingArea {
    /// Create `dir` (and its parents) if absent.
    ///
    /// Idempotent: an existing directory, including one with unrelated
    /// files in it, is adopted as-is.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, DetileError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| DetileError::StagingFailed {
            path: dir.clone(),
            source,
        })?;
        debug!("Staging area ready: {}", dir.display());
        Ok(Self { dir, purged: false })
    }

    /// Create a fresh directory under `root` that no other run can share.
    ///
    /// The name is picked and created exclusively by `tempfile`, which
    /// retries on collision; `root` is created if absent. Deletion stays
    /// with [`StagingArea::purge`].
    pub fn for_run(root: &Path) -> Result<Self, DetileError> {
        let staging_err = |source: io::Error| DetileError::StagingFailed {
            path: root.to_path_buf(),
            source,
        };
        fs::create_dir_all(root).map_err(staging_err)?;
        let dir = tempfile::Builder::new()
            .prefix(RUN_DIR_PREFIX)
            .tempdir_in(root)
            .map_err(staging_err)?
            .keep();
        debug!("Run staging area ready: {}", dir.display());
        Ok(Self { dir, purged: false })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Path at which page `index` is staged.
    pub fn artifact_path(&self, index: usize, format: RasterFormat) -> PathBuf {
        self.dir.join(artifact_name(index, format))
    }

    /// Artifacts currently in the directory, sorted by name.
    pub fn list_artifacts(&self) -> Result<Vec<PathBuf>, DetileError> {
        list_artifacts(&self.dir)
    }

    /// Delete every artifact, then remove the directory if nothing else is
    /// left in it.
    pub fn purge(mut self) -> Result<(), DetileError> {
        self.purged = true;
        purge(&self.dir)
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if !self.purged {
            if let Err(e) = purge(&self.dir) {
                warn!("Failed to purge staging area on drop: {}", e);
            }
        }
    }
}

/// Files in `dir` that follow the artifact naming convention, sorted.
pub fn list_artifacts(dir: &Path) -> Result<Vec<PathBuf>, DetileError> {
    let staging_err = |source: io::Error| DetileError::StagingFailed {
        path: dir.to_path_buf(),
        source,
    };
    let mut artifacts = Vec::new();
    for entry in fs::read_dir(dir).map_err(staging_err)? {
        let entry = entry.map_err(staging_err)?;
        let name = entry.file_name();
        let is_match = name.to_str().is_some_and(is_artifact_name);
        if is_match && entry.file_type().map_err(staging_err)?.is_file() {
            artifacts.push(entry.path());
        }
    }
    artifacts.sort();
    Ok(artifacts)
}

/// Delete the artifacts in `dir`, then `dir` itself if it is now empty.
///
/// A missing directory counts as already purged.
pub fn purge(dir: &Path) -> Result<(), DetileError> {
    if !dir.exists() {
        return Ok(());
    }
    let artifacts = list_artifacts(dir)?;
    for path in &artifacts {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(DetileError::StagingFailed {
                    path: path.clone(),
                    source,
                })
            }
        }
    }

    let is_empty = fs::read_dir(dir)
        .map_err(|source| DetileError::StagingFailed {
            path: dir.to_path_buf(),
            source,
        })?
        .next()
        .is_none();
    if is_empty {
        fs::remove_dir(dir).map_err(|source| DetileError::StagingFailed {
            path: dir.to_path_buf(),
            source,
        })?;
        debug!(
            "Purged staging area {} ({} artifacts)",
            dir.display(),
            artifacts.len()
        );
    } else {
        debug!(
            "Staging area {} kept: holds files not produced by this run",
            dir.display()
        );
    }
    Ok(())
}
