//! Result types returned by a finished run and by [`crate::inspect`].

use crate::pipeline::grid::GridLayout;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Terminal value of a successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetileOutput {
    /// The single composite PDF written by the run.
    pub output_path: PathBuf,
    pub stats: DetileStats,
}

/// Geometry and timing of a finished run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetileStats {
    pub page_count: usize,
    pub columns: usize,
    pub rows: usize,
    pub tile_width_px: u32,
    pub tile_height_px: u32,
    pub canvas_width_px: u32,
    pub canvas_height_px: u32,
    pub extract_duration_ms: u64,
    pub render_duration_ms: u64,
    pub composite_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl DetileStats {
    pub(crate) fn from_layout(layout: &GridLayout) -> Self {
        Self {
            page_count: layout.page_count(),
            columns: layout.columns(),
            rows: layout.rows(),
            tile_width_px: layout.tile_width(),
            tile_height_px: layout.tile_height(),
            canvas_width_px: layout.canvas_width(),
            canvas_height_px: layout.canvas_height(),
            ..Self::default()
        }
    }
}

/// What [`crate::inspect`] learns about a source without rendering it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub page_count: usize,
    /// Size of the first page in document units.
    pub tile_width_units: f32,
    pub tile_height_units: f32,
    /// Document units per inch (72 for PDF points).
    pub unit_scale: f32,
    /// Whether every page shares the first page's size.
    pub uniform: bool,
}

impl DocumentSummary {
    pub fn tile_width_inches(&self) -> f32 {
        self.tile_width_units / self.unit_scale
    }

    pub fn tile_height_inches(&self) -> f32 {
        self.tile_height_units / self.unit_scale
    }

    /// `(columns, rows)` of the grid these pages form with `columns` columns.
    pub fn grid(&self, columns: usize) -> (usize, usize) {
        let columns = columns.max(1);
        (columns, self.page_count.div_ceil(columns))
    }
}
