//! Grid placement math.
//!
//! Tiles fill the grid row by row, left to right, top to bottom, all indices
//! zero-based:
//!
//! ```text
//!  columns = 3, pages = 7
//!
//!   ┌───┬───┬───┐
//!   │ 0 │ 1 │ 2 │   row 0
//!   ├───┼───┼───┤
//!   │ 3 │ 4 │ 5 │   row 1
//!   ├───┼───┴───┘
//!   │ 6 │           row 2  (partial, still on the canvas)
//!   └───┘
//! ```
//!
//! Placement is a pure function of the page index and the grid parameters;
//! nothing here holds state between tiles, so the result does not depend on
//! the order in which tiles are processed.

use crate::config::VerticalCompensation;
use crate::error::DetileError;
use crate::pipeline::source::TileSize;

/// Row and column of page `index` in a grid `columns` wide.
///
/// # Panics
/// If `columns` is zero. [`GridLayout::new`] rejects that case up front.
pub fn cell_of(index: usize, columns: usize) -> (usize, usize) {
    (index / columns, index % columns)
}

/// Where one tile lands on the canvas. Offsets are pixels from the top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPlacement {
    pub index: usize,
    pub row: usize,
    pub column: usize,
    pub x_px: f32,
    pub y_px: f32,
}

/// Geometry of the composite canvas for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    page_count: usize,
    columns: usize,
    tile_width: u32,
    tile_height: u32,
    compensation: VerticalCompensation,
    canvas_width: u32,
    canvas_height: u32,
}

impl GridLayout {
    pub fn new(
        page_count: usize,
        columns: usize,
        tile: TileSize,
        compensation: VerticalCompensation,
    ) -> Result<Self, DetileError> {
        if columns == 0 {
            return Err(DetileError::InvalidConfig(
                "Column count must be ≥ 1".into(),
            ));
        }
        if page_count == 0 {
            return Err(DetileError::Internal("grid of zero pages".into()));
        }

        let rows = page_count.div_ceil(columns);
        let too_large = || DetileError::CanvasTooLarge {
            columns,
            rows,
            tile_width: tile.width_px,
            tile_height: tile.height_px,
        };
        let canvas_width = u32::try_from(columns)
            .ok()
            .and_then(|c| tile.width_px.checked_mul(c))
            .ok_or_else(too_large)?;
        let canvas_height = u32::try_from(rows)
            .ok()
            .and_then(|r| tile.height_px.checked_mul(r))
            .ok_or_else(too_large)?;

        Ok(Self {
            page_count,
            columns,
            tile_width: tile.width_px,
            tile_height: tile.height_px,
            compensation,
            canvas_width,
            canvas_height,
        })
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// `ceil(page_count / columns)`: a partial last row still gets a row.
    pub fn rows(&self) -> usize {
        self.page_count.div_ceil(self.columns)
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    pub fn canvas_width(&self) -> u32 {
        self.canvas_width
    }

    pub fn canvas_height(&self) -> u32 {
        self.canvas_height
    }

    /// Placement of page `index`.
    pub fn placement(&self, index: usize) -> GridPlacement {
        let (row, column) = cell_of(index, self.columns);
        let x_px = column as f32 * self.tile_width as f32;
        let y_px = row as f32 * self.tile_height as f32 - self.compensation.offset_for_row(row);
        GridPlacement {
            index,
            row,
            column,
            x_px,
            y_px,
        }
    }

    /// Placements of every page, in page order.
    pub fn placements(&self) -> impl Iterator<Item = GridPlacement> + '_ {
        (0..self.page_count).map(|i| self.placement(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(w: u32, h: u32) -> TileSize {
        TileSize {
            width_units: w as f32,
            height_units: h as f32,
            width_px: w,
            height_px: h,
        }
    }

    fn layout(n: usize, c: usize) -> GridLayout {
        GridLayout::new(n, c, tile(100, 150), VerticalCompensation::None).unwrap()
    }

    #[test]
    fn six_pages_three_columns() {
        let g = layout(6, 3);
        assert_eq!(g.rows(), 2);
        assert_eq!(g.canvas_width(), 300);
        assert_eq!(g.canvas_height(), 300);

        let p = g.placement(4);
        assert_eq!((p.row, p.column), (1, 1));
        assert_eq!((p.x_px, p.y_px), (100.0, 150.0));
    }

    #[test]
    fn single_column() {
        let g = layout(5, 1);
        assert_eq!(g.rows(), 5);
        assert_eq!(g.canvas_width(), 100);
        for p in g.placements() {
            assert_eq!(p.column, 0);
            assert_eq!(p.row, p.index);
            assert_eq!(p.x_px, 0.0);
        }
    }

    #[test]
    fn partial_last_row_is_kept() {
        let g = layout(7, 3);
        assert_eq!(g.rows(), 3);
        assert_eq!(g.canvas_height(), 450);

        let last_row: Vec<_> = g.placements().filter(|p| p.row == 2).collect();
        assert_eq!(last_row.len(), 1);
        let p = last_row[0];
        assert_eq!(p.index, 6);
        assert!(p.y_px + 150.0 <= g.canvas_height() as f32);
    }

    #[test]
    fn more_columns_than_pages() {
        let g = layout(2, 5);
        assert_eq!(g.rows(), 1);
        assert_eq!(g.canvas_width(), 500);
    }

    #[test]
    fn canvas_matches_formula_for_many_shapes() {
        for n in 1..=25 {
            for c in 1..=8 {
                let g = layout(n, c);
                assert_eq!(g.canvas_width(), 100 * c as u32);
                assert_eq!(g.canvas_height(), 150 * n.div_ceil(c) as u32);
                for p in g.placements() {
                    assert_eq!(p.column, p.index % c);
                    assert_eq!(p.row, p.index / c);
                    assert!(p.x_px + 100.0 <= g.canvas_width() as f32);
                }
            }
        }
    }

    #[test]
    fn placement_independent_of_order() {
        let g = layout(9, 4);
        let forward: Vec<_> = g.placements().collect();
        let mut backward: Vec<_> = (0..9).rev().map(|i| g.placement(i)).collect();
        backward.reverse();
        assert_eq!(forward, backward);
    }

    #[test]
    fn legacy_compensation_shifts_rows_up() {
        let g = GridLayout::new(6, 2, tile(100, 150), VerticalCompensation::legacy()).unwrap();
        assert_eq!(g.placement(0).y_px, 0.0);
        assert_eq!(g.placement(2).y_px, 149.5);
        assert_eq!(g.placement(5).y_px, 299.0);
        // Canvas height is unaffected by compensation.
        assert_eq!(g.canvas_height(), 450);
    }

    #[test]
    fn zero_columns_rejected() {
        assert!(matches!(
            GridLayout::new(3, 0, tile(1, 1), VerticalCompensation::None),
            Err(DetileError::InvalidConfig(_))
        ));
    }

    #[test]
    fn overflow_detected() {
        let err = GridLayout::new(4, 4, tile(u32::MAX / 2, 10), VerticalCompensation::None)
            .unwrap_err();
        assert!(matches!(err, DetileError::CanvasTooLarge { .. }));
    }

    #[test]
    fn cell_of_basic() {
        assert_eq!(cell_of(0, 3), (0, 0));
        assert_eq!(cell_of(4, 3), (1, 1));
        assert_eq!(cell_of(6, 3), (2, 0));
    }
}
