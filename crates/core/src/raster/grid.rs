//! Raster grid: size and georeferencing

use crate::error::{Error, Result};
use crate::raster::GeoTransform;
use serde::{Deserialize, Serialize};

/// Pixel dimensions and georeferencing of a raster.
///
/// The spatial reference is kept as an optional SRID; no coordinate
/// transformation happens at this level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub cols: usize,
    pub rows: usize,
    pub transform: GeoTransform,
    pub srid: Option<u32>,
}

impl Grid {
    /// Create a grid with the default north-up transform
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            transform: GeoTransform::default(),
            srid: None,
        }
    }

    pub fn with_transform(mut self, transform: GeoTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_srid(mut self, srid: u32) -> Self {
        self.srid = Some(srid);
        self
    }

    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that (col, row) lies inside the grid
    pub fn check_bounds(&self, col: usize, row: usize) -> Result<()> {
        if col >= self.cols || row >= self.rows {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }

    /// Grow by `count` rows above the first row, moving the origin up
    pub fn add_top_rows(&mut self, count: usize) {
        self.rows += count;
        self.transform = self.transform.shifted(0.0, -(count as f64));
    }

    /// Grow by `count` columns left of the first column, moving the origin left
    pub fn add_left_cols(&mut self, count: usize) {
        self.cols += count;
        self.transform = self.transform.shifted(-(count as f64), 0.0);
    }

    /// Bounding box (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols, self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_check_bounds() {
        let grid = Grid::new(10, 5);
        assert!(grid.check_bounds(9, 4).is_ok());
        assert!(matches!(
            grid.check_bounds(10, 0),
            Err(Error::IndexOutOfBounds { col: 10, cols: 10, rows: 5, .. })
        ));
    }

    #[test]
    fn test_add_top_rows_moves_origin() {
        let mut grid = Grid::new(10, 10).with_transform(GeoTransform::new(100.0, 500.0, 2.0, -2.0));
        grid.add_top_rows(3);
        grid.add_left_cols(2);

        assert_eq!((grid.cols, grid.rows), (12, 13));
        assert_relative_eq!(grid.transform.origin_y, 506.0);
        assert_relative_eq!(grid.transform.origin_x, 96.0);
        // Old pixel (0, 0) now sits at (2, 3) and keeps its location
        let (x, y) = grid.transform.pixel_to_geo_corner(2, 3);
        assert_relative_eq!(x, 100.0);
        assert_relative_eq!(y, 500.0);
    }
}
