//! Per-band pixel and block access on top of a [`BandBlocksManager`].

use crate::error::{MemoryError, Result};
use crate::manager::BandBlocksManager;
use ndarray::{Array2, ArrayView2};
use tessella_core::raster::{BandProperty, PixelAccessor};
use tessella_core::{Error, Grid};

/// Borrowed view of one band of a memory raster.
///
/// Pixel positions are (col, row) in the raster grid. Each access finds the
/// owning block, which may page it in from a swap file, and applies the
/// band's pixel accessor at `col % block_width + (row % block_height) * block_width`.
pub struct Band<'a> {
    manager: &'a mut BandBlocksManager,
    grid: &'a Grid,
    property: &'a BandProperty,
    accessor: PixelAccessor,
    index: usize,
}

impl<'a> Band<'a> {
    pub(crate) fn new(
        manager: &'a mut BandBlocksManager,
        grid: &'a Grid,
        property: &'a BandProperty,
        accessor: PixelAccessor,
        index: usize,
    ) -> Self {
        Self {
            manager,
            grid,
            property,
            accessor,
            index,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn property(&self) -> &BandProperty {
        self.property
    }

    pub fn cols(&self) -> usize {
        self.grid.cols
    }

    pub fn rows(&self) -> usize {
        self.grid.rows
    }

    pub fn blocks_x(&self) -> usize {
        self.manager.blocks_x(self.index)
    }

    pub fn blocks_y(&self) -> usize {
        self.manager.blocks_y(self.index)
    }

    pub fn block_size_bytes(&self) -> usize {
        self.manager.block_size_bytes(self.index)
    }

    /// Block coordinates and in-block pixel offset of a grid position
    fn locate(&self, col: usize, row: usize) -> Result<(usize, usize, usize)> {
        self.grid.check_bounds(col, row)?;
        let (bw, bh) = (self.property.block_width, self.property.block_height);
        Ok((col / bw, row / bh, col % bw + (row % bh) * bw))
    }

    fn check_block(&self, bx: usize, by: usize) -> Result<()> {
        let (blocks_x, blocks_y) = (self.blocks_x(), self.blocks_y());
        if bx >= blocks_x || by >= blocks_y {
            return Err(Error::IndexOutOfBounds {
                row: by,
                col: bx,
                rows: blocks_y,
                cols: blocks_x,
            }
            .into());
        }
        Ok(())
    }

    pub fn get_value(&mut self, col: usize, row: usize) -> Result<f64> {
        let (bx, by, offset) = self.locate(col, row)?;
        let block = self.manager.block(self.index, bx, by)?;
        Ok(self.accessor.get(block, offset))
    }

    pub fn set_value(&mut self, col: usize, row: usize, value: f64) -> Result<()> {
        let (bx, by, offset) = self.locate(col, row)?;
        let block = self.manager.block_mut(self.index, bx, by)?;
        self.accessor.set(block, offset, value);
        Ok(())
    }

    /// Imaginary part of a pixel; always 0 for real pixel types
    pub fn get_ivalue(&mut self, col: usize, row: usize) -> Result<f64> {
        let (bx, by, offset) = self.locate(col, row)?;
        let block = self.manager.block(self.index, bx, by)?;
        Ok(self.accessor.get_imag(block, offset))
    }

    /// Set the imaginary part of a pixel; ignored for real pixel types
    pub fn set_ivalue(&mut self, col: usize, row: usize, value: f64) -> Result<()> {
        let (bx, by, offset) = self.locate(col, row)?;
        let block = self.manager.block_mut(self.index, bx, by)?;
        self.accessor.set_imag(block, offset, value);
        Ok(())
    }

    /// Copy a whole block into `buf`, which must be exactly one block long.
    pub fn read(&mut self, bx: usize, by: usize, buf: &mut [u8]) -> Result<()> {
        self.check_block(bx, by)?;
        let expected = self.block_size_bytes();
        if buf.len() != expected {
            return Err(MemoryError::BlockSizeMismatch {
                expected,
                actual: buf.len(),
            });
        }
        buf.copy_from_slice(self.manager.block(self.index, bx, by)?);
        Ok(())
    }

    /// Overwrite a whole block from `buf`, which must be exactly one block long.
    pub fn write(&mut self, bx: usize, by: usize, buf: &[u8]) -> Result<()> {
        self.check_block(bx, by)?;
        let expected = self.block_size_bytes();
        if buf.len() != expected {
            return Err(MemoryError::BlockSizeMismatch {
                expected,
                actual: buf.len(),
            });
        }
        self.manager.block_mut(self.index, bx, by)?.copy_from_slice(buf);
        Ok(())
    }

    /// Block buffer with every pixel (padding included) set to `value`
    fn template_block(&self, value: f64) -> Vec<u8> {
        let mut block = vec![0u8; self.block_size_bytes()];
        for i in 0..self.property.pixels_per_block() {
            self.accessor.set(&mut block, i, value);
        }
        block
    }

    /// Set every pixel of the band to `value`.
    pub fn fill(&mut self, value: f64) -> Result<()> {
        let template = self.template_block(value);
        for by in 0..self.blocks_y() {
            for bx in 0..self.blocks_x() {
                self.write(bx, by, &template)?;
            }
        }
        Ok(())
    }

    /// Set every pixel of the listed blocks to `value`
    pub(crate) fn fill_blocks(&mut self, blocks: &[(usize, usize)], value: f64) -> Result<()> {
        let template = self.template_block(value);
        for &(bx, by) in blocks {
            self.write(bx, by, &template)?;
        }
        Ok(())
    }

    /// Visit every block together with the grid window it covers
    fn for_each_block(
        &mut self,
        mut f: impl FnMut(&mut [u8], &PixelAccessor, Window),
    ) -> Result<()> {
        let (bw, bh) = (self.property.block_width, self.property.block_height);
        for by in 0..self.blocks_y() {
            for bx in 0..self.blocks_x() {
                let window = Window {
                    col0: bx * bw,
                    row0: by * bh,
                    cols: bw.min(self.grid.cols.saturating_sub(bx * bw)),
                    rows: bh.min(self.grid.rows.saturating_sub(by * bh)),
                    block_width: bw,
                };
                if window.cols == 0 || window.rows == 0 {
                    continue;
                }
                let block = self.manager.block_mut(self.index, bx, by)?;
                f(block, &self.accessor, window);
            }
        }
        Ok(())
    }

    /// Copy the band into a `(rows, cols)` array.
    pub fn read_array(&mut self) -> Result<Array2<f64>> {
        let mut out = Array2::zeros((self.grid.rows, self.grid.cols));
        self.for_each_block(|block, accessor, w| {
            for r in 0..w.rows {
                for c in 0..w.cols {
                    out[[w.row0 + r, w.col0 + c]] = accessor.get(block, c + r * w.block_width);
                }
            }
        })?;
        Ok(out)
    }

    /// Overwrite the band from a `(rows, cols)` array.
    pub fn write_array(&mut self, data: ArrayView2<'_, f64>) -> Result<()> {
        let (rows, cols) = data.dim();
        if rows != self.grid.rows || cols != self.grid.cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            }
            .into());
        }
        self.for_each_block(|block, accessor, w| {
            for r in 0..w.rows {
                for c in 0..w.cols {
                    accessor.set(block, c + r * w.block_width, data[[w.row0 + r, w.col0 + c]]);
                }
            }
        })
    }
}

/// Part of the grid covered by one block
#[derive(Clone, Copy)]
struct Window {
    col0: usize,
    row0: usize,
    cols: usize,
    rows: usize,
    block_width: usize,
}
