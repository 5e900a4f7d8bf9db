//! Expansible in-memory raster backed by a [`BandBlocksManager`].
//!
//! All bands share the block width and height of the first band, so a block
//! coordinate means the same grid window in every band. The raster can grow
//! on any side; new pixels hold the band's no-data value.

use crate::band::Band;
use crate::cached::BlockSource;
use crate::error::{ConfigError, Result};
use crate::index::BlockCoord;
use crate::manager::BandBlocksManager;
use crate::options::RasterOptions;
use std::result::Result as StdResult;
use tessella_core::raster::{BandProperty, GeoTransform, PixelAccessor};
use tessella_core::{Error, Grid};
use tracing::debug;

type GrowFn = fn(&mut BandBlocksManager, usize, usize) -> StdResult<Vec<BlockCoord>, ConfigError>;
type UndoFn = fn(&mut BandBlocksManager, usize, usize) -> StdResult<(), ConfigError>;

#[derive(Debug)]
pub struct MemoryRaster {
    grid: Grid,
    properties: Vec<BandProperty>,
    accessors: Vec<PixelAccessor>,
    manager: BandBlocksManager,
    options: RasterOptions,
    /// Reduced resolution copies, level 1 first
    levels: Vec<MemoryRaster>,
}

impl MemoryRaster {
    /// Create a raster of `grid` size with one band per property.
    ///
    /// Block dimensions of every band are replaced by those of the first
    /// band. Pixel contents start zeroed; see [`fill_nodata`](Self::fill_nodata).
    pub fn new(grid: Grid, bands: Vec<BandProperty>, options: &RasterOptions) -> Result<Self> {
        options.validate()?;
        if grid.cols == 0 || grid.rows == 0 {
            return Err(Error::InvalidDimensions {
                width: grid.cols,
                height: grid.rows,
            }
            .into());
        }
        let Some(first) = bands.first() else {
            return Err(ConfigError::NoBands.into());
        };
        first.validate()?;

        let (block_width, block_height) = (first.block_width, first.block_height);
        let properties: Vec<BandProperty> = bands
            .into_iter()
            .map(|mut p| {
                p.block_width = block_width;
                p.block_height = block_height;
                p
            })
            .collect();

        let (blocks_x, blocks_y) = properties[0].blocks_for(grid.cols, grid.rows);
        let block_sizes: Vec<usize> = properties
            .iter()
            .map(BandProperty::block_size_bytes)
            .collect();
        let max_block_size = block_sizes.iter().copied().max().unwrap_or(0);
        let max_ram_blocks = options.ram_budget.max_ram_blocks(max_block_size)?;

        let mut manager = BandBlocksManager::new();
        if let Some(dir) = &options.temp_dir {
            manager = manager.with_temp_dir(dir);
        }
        let n = properties.len();
        manager.initialize(
            max_ram_blocks,
            &vec![blocks_x; n],
            &vec![blocks_y; n],
            &block_sizes,
            options.max_disk_file_size,
        )?;

        debug!(
            cols = grid.cols,
            rows = grid.rows,
            bands = n,
            blocks_x,
            blocks_y,
            max_ram_blocks,
            "created memory raster"
        );

        Ok(Self {
            accessors: properties.iter().map(|p| PixelAccessor::for_type(p.pixel_type)).collect(),
            grid,
            properties,
            manager,
            options: options.clone(),
            levels: Vec::new(),
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn cols(&self) -> usize {
        self.grid.cols
    }

    pub fn rows(&self) -> usize {
        self.grid.rows
    }

    pub fn band_count(&self) -> usize {
        self.properties.len()
    }

    pub fn properties(&self) -> &[BandProperty] {
        &self.properties
    }

    pub fn options(&self) -> &RasterOptions {
        &self.options
    }

    /// Block storage statistics
    pub fn manager(&self) -> &BandBlocksManager {
        &self.manager
    }

    pub fn band(&mut self, index: usize) -> Result<Band<'_>> {
        if index >= self.properties.len() {
            return Err(ConfigError::BandOutOfRange {
                band: index,
                bands: self.properties.len(),
            }
            .into());
        }
        Ok(Band::new(
            &mut self.manager,
            &self.grid,
            &self.properties[index],
            self.accessors[index],
            index,
        ))
    }

    /// Write each band's no-data value (0 when unset) into every pixel.
    pub fn fill_nodata(&mut self) -> Result<()> {
        for index in 0..self.band_count() {
            let value = self.properties[index].fill_value();
            self.band(index)?.fill(value)?;
        }
        Ok(())
    }

    /// Deep copy with the same layout and RAM cap.
    pub fn duplicate(&mut self) -> Result<MemoryRaster> {
        let options = self
            .options
            .clone()
            .with_ram_blocks(self.manager.max_ram_blocks());
        let mut copy = MemoryRaster::new(self.grid.clone(), self.properties.clone(), &options)?;

        for index in 0..self.band_count() {
            let mut buf = vec![0u8; self.manager.block_size_bytes(index)];
            let mut source = self.band(index)?;
            let (blocks_x, blocks_y) = (source.blocks_x(), source.blocks_y());
            for by in 0..blocks_y {
                for bx in 0..blocks_x {
                    source.read(bx, by, &mut buf)?;
                    copy.band(index)?.write(bx, by, &buf)?;
                }
            }
        }
        Ok(copy)
    }

    /// Build reduced resolution copies for levels `1..levels`.
    ///
    /// Level `l` divides the grid and the block size by `2 * l` (blocks keep
    /// at least one pixel), covers the same extent with the same RAM block
    /// cap, and takes each pixel from the nearest pixel of this raster.
    /// Levels are snapshots: later writes to this raster do not reach them.
    /// Existing levels are replaced; when a level cannot be built none are kept.
    pub fn create_multi_resolution(&mut self, levels: usize) -> Result<()> {
        self.levels.clear();
        let mut built = Vec::with_capacity(levels.saturating_sub(1));
        for level in 1..levels {
            built.push(self.build_level(level)?);
        }
        debug!(levels = built.len() + 1, "created multi-resolution levels");
        self.levels = built;
        Ok(())
    }

    fn build_level(&mut self, level: usize) -> Result<MemoryRaster> {
        let factor = 2 * level;
        let (base_cols, base_rows) = (self.grid.cols, self.grid.rows);
        let (cols, rows) = (base_cols / factor, base_rows / factor);
        if cols == 0 || rows == 0 {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            }
            .into());
        }

        let scale_x = base_cols as f64 / cols as f64;
        let scale_y = base_rows as f64 / rows as f64;
        let t = self.grid.transform;
        let transform = GeoTransform {
            pixel_width: t.pixel_width * scale_x,
            col_rotation: t.col_rotation * scale_x,
            pixel_height: t.pixel_height * scale_y,
            row_rotation: t.row_rotation * scale_y,
            ..t
        };
        let grid = Grid {
            cols,
            rows,
            transform,
            srid: self.grid.srid,
        };
        let properties = self
            .properties
            .iter()
            .map(|p| {
                let mut p = p.clone();
                p.block_width = (p.block_width / factor).max(1);
                p.block_height = (p.block_height / factor).max(1);
                p
            })
            .collect();
        let options = self
            .options
            .clone()
            .with_ram_blocks(self.manager.max_ram_blocks());
        let mut reduced = MemoryRaster::new(grid, properties, &options)?;

        for index in 0..self.band_count() {
            let complex = self.properties[index].pixel_type.is_complex();
            let mut source = self.band(index)?;
            let mut target = reduced.band(index)?;
            for row in 0..rows {
                let in_row = nearest(row, scale_y, base_rows);
                for col in 0..cols {
                    let in_col = nearest(col, scale_x, base_cols);
                    target.set_value(col, row, source.get_value(in_col, in_row)?)?;
                    if complex {
                        target.set_ivalue(col, row, source.get_ivalue(in_col, in_row)?)?;
                    }
                }
            }
        }
        debug!(level, cols, rows, "built resolution level");
        Ok(reduced)
    }

    pub fn remove_multi_resolution(&mut self) {
        self.levels.clear();
    }

    /// Number of resolution levels counting this raster, 0 without levels
    pub fn multi_res_levels_count(&self) -> usize {
        if self.levels.is_empty() {
            0
        } else {
            self.levels.len() + 1
        }
    }

    /// Resolution level `level`, where level 0 is this raster.
    pub fn multi_res_level(&mut self, level: usize) -> Option<&mut MemoryRaster> {
        if self.levels.is_empty() {
            return None;
        }
        match level {
            0 => Some(self),
            level => self.levels.get_mut(level - 1),
        }
    }

    fn block_width(&self) -> usize {
        self.properties[0].block_width
    }

    fn block_height(&self) -> usize {
        self.properties[0].block_height
    }

    fn fill_added(&mut self, added: &[BlockCoord]) -> Result<()> {
        for index in 0..self.band_count() {
            let blocks: Vec<(usize, usize)> = added
                .iter()
                .filter(|c| c.band == index)
                .map(|c| (c.x, c.y))
                .collect();
            if !blocks.is_empty() {
                let value = self.properties[index].fill_value();
                self.band(index)?.fill_blocks(&blocks, value)?;
            }
        }
        Ok(())
    }

    /// Grow every band by block rows or columns, undoing the bands already
    /// grown when one fails.
    fn grow_all_bands(
        &mut self,
        count: usize,
        grow: GrowFn,
        undo: UndoFn,
    ) -> Result<Vec<BlockCoord>> {
        let mut added = Vec::new();
        if count == 0 {
            return Ok(added);
        }
        for band in 0..self.band_count() {
            match grow(&mut self.manager, band, count) {
                Ok(coords) => added.extend(coords),
                Err(e) => {
                    for grown in 0..band {
                        undo(&mut self.manager, grown, count)?;
                    }
                    return Err(e.into());
                }
            }
        }
        Ok(added)
    }

    /// Insert at least `count` rows above the first row.
    ///
    /// Existing pixels move down by whole blocks, so the number of rows
    /// actually inserted is `count` rounded up to the block height; it is
    /// returned. The grid origin moves up so existing pixels keep their
    /// world coordinates.
    pub fn add_top_lines(&mut self, count: usize) -> Result<usize> {
        if count == 0 {
            return Ok(0);
        }
        let blocks = count.div_ceil(self.block_height());
        let added = self.grow_all_bands(
            blocks,
            BandBlocksManager::add_top_blocks,
            BandBlocksManager::remove_top_blocks,
        )?;
        let lines = blocks * self.block_height();
        self.grid.add_top_rows(lines);
        self.fill_added(&added)?;
        debug!(lines, blocks, "added top lines");
        Ok(lines)
    }

    /// Append `count` rows, using the unused part of the last block row first.
    pub fn add_bottom_lines(&mut self, count: usize) -> Result<usize> {
        if count == 0 {
            return Ok(0);
        }
        let bh = self.block_height();
        let old_rows = self.grid.rows;
        let spare = self.manager.blocks_y(0) * bh - old_rows;
        let blocks = count.saturating_sub(spare).div_ceil(bh);

        let added = self.grow_all_bands(
            blocks,
            BandBlocksManager::add_bottom_blocks,
            BandBlocksManager::remove_bottom_blocks,
        )?;
        self.grid.rows += count;
        self.fill_added(&added)?;
        self.fill_window(0, old_rows, self.grid.cols, count.min(spare))?;
        debug!(lines = count, blocks, "added bottom lines");
        Ok(count)
    }

    /// Insert at least `count` columns left of the first column; see
    /// [`add_top_lines`](Self::add_top_lines) for the rounding.
    pub fn add_left_columns(&mut self, count: usize) -> Result<usize> {
        if count == 0 {
            return Ok(0);
        }
        let blocks = count.div_ceil(self.block_width());
        let added = self.grow_all_bands(
            blocks,
            BandBlocksManager::add_left_blocks,
            BandBlocksManager::remove_left_blocks,
        )?;
        let columns = blocks * self.block_width();
        self.grid.add_left_cols(columns);
        self.fill_added(&added)?;
        debug!(columns, blocks, "added left columns");
        Ok(columns)
    }

    /// Append `count` columns, using the unused part of the last block column first.
    pub fn add_right_columns(&mut self, count: usize) -> Result<usize> {
        if count == 0 {
            return Ok(0);
        }
        let bw = self.block_width();
        let old_cols = self.grid.cols;
        let spare = self.manager.blocks_x(0) * bw - old_cols;
        let blocks = count.saturating_sub(spare).div_ceil(bw);

        let added = self.grow_all_bands(
            blocks,
            BandBlocksManager::add_right_blocks,
            BandBlocksManager::remove_right_blocks,
        )?;
        self.grid.cols += count;
        self.fill_added(&added)?;
        self.fill_window(old_cols, 0, count.min(spare), self.grid.rows)?;
        debug!(columns = count, blocks, "added right columns");
        Ok(count)
    }

    /// Set a pixel window of every band to its no-data value
    fn fill_window(&mut self, col0: usize, row0: usize, cols: usize, rows: usize) -> Result<()> {
        if cols == 0 || rows == 0 {
            return Ok(());
        }
        for index in 0..self.band_count() {
            let value = self.properties[index].fill_value();
            let mut band = self.band(index)?;
            for row in row0..row0 + rows {
                for col in col0..col0 + cols {
                    band.set_value(col, row, value)?;
                }
            }
        }
        Ok(())
    }

    /// Insert `count` bands before the first one, copying its properties.
    pub fn add_top_bands(&mut self, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let added = self.manager.add_top_bands(count)?;
        let template = self.properties[0].clone();
        let accessor = self.accessors[0];
        self.properties.splice(0..0, std::iter::repeat_n(template, count));
        self.accessors.splice(0..0, std::iter::repeat_n(accessor, count));
        self.fill_added(&added)?;
        debug!(count, "added top bands");
        Ok(())
    }

    /// Append `count` bands, copying the properties of the last one.
    pub fn add_bottom_bands(&mut self, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let added = self.manager.add_bottom_bands(count)?;
        let last = self.properties.len() - 1;
        let template = self.properties[last].clone();
        let accessor = self.accessors[last];
        self.properties.extend(std::iter::repeat_n(template, count));
        self.accessors.extend(std::iter::repeat_n(accessor, count));
        self.fill_added(&added)?;
        debug!(count, "added bottom bands");
        Ok(())
    }
}

/// Index of the base pixel nearest to reduced index `out`
fn nearest(out: usize, scale: f64, len: usize) -> usize {
    ((out as f64 * scale).round() as usize).min(len - 1)
}

impl BlockSource for MemoryRaster {
    fn band_count(&self) -> usize {
        self.properties.len()
    }

    fn blocks_x(&self, band: usize) -> usize {
        self.manager.blocks_x(band)
    }

    fn blocks_y(&self, band: usize) -> usize {
        self.manager.blocks_y(band)
    }

    fn block_size_bytes(&self, band: usize) -> usize {
        self.manager.block_size_bytes(band)
    }

    fn read_block(&mut self, band: usize, x: usize, y: usize, buf: &mut [u8]) -> Result<()> {
        self.band(band)?.read(x, y, buf)
    }

    fn write_block(&mut self, band: usize, x: usize, y: usize, buf: &[u8]) -> Result<()> {
        self.band(band)?.write(x, y, buf)
    }
}
