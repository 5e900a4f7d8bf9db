//! Three dimensional (band, block row, block column) residency index.
//!
//! Every block of every band maps to exactly one [`BlockLocation`]. Bands
//! keep their own block grid, stored as a flat row-major layer. The
//! reshaping primitives insert or remove whole block rows, columns or bands
//! at either edge; cells they insert start out [`BlockLocation::Pending`] and
//! must be populated by the caller before anyone reads them.

use crate::disk::DiskBlock;

/// Index of a RAM buffer owned by the manager
pub type SlotId = usize;

/// Block position: band, then block row, then block column.
///
/// The derived ordering is raster order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockCoord {
    pub band: usize,
    pub y: usize,
    pub x: usize,
}

impl BlockCoord {
    pub fn new(band: usize, x: usize, y: usize) -> Self {
        Self { band, y, x }
    }
}

/// Where the bytes of a block currently live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLocation {
    Ram(SlotId),
    Disk(DiskBlock),
    /// Inserted by a reshape and not yet bound to storage
    Pending,
}

/// Side of a dimension that a reshape applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Top rows, left columns, first bands
    Start,
    /// Bottom rows, right columns, last bands
    End,
}

#[derive(Debug, Clone)]
struct Layer {
    blocks_x: usize,
    blocks_y: usize,
    cells: Vec<BlockLocation>,
}

impl Layer {
    fn pending(blocks_x: usize, blocks_y: usize) -> Self {
        Self {
            blocks_x,
            blocks_y,
            cells: vec![BlockLocation::Pending; blocks_x * blocks_y],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlockIndex {
    layers: Vec<Layer>,
}

impl BlockIndex {
    /// Index with one layer per band, every cell pending
    pub fn with_layout(blocks_x: &[usize], blocks_y: &[usize]) -> Self {
        debug_assert_eq!(blocks_x.len(), blocks_y.len());
        Self {
            layers: blocks_x
                .iter()
                .zip(blocks_y)
                .map(|(&bx, &by)| Layer::pending(bx, by))
                .collect(),
        }
    }

    pub fn band_count(&self) -> usize {
        self.layers.len()
    }

    pub fn blocks_x(&self, band: usize) -> usize {
        self.layers[band].blocks_x
    }

    pub fn blocks_y(&self, band: usize) -> usize {
        self.layers[band].blocks_y
    }

    pub fn total_blocks(&self) -> usize {
        self.layers.iter().map(|l| l.cells.len()).sum()
    }

    pub fn contains(&self, coord: BlockCoord) -> bool {
        self.layers
            .get(coord.band)
            .is_some_and(|l| coord.x < l.blocks_x && coord.y < l.blocks_y)
    }

    fn cell(&self, coord: BlockCoord) -> usize {
        let layer = &self.layers[coord.band];
        assert!(
            coord.x < layer.blocks_x && coord.y < layer.blocks_y,
            "block ({}, {}) outside band {} of {}x{} blocks",
            coord.x,
            coord.y,
            coord.band,
            layer.blocks_x,
            layer.blocks_y
        );
        coord.y * layer.blocks_x + coord.x
    }

    /// # Panics
    ///
    /// Panics when `coord` is outside the index.
    pub fn location(&self, coord: BlockCoord) -> BlockLocation {
        let cell = self.cell(coord);
        self.layers[coord.band].cells[cell]
    }

    pub fn set(&mut self, coord: BlockCoord, location: BlockLocation) {
        let cell = self.cell(coord);
        self.layers[coord.band].cells[cell] = location;
    }

    /// All cells in raster order
    pub fn iter(&self) -> impl Iterator<Item = (BlockCoord, BlockLocation)> + '_ {
        self.layers.iter().enumerate().flat_map(|(band, layer)| {
            layer.cells.iter().enumerate().map(move |(i, &loc)| {
                (
                    BlockCoord::new(band, i % layer.blocks_x, i / layer.blocks_x),
                    loc,
                )
            })
        })
    }

    /// Coordinates of one band in raster order
    fn band_coords(&self, band: usize) -> impl Iterator<Item = BlockCoord> + use<> {
        let (bx, by) = (self.blocks_x(band), self.blocks_y(band));
        (0..by).flat_map(move |y| (0..bx).map(move |x| BlockCoord::new(band, x, y)))
    }

    /// Insert `count` block rows into one band; returns the new coordinates
    pub fn insert_rows(&mut self, band: usize, edge: Edge, count: usize) -> Vec<BlockCoord> {
        let layer = &mut self.layers[band];
        let new_cells = count * layer.blocks_x;
        let at = match edge {
            Edge::Start => 0,
            Edge::End => layer.cells.len(),
        };
        layer
            .cells
            .splice(at..at, std::iter::repeat_n(BlockLocation::Pending, new_cells));
        let first_row = match edge {
            Edge::Start => 0,
            Edge::End => layer.blocks_y,
        };
        layer.blocks_y += count;

        let bx = layer.blocks_x;
        (first_row..first_row + count)
            .flat_map(|y| (0..bx).map(move |x| BlockCoord::new(band, x, y)))
            .collect()
    }

    /// Insert `count` block columns into one band; returns the new coordinates
    pub fn insert_cols(&mut self, band: usize, edge: Edge, count: usize) -> Vec<BlockCoord> {
        let layer = &mut self.layers[band];
        let old_bx = layer.blocks_x;
        let new_bx = old_bx + count;
        let first_col = match edge {
            Edge::Start => 0,
            Edge::End => old_bx,
        };

        let mut cells = Vec::with_capacity(new_bx * layer.blocks_y);
        for row in layer.cells.chunks(old_bx) {
            if edge == Edge::Start {
                cells.extend(std::iter::repeat_n(BlockLocation::Pending, count));
            }
            cells.extend_from_slice(row);
            if edge == Edge::End {
                cells.extend(std::iter::repeat_n(BlockLocation::Pending, count));
            }
        }
        layer.cells = cells;
        layer.blocks_x = new_bx;

        (0..layer.blocks_y)
            .flat_map(|y| (first_col..first_col + count).map(move |x| BlockCoord::new(band, x, y)))
            .collect()
    }

    /// Insert `count` bands of `blocks_x` x `blocks_y` blocks; returns the new coordinates
    pub fn insert_bands(
        &mut self,
        edge: Edge,
        count: usize,
        blocks_x: usize,
        blocks_y: usize,
    ) -> Vec<BlockCoord> {
        let first_band = match edge {
            Edge::Start => 0,
            Edge::End => self.layers.len(),
        };
        self.layers.splice(
            first_band..first_band,
            (0..count).map(|_| Layer::pending(blocks_x, blocks_y)),
        );
        (first_band..first_band + count)
            .flat_map(|band| self.band_coords(band))
            .collect()
    }

    /// Remove `count` block rows of one band; returns the removed locations
    pub fn remove_rows(&mut self, band: usize, edge: Edge, count: usize) -> Vec<BlockLocation> {
        let layer = &mut self.layers[band];
        assert!(count <= layer.blocks_y, "removing {count} of {} block rows", layer.blocks_y);
        let removed_cells = count * layer.blocks_x;
        let range = match edge {
            Edge::Start => 0..removed_cells,
            Edge::End => layer.cells.len() - removed_cells..layer.cells.len(),
        };
        layer.blocks_y -= count;
        layer.cells.drain(range).collect()
    }

    /// Remove `count` block columns of one band; returns the removed locations
    pub fn remove_cols(&mut self, band: usize, edge: Edge, count: usize) -> Vec<BlockLocation> {
        let layer = &mut self.layers[band];
        assert!(count <= layer.blocks_x, "removing {count} of {} block columns", layer.blocks_x);
        let old_bx = layer.blocks_x;
        let kept = match edge {
            Edge::Start => count..old_bx,
            Edge::End => 0..old_bx - count,
        };

        let mut cells = Vec::with_capacity((old_bx - count) * layer.blocks_y);
        let mut removed = Vec::with_capacity(count * layer.blocks_y);
        for row in layer.cells.chunks(old_bx) {
            for (x, &loc) in row.iter().enumerate() {
                if kept.contains(&x) {
                    cells.push(loc);
                } else {
                    removed.push(loc);
                }
            }
        }
        layer.cells = cells;
        layer.blocks_x -= count;
        removed
    }

    /// Remove `count` bands; returns the removed locations
    pub fn remove_bands(&mut self, edge: Edge, count: usize) -> Vec<BlockLocation> {
        assert!(count <= self.layers.len(), "removing {count} of {} bands", self.layers.len());
        let range = match edge {
            Edge::Start => 0..count,
            Edge::End => self.layers.len() - count..self.layers.len(),
        };
        self.layers
            .drain(range)
            .flat_map(|layer| layer.cells)
            .collect()
    }
}
