//! Band blocks manager: bounded RAM block storage with disk paging.
//!
//! The manager owns up to `max_ram_blocks` buffers, each as large as the
//! largest block of any band. Blocks that do not fit are kept in swap files.
//! Asking for a disk resident block evicts the oldest loaded RAM block
//! (round-robin, not LRU) in three steps:
//!
//! 1. read the requested block into the spare swap buffer,
//! 2. write the victim's buffer into the slot the requested block came from,
//! 3. exchange the two buffers and update the index and the FIFO.
//!
//! The layout can grow or shrink by whole block rows, columns or bands. New
//! blocks take RAM while the cap allows and go to disk otherwise.

use crate::disk::{DiskBlock, DiskSwap};
use crate::error::{ConfigError, SwapError};
use crate::fifo::SwapFifo;
use crate::index::{BlockCoord, BlockIndex, BlockLocation, Edge, SlotId};
use std::path::PathBuf;
use tracing::{debug, error, trace};

/// Where a block lives, as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    Ram,
    Disk,
}

#[derive(Debug, Default)]
pub struct BandBlocksManager {
    index: BlockIndex,
    block_sizes: Vec<usize>,
    max_block_size: usize,
    max_ram_blocks: usize,
    max_disk_file_size: u64,
    temp_dir: Option<PathBuf>,
    slots: Vec<Box<[u8]>>,
    /// RAM buffers not bound to any block (left behind by shrinking)
    free_slots: Vec<SlotId>,
    /// Spare buffer used as the landing zone of each swap
    swap_buffer: Box<[u8]>,
    fifo: SwapFifo,
    disk: Option<DiskSwap>,
    initialized: bool,
    poisoned: bool,
    swaps: u64,
}

pub(crate) fn alloc_buffer(size: usize) -> Option<Box<[u8]>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size).ok()?;
    buf.resize(size, 0u8);
    Some(buf.into_boxed_slice())
}

fn alloc_buffers(count: usize, size: usize) -> Result<Vec<Box<[u8]>>, ConfigError> {
    let failed = || ConfigError::RamAllocation {
        count,
        block_size: size,
    };
    let mut buffers = Vec::new();
    buffers.try_reserve_exact(count).map_err(|_| failed())?;
    for _ in 0..count {
        buffers.push(alloc_buffer(size).ok_or_else(failed)?);
    }
    Ok(buffers)
}

impl BandBlocksManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create swap files in `dir` instead of the system temp directory.
    ///
    /// Takes effect at the next swap file creation.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Allocate storage for the given band layout.
    ///
    /// `blocks_x`, `blocks_y` and `block_sizes` hold one entry per band. The
    /// first `max_ram_blocks` blocks in raster order (band, row, column) are
    /// placed in RAM, the rest in swap files of at most `max_disk_file_size`
    /// bytes. Any previous state is released first; on error the manager is
    /// left uninitialized.
    pub fn initialize(
        &mut self,
        max_ram_blocks: usize,
        blocks_x: &[usize],
        blocks_y: &[usize],
        block_sizes: &[usize],
        max_disk_file_size: u64,
    ) -> Result<(), ConfigError> {
        self.free();

        if blocks_x.len() != blocks_y.len() || blocks_y.len() != block_sizes.len() {
            return Err(ConfigError::BandCountMismatch {
                blocks_x: blocks_x.len(),
                blocks_y: blocks_y.len(),
                block_sizes: block_sizes.len(),
            });
        }
        if blocks_x.is_empty() {
            return Err(ConfigError::NoBands);
        }
        for band in 0..blocks_x.len() {
            if block_sizes[band] == 0 {
                return Err(ConfigError::ZeroBlockSize { band });
            }
            if blocks_x[band] == 0 || blocks_y[band] == 0 {
                return Err(ConfigError::ZeroBlocks {
                    band,
                    blocks_x: blocks_x[band],
                    blocks_y: blocks_y[band],
                });
            }
        }

        let max_block_size = block_sizes.iter().copied().max().unwrap_or(0);
        if max_block_size as u64 > max_disk_file_size {
            return Err(ConfigError::BlockLargerThanDiskFile {
                block_size: max_block_size,
                max_disk_file_size,
            });
        }
        if max_ram_blocks == 0 {
            return Err(ConfigError::NoRamBlocks);
        }

        let mut index = BlockIndex::with_layout(blocks_x, blocks_y);
        let total = index.total_blocks();
        let ram_count = total.min(max_ram_blocks);
        let disk_count = total - ram_count;

        let slots = alloc_buffers(ram_count, max_block_size)?;
        let mut disk = None;
        let mut swap_buffer = Box::default();
        let mut disk_blocks = Vec::new();
        if disk_count > 0 {
            let mut swap = DiskSwap::new(max_block_size, max_disk_file_size, self.temp_dir.clone());
            disk_blocks = swap
                .allocate(disk_count)
                .map_err(ConfigError::DiskAllocation)?;
            swap_buffer = alloc_buffer(max_block_size).ok_or(ConfigError::RamAllocation {
                count: 1,
                block_size: max_block_size,
            })?;
            disk = Some(swap);
        }

        let mut fifo = SwapFifo::new(max_ram_blocks);
        let coords: Vec<BlockCoord> = index.iter().map(|(coord, _)| coord).collect();
        let (ram_coords, disk_coords) = coords.split_at(ram_count);
        for (slot, &coord) in ram_coords.iter().enumerate() {
            index.set(coord, BlockLocation::Ram(slot));
            fifo.push(coord);
        }
        for (&coord, block) in disk_coords.iter().zip(disk_blocks) {
            index.set(coord, BlockLocation::Disk(block));
        }

        *self = Self {
            index,
            block_sizes: block_sizes.to_vec(),
            max_block_size,
            max_ram_blocks,
            max_disk_file_size,
            temp_dir: self.temp_dir.take(),
            slots,
            free_slots: Vec::new(),
            swap_buffer,
            fifo,
            disk,
            initialized: true,
            poisoned: false,
            swaps: 0,
        };

        debug!(
            bands = blocks_x.len(),
            total_blocks = total,
            ram_blocks = ram_count,
            disk_blocks = disk_count,
            swap_files = self.disk_file_count(),
            max_block_size,
            "initialized band blocks manager"
        );
        Ok(())
    }

    /// Release every buffer and swap file. Calling it twice is harmless.
    pub fn free(&mut self) {
        let temp_dir = self.temp_dir.take();
        *self = Self {
            temp_dir,
            ..Self::default()
        };
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether a swap failure has disabled block access
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Mutable view of block (`x`, `y`) of `band`, paging it in if needed.
    ///
    /// The slice is exactly the band's block size and stays valid until the
    /// next call on the manager.
    ///
    /// # Panics
    ///
    /// Panics when the manager is not initialized or the coordinate is
    /// outside the layout.
    pub fn block_mut(&mut self, band: usize, x: usize, y: usize) -> Result<&mut [u8], SwapError> {
        let slot = self.resolve(band, x, y)?;
        let size = self.block_sizes[band];
        Ok(&mut self.slots[slot][..size])
    }

    /// Shared view of a block; paging it in still needs `&mut self`.
    pub fn block(&mut self, band: usize, x: usize, y: usize) -> Result<&[u8], SwapError> {
        self.block_mut(band, x, y).map(|b| &*b)
    }

    fn resolve(&mut self, band: usize, x: usize, y: usize) -> Result<SlotId, SwapError> {
        assert!(self.initialized, "band blocks manager used before initialize");
        assert!(
            band < self.index.band_count(),
            "band {band} out of range ({} bands)",
            self.index.band_count()
        );
        if self.poisoned {
            return Err(SwapError::Poisoned);
        }

        let coord = BlockCoord::new(band, x, y);
        match self.index.location(coord) {
            BlockLocation::Ram(slot) => Ok(slot),
            BlockLocation::Disk(block) => {
                let loaded = match self.free_slots.pop() {
                    Some(slot) => self.load_into_free(coord, block, slot),
                    None => self.swap_in(coord, block),
                };
                if let Err(e) = &loaded {
                    error!(band, x, y, error = %e, "swap failed, disabling block access");
                    self.poisoned = true;
                }
                loaded
            }
            BlockLocation::Pending => {
                panic!("block {coord:?} accessed before being bound to storage")
            }
        }
    }

    fn load_into_free(
        &mut self,
        coord: BlockCoord,
        block: DiskBlock,
        slot: SlotId,
    ) -> Result<SlotId, SwapError> {
        let Some(disk) = self.disk.as_mut() else {
            unreachable!("disk resident block without swap files");
        };
        if let Err(e) = disk.read_block(block, &mut self.slots[slot]) {
            self.free_slots.push(slot);
            return Err(e);
        }
        disk.release(block);
        self.index.set(coord, BlockLocation::Ram(slot));
        self.fifo.push(coord);
        trace!(?coord, slot, "loaded block into free slot");
        Ok(slot)
    }

    fn swap_in(&mut self, coord: BlockCoord, block: DiskBlock) -> Result<SlotId, SwapError> {
        let Some(victim) = self.fifo.front() else {
            unreachable!("no RAM block to evict and no free slot");
        };
        let BlockLocation::Ram(victim_slot) = self.index.location(victim) else {
            unreachable!("FIFO entry {victim:?} is not RAM resident");
        };

        let Some(disk) = &self.disk else {
            unreachable!("disk resident block without swap files");
        };
        disk.read_block(block, &mut self.swap_buffer)?;
        disk.write_block(block, &self.slots[victim_slot])?;
        std::mem::swap(&mut self.slots[victim_slot], &mut self.swap_buffer);

        self.index.set(victim, BlockLocation::Disk(block));
        self.index.set(coord, BlockLocation::Ram(victim_slot));
        self.fifo.rotate(coord);
        self.swaps += 1;

        trace!(?coord, ?victim, file = block.file, offset = block.offset, "swapped block");
        Ok(victim_slot)
    }

    // Layout queries

    pub fn band_count(&self) -> usize {
        self.index.band_count()
    }

    pub fn blocks_x(&self, band: usize) -> usize {
        self.index.blocks_x(band)
    }

    pub fn blocks_y(&self, band: usize) -> usize {
        self.index.blocks_y(band)
    }

    pub fn block_size_bytes(&self, band: usize) -> usize {
        self.block_sizes[band]
    }

    /// Size of every RAM buffer and swap slot
    pub fn max_block_size_bytes(&self) -> usize {
        self.max_block_size
    }

    pub fn max_ram_blocks(&self) -> usize {
        self.max_ram_blocks
    }

    pub fn total_blocks(&self) -> usize {
        self.index.total_blocks()
    }

    // Residency statistics

    pub fn ram_resident_blocks(&self) -> usize {
        self.fifo.len()
    }

    pub fn disk_resident_blocks(&self) -> usize {
        self.index
            .iter()
            .filter(|(_, loc)| matches!(loc, BlockLocation::Disk(_)))
            .count()
    }

    /// RAM buffers currently allocated, bound or free
    pub fn ram_buffers(&self) -> usize {
        self.slots.len()
    }

    pub fn disk_file_count(&self) -> usize {
        self.disk.as_ref().map_or(0, DiskSwap::file_count)
    }

    /// Number of evictions performed since initialization
    pub fn swap_count(&self) -> u64 {
        self.swaps
    }

    /// # Panics
    ///
    /// Panics when the coordinate is outside the layout.
    pub fn residency(&self, band: usize, x: usize, y: usize) -> Residency {
        match self.index.location(BlockCoord::new(band, x, y)) {
            BlockLocation::Ram(_) => Residency::Ram,
            BlockLocation::Disk(_) => Residency::Disk,
            BlockLocation::Pending => unreachable!("pending block outside a reshape"),
        }
    }

    /// RAM resident blocks in eviction order, next victim first
    pub fn eviction_order(&self) -> Vec<BlockCoord> {
        self.fifo.iter().copied().collect()
    }

    // Growth

    pub fn add_top_blocks(
        &mut self,
        band: usize,
        count: usize,
    ) -> Result<Vec<BlockCoord>, ConfigError> {
        self.grow_rows(band, Edge::Start, count)
    }

    pub fn add_bottom_blocks(
        &mut self,
        band: usize,
        count: usize,
    ) -> Result<Vec<BlockCoord>, ConfigError> {
        self.grow_rows(band, Edge::End, count)
    }

    pub fn add_left_blocks(
        &mut self,
        band: usize,
        count: usize,
    ) -> Result<Vec<BlockCoord>, ConfigError> {
        self.grow_cols(band, Edge::Start, count)
    }

    pub fn add_right_blocks(
        &mut self,
        band: usize,
        count: usize,
    ) -> Result<Vec<BlockCoord>, ConfigError> {
        self.grow_cols(band, Edge::End, count)
    }

    /// Insert `count` bands before the first one, laid out like the current first band.
    pub fn add_top_bands(&mut self, count: usize) -> Result<Vec<BlockCoord>, ConfigError> {
        self.grow_bands(Edge::Start, count)
    }

    /// Append `count` bands, laid out like the current last band.
    pub fn add_bottom_bands(&mut self, count: usize) -> Result<Vec<BlockCoord>, ConfigError> {
        self.grow_bands(Edge::End, count)
    }

    fn check_band(&self, band: usize) -> Result<(), ConfigError> {
        assert!(self.initialized, "band blocks manager used before initialize");
        if band >= self.index.band_count() {
            return Err(ConfigError::BandOutOfRange {
                band,
                bands: self.index.band_count(),
            });
        }
        Ok(())
    }

    fn grow_rows(
        &mut self,
        band: usize,
        edge: Edge,
        count: usize,
    ) -> Result<Vec<BlockCoord>, ConfigError> {
        self.check_band(band)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let locations = self.provision(count * self.index.blocks_x(band))?;
        let added = self.index.insert_rows(band, edge, count);
        if edge == Edge::Start {
            self.fifo.remap(|c| {
                if c.band == band {
                    c.y += count;
                }
            });
        }
        self.populate(&added, locations);
        debug!(band, count, ?edge, "added block rows");
        Ok(added)
    }

    fn grow_cols(
        &mut self,
        band: usize,
        edge: Edge,
        count: usize,
    ) -> Result<Vec<BlockCoord>, ConfigError> {
        self.check_band(band)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let locations = self.provision(count * self.index.blocks_y(band))?;
        let added = self.index.insert_cols(band, edge, count);
        if edge == Edge::Start {
            self.fifo.remap(|c| {
                if c.band == band {
                    c.x += count;
                }
            });
        }
        self.populate(&added, locations);
        debug!(band, count, ?edge, "added block columns");
        Ok(added)
    }

    fn grow_bands(&mut self, edge: Edge, count: usize) -> Result<Vec<BlockCoord>, ConfigError> {
        self.check_band(0)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let template = match edge {
            Edge::Start => 0,
            Edge::End => self.index.band_count() - 1,
        };
        let (bx, by) = (self.index.blocks_x(template), self.index.blocks_y(template));
        let block_size = self.block_sizes[template];

        let locations = self.provision(count * bx * by)?;
        let added = self.index.insert_bands(edge, count, bx, by);
        let at = match edge {
            Edge::Start => 0,
            Edge::End => self.block_sizes.len(),
        };
        for _ in 0..count {
            self.block_sizes.insert(at, block_size);
        }
        if edge == Edge::Start {
            self.fifo.remap(|c| c.band += count);
        }
        self.populate(&added, locations);
        debug!(count, ?edge, "added bands");
        Ok(added)
    }

    /// Storage for `count` new blocks: free RAM slots, then new RAM buffers
    /// up to the cap, then swap slots.
    ///
    /// Nothing is committed unless every allocation succeeds.
    fn provision(&mut self, count: usize) -> Result<Vec<BlockLocation>, ConfigError> {
        let from_free = count.min(self.free_slots.len());
        let new_ram = (count - from_free).min(self.max_ram_blocks - self.slots.len());
        let to_disk = count - from_free - new_ram;

        let buffers = alloc_buffers(new_ram, self.max_block_size)?;
        let swap_buffer = if to_disk > 0 && self.swap_buffer.is_empty() {
            let buffer = alloc_buffer(self.max_block_size).ok_or(ConfigError::RamAllocation {
                count: 1,
                block_size: self.max_block_size,
            })?;
            Some(buffer)
        } else {
            None
        };
        let disk_blocks = if to_disk > 0 {
            let (block_size, max_file, dir) = (
                self.max_block_size,
                self.max_disk_file_size,
                self.temp_dir.clone(),
            );
            self.disk
                .get_or_insert_with(|| DiskSwap::new(block_size, max_file, dir))
                .allocate(to_disk)
                .map_err(ConfigError::DiskAllocation)?
        } else {
            Vec::new()
        };

        let mut locations = Vec::with_capacity(count);
        let reused = self.free_slots.split_off(self.free_slots.len() - from_free);
        locations.extend(reused.into_iter().map(BlockLocation::Ram));
        for buffer in buffers {
            self.slots.push(buffer);
            locations.push(BlockLocation::Ram(self.slots.len() - 1));
        }
        if let Some(buffer) = swap_buffer {
            self.swap_buffer = buffer;
        }
        locations.extend(disk_blocks.into_iter().map(BlockLocation::Disk));
        Ok(locations)
    }

    fn populate(&mut self, coords: &[BlockCoord], locations: Vec<BlockLocation>) {
        debug_assert_eq!(coords.len(), locations.len());
        for (&coord, location) in coords.iter().zip(locations) {
            self.index.set(coord, location);
            if matches!(location, BlockLocation::Ram(_)) {
                self.fifo.push(coord);
            }
        }
    }

    // Shrinking

    pub fn remove_top_blocks(&mut self, band: usize, count: usize) -> Result<(), ConfigError> {
        self.shrink_rows(band, Edge::Start, count)
    }

    pub fn remove_bottom_blocks(&mut self, band: usize, count: usize) -> Result<(), ConfigError> {
        self.shrink_rows(band, Edge::End, count)
    }

    pub fn remove_left_blocks(&mut self, band: usize, count: usize) -> Result<(), ConfigError> {
        self.shrink_cols(band, Edge::Start, count)
    }

    pub fn remove_right_blocks(&mut self, band: usize, count: usize) -> Result<(), ConfigError> {
        self.shrink_cols(band, Edge::End, count)
    }

    pub fn remove_top_bands(&mut self, count: usize) -> Result<(), ConfigError> {
        self.shrink_bands(Edge::Start, count)
    }

    pub fn remove_bottom_bands(&mut self, count: usize) -> Result<(), ConfigError> {
        self.shrink_bands(Edge::End, count)
    }

    fn check_shrink(
        what: &'static str,
        requested: usize,
        available: usize,
    ) -> Result<(), ConfigError> {
        if requested >= available {
            return Err(ConfigError::InvalidShrink {
                what,
                requested,
                available,
            });
        }
        Ok(())
    }

    fn shrink_rows(&mut self, band: usize, edge: Edge, count: usize) -> Result<(), ConfigError> {
        self.check_band(band)?;
        let rows = self.index.blocks_y(band);
        Self::check_shrink("block rows", count, rows)?;
        if count == 0 {
            return Ok(());
        }

        let removed_rows = match edge {
            Edge::Start => 0..count,
            Edge::End => rows - count..rows,
        };
        self.fifo
            .retain(|c| !(c.band == band && removed_rows.contains(&c.y)));
        let removed = self.index.remove_rows(band, edge, count);
        self.reclaim(removed);
        if edge == Edge::Start {
            self.fifo.remap(|c| {
                if c.band == band {
                    c.y -= count;
                }
            });
        }
        debug!(band, count, ?edge, "removed block rows");
        Ok(())
    }

    fn shrink_cols(&mut self, band: usize, edge: Edge, count: usize) -> Result<(), ConfigError> {
        self.check_band(band)?;
        let cols = self.index.blocks_x(band);
        Self::check_shrink("block columns", count, cols)?;
        if count == 0 {
            return Ok(());
        }

        let removed_cols = match edge {
            Edge::Start => 0..count,
            Edge::End => cols - count..cols,
        };
        self.fifo
            .retain(|c| !(c.band == band && removed_cols.contains(&c.x)));
        let removed = self.index.remove_cols(band, edge, count);
        self.reclaim(removed);
        if edge == Edge::Start {
            self.fifo.remap(|c| {
                if c.band == band {
                    c.x -= count;
                }
            });
        }
        debug!(band, count, ?edge, "removed block columns");
        Ok(())
    }

    fn shrink_bands(&mut self, edge: Edge, count: usize) -> Result<(), ConfigError> {
        self.check_band(0)?;
        let bands = self.index.band_count();
        Self::check_shrink("bands", count, bands)?;
        if count == 0 {
            return Ok(());
        }

        let removed_bands = match edge {
            Edge::Start => 0..count,
            Edge::End => bands - count..bands,
        };
        self.fifo.retain(|c| !removed_bands.contains(&c.band));
        let removed = self.index.remove_bands(edge, count);
        self.block_sizes.drain(removed_bands);
        self.reclaim(removed);
        if edge == Edge::Start {
            self.fifo.remap(|c| c.band -= count);
        }
        debug!(count, ?edge, "removed bands");
        Ok(())
    }

    fn reclaim(&mut self, removed: Vec<BlockLocation>) {
        for location in removed {
            match location {
                BlockLocation::Ram(slot) => self.free_slots.push(slot),
                BlockLocation::Disk(block) => {
                    if let Some(disk) = self.disk.as_mut() {
                        disk.release(block);
                    }
                }
                BlockLocation::Pending => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(
        max_ram: usize,
        bx: usize,
        by: usize,
        block_size: usize,
        file: u64,
    ) -> BandBlocksManager {
        let mut m = BandBlocksManager::new();
        m.initialize(max_ram, &[bx], &[by], &[block_size], file).unwrap();
        m
    }

    fn stamp(m: &mut BandBlocksManager, band: usize, x: usize, y: usize) {
        let tag = (band * 100 + y * 10 + x) as u8;
        m.block_mut(band, x, y).unwrap().fill(tag);
    }

    fn check(m: &mut BandBlocksManager, band: usize, x: usize, y: usize) {
        let tag = (band * 100 + y * 10 + x) as u8;
        let block = m.block(band, x, y).unwrap();
        assert!(block.iter().all(|&b| b == tag), "block ({band}, {x}, {y}) corrupted");
    }

    #[test]
    fn test_everything_fits_in_ram() {
        let m = manager(100, 3, 2, 16, 1024);
        assert!(m.is_initialized());
        assert_eq!(m.ram_resident_blocks(), 6);
        assert_eq!(m.ram_buffers(), 6);
        assert_eq!(m.disk_file_count(), 0);
        assert_eq!(m.disk_resident_blocks(), 0);
    }

    #[test]
    fn test_rejects_bad_layouts() {
        let mut m = BandBlocksManager::new();
        assert!(matches!(m.initialize(4, &[], &[], &[], 1024), Err(ConfigError::NoBands)));
        assert!(matches!(
            m.initialize(4, &[1], &[1], &[0], 1024),
            Err(ConfigError::ZeroBlockSize { band: 0 })
        ));
        assert!(matches!(
            m.initialize(4, &[1, 0], &[1, 1], &[8, 8], 1024),
            Err(ConfigError::ZeroBlocks { band: 1, .. })
        ));
        assert!(matches!(
            m.initialize(0, &[1], &[1], &[8], 1024),
            Err(ConfigError::NoRamBlocks)
        ));
        assert!(!m.is_initialized());
    }

    #[test]
    fn test_bands_with_different_block_sizes() {
        let mut m = BandBlocksManager::new();
        m.initialize(2, &[2, 1], &[1, 2], &[4, 12], 48).unwrap();

        assert_eq!(m.max_block_size_bytes(), 12);
        assert_eq!(m.block_mut(0, 1, 0).unwrap().len(), 4);
        assert_eq!(m.block_mut(1, 0, 1).unwrap().len(), 12);

        for (band, x, y) in [(0, 0, 0), (0, 1, 0), (1, 0, 0), (1, 0, 1)] {
            stamp(&mut m, band, x, y);
        }
        for (band, x, y) in [(1, 0, 1), (0, 0, 0), (1, 0, 0), (0, 1, 0)] {
            check(&mut m, band, x, y);
        }
    }

    #[test]
    fn test_poisoned_after_swap_failure() {
        let mut m = manager(1, 2, 1, 8, 64);
        if let Some(disk) = m.disk.as_ref() {
            disk.truncate_files();
        }

        assert!(matches!(m.block_mut(0, 1, 0), Err(SwapError::Read { .. })));
        assert!(m.is_poisoned());
        assert!(matches!(m.block_mut(0, 0, 0), Err(SwapError::Poisoned)));
    }

    #[test]
    fn test_free_slots_are_used_before_swapping() {
        let mut m = manager(2, 4, 1, 8, 64);
        for x in 0..4 {
            stamp(&mut m, 0, x, 0);
        }
        // Blocks 2 and 3 now hold the RAM buffers
        m.remove_right_blocks(0, 2).unwrap();
        assert_eq!(m.ram_resident_blocks(), 0);
        assert_eq!(m.ram_buffers(), 2);

        let swaps = m.swap_count();
        check(&mut m, 0, 1, 0);
        check(&mut m, 0, 0, 0);
        assert_eq!(m.swap_count(), swaps);
        assert_eq!(m.ram_resident_blocks(), 2);
        assert_eq!(m.disk_resident_blocks(), 0);
    }

    #[test]
    fn test_add_blocks_shift_fifo() {
        let mut m = manager(4, 2, 2, 8, 64);
        stamp(&mut m, 0, 0, 0);
        let added = m.add_top_blocks(0, 1).unwrap();

        assert_eq!(added, vec![BlockCoord::new(0, 0, 0), BlockCoord::new(0, 1, 0)]);
        assert_eq!(m.blocks_y(0), 3);
        assert_eq!(m.eviction_order()[0], BlockCoord::new(0, 0, 1));
        assert_eq!(m.block(0, 0, 1).unwrap()[0], 0);
        // The old (0, 0) block moved one row down with its content
        m.block_mut(0, 0, 1).unwrap().fill(42);
        m.block_mut(0, 1, 0).unwrap();
        m.block_mut(0, 0, 0).unwrap();
        assert_eq!(m.block(0, 0, 1).unwrap()[0], 42);
    }

    #[test]
    fn test_grow_bands_and_shrink_back() {
        let mut m = manager(2, 2, 1, 8, 64);
        stamp(&mut m, 0, 0, 0);
        stamp(&mut m, 0, 1, 0);

        let added = m.add_top_bands(1).unwrap();
        assert_eq!(added.len(), 2);
        assert_eq!(m.band_count(), 2);
        assert_eq!(m.residency(0, 0, 0), Residency::Disk);
        assert!(m.disk_file_count() >= 1);
        assert_eq!(m.block(1, 1, 0).unwrap()[0], 1);

        m.remove_top_bands(1).unwrap();
        assert_eq!(m.band_count(), 1);
        check(&mut m, 0, 0, 0);
        check(&mut m, 0, 1, 0);
    }

    #[test]
    fn test_invalid_shrink() {
        let mut m = manager(2, 2, 2, 8, 64);
        assert!(matches!(
            m.remove_bottom_blocks(0, 2),
            Err(ConfigError::InvalidShrink { requested: 2, available: 2, .. })
        ));
        assert!(matches!(m.remove_top_bands(1), Err(ConfigError::InvalidShrink { .. })));
        assert!(matches!(
            m.add_left_blocks(3, 1),
            Err(ConfigError::BandOutOfRange { band: 3, bands: 1 })
        ));
    }

    #[test]
    #[should_panic(expected = "before initialize")]
    fn test_access_before_initialize() {
        let mut m = BandBlocksManager::new();
        let _ = m.block_mut(0, 0, 0);
    }
}
