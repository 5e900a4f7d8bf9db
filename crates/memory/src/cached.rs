//! Bounded block cache in front of a slower block source.
//!
//! [`CachedBlocks`] keeps at most `capacity` blocks of a [`BlockSource`] in
//! RAM and evicts them round-robin, writing each victim back when the source
//! accepts writes. With a non-zero prefetch threshold it watches the
//! direction of consecutive misses and reads the next block along that
//! direction ahead of time, so a sequential scan finds it already loaded.

use crate::budget;
use crate::error::{ConfigError, Result};
use crate::fifo::SwapFifo;
use crate::index::BlockCoord;
use crate::manager::alloc_buffer;
use crate::options::RasterOptions;
use tracing::{trace, warn};

/// Anything that can read and write whole blocks of a banded raster.
pub trait BlockSource {
    fn band_count(&self) -> usize;

    fn blocks_x(&self, band: usize) -> usize;

    fn blocks_y(&self, band: usize) -> usize;

    fn block_size_bytes(&self, band: usize) -> usize;

    /// Whether evicted blocks must be written back
    fn is_writable(&self) -> bool {
        true
    }

    /// Fill `buf` (exactly one block long) with block (`x`, `y`) of `band`.
    fn read_block(&mut self, band: usize, x: usize, y: usize, buf: &mut [u8]) -> Result<()>;

    /// Store `buf` (exactly one block long) as block (`x`, `y`) of `band`.
    fn write_block(&mut self, band: usize, x: usize, y: usize, buf: &[u8]) -> Result<()>;
}

/// Direction tracker for sequential read-ahead
#[derive(Debug)]
struct ReadAhead {
    threshold: u32,
    /// Accumulated steps per axis, ordered band, y, x
    direction: [i64; 3],
    last: [i64; 3],
    ready: Option<BlockCoord>,
    buffer: Box<[u8]>,
}

impl ReadAhead {
    fn new(threshold: u32) -> Self {
        Self {
            threshold,
            direction: [0; 3],
            last: [0; 3],
            ready: None,
            buffer: Box::default(),
        }
    }

    /// Record a miss at `coord` and pick the block to read next, if any.
    ///
    /// Steps of at most one block on every axis accumulate; a jump resets
    /// the direction. An axis whose accumulated steps reach the threshold
    /// yields one step along it and gives one step back.
    fn observe<S: BlockSource>(&mut self, coord: BlockCoord, source: &S) -> Option<BlockCoord> {
        let current = [coord.band as i64, coord.y as i64, coord.x as i64];
        let delta: [i64; 3] = std::array::from_fn(|axis| current[axis] - self.last[axis]);
        self.last = current;

        if delta.iter().any(|d| d.abs() >= 2) {
            self.direction = [0; 3];
            return None;
        }

        let mut next = current;
        let mut moved = false;
        for axis in 0..3 {
            self.direction[axis] += delta[axis];
            let step = self.direction[axis].signum();
            if step == 0 || self.direction[axis].unsigned_abs() < u64::from(self.threshold) {
                continue;
            }
            self.direction[axis] -= step;

            let candidate = current[axis] + step;
            let limit = match axis {
                0 => source.band_count(),
                1 => source.blocks_y(next[0] as usize),
                _ => source.blocks_x(next[0] as usize),
            };
            if candidate >= 0 && (candidate as usize) < limit {
                next[axis] = candidate;
                moved = true;
            }
        }
        if !moved {
            return None;
        }

        let band = next[0] as usize;
        let (y, x) = (next[1] as usize, next[2] as usize);
        // a band step may land outside a smaller band
        (y < source.blocks_y(band) && x < source.blocks_x(band))
            .then(|| BlockCoord::new(band, x, y))
    }
}

fn max_block_size<S: BlockSource>(source: &S) -> usize {
    (0..source.band_count())
        .map(|b| source.block_size_bytes(b))
        .max()
        .unwrap_or(0)
}

fn source_of<S>(source: &mut Option<S>) -> &mut S {
    match source {
        Some(source) => source,
        None => unreachable!("block source used after into_inner"),
    }
}

/// FIFO block cache over a [`BlockSource`].
///
/// Dropping the cache writes every cached block back; failures at that point
/// can only be logged, so call [`flush`](Self::flush) or
/// [`into_inner`](Self::into_inner) to observe them.
#[derive(Debug)]
pub struct CachedBlocks<S: BlockSource> {
    source: Option<S>,
    capacity: usize,
    max_block_size: usize,
    /// Per band, `blocks_x * blocks_y` cells with the buffer index of cached blocks
    cells: Vec<Vec<Option<usize>>>,
    buffers: Vec<Box<[u8]>>,
    spare: Box<[u8]>,
    fifo: SwapFifo,
    read_ahead: Option<ReadAhead>,
    misses: u64,
    prefetch_hits: u64,
}

impl<S: BlockSource> CachedBlocks<S> {
    /// Cache at most `max_cache_blocks` blocks (at least one, at most all of
    /// them). A `prefetch_threshold` of 0 disables read-ahead.
    pub fn new(source: S, max_cache_blocks: usize, prefetch_threshold: u32) -> Self {
        let cells: Vec<Vec<Option<usize>>> = (0..source.band_count())
            .map(|b| vec![None; source.blocks_x(b) * source.blocks_y(b)])
            .collect();
        let total: usize = cells.iter().map(Vec::len).sum();
        let capacity = max_cache_blocks.min(total).max(1);
        let max_block_size = max_block_size(&source);

        Self {
            source: Some(source),
            capacity,
            max_block_size,
            cells,
            buffers: Vec::new(),
            spare: Box::default(),
            fifo: SwapFifo::new(capacity),
            read_ahead: (prefetch_threshold > 0).then(|| ReadAhead::new(prefetch_threshold)),
            misses: 0,
            prefetch_hits: 0,
        }
    }

    /// Size the cache from a percentage of the host memory.
    pub fn from_mem_percent(source: S, percent: u8, prefetch_threshold: u32) -> Result<Self> {
        let blocks = budget::max_ram_blocks_for_percent(percent, max_block_size(&source))?;
        Ok(Self::new(source, blocks, prefetch_threshold))
    }

    /// Size the cache from the RAM budget of `options` and read ahead with
    /// its prefetch threshold.
    pub fn with_options(source: S, options: &RasterOptions) -> Result<Self> {
        options.validate()?;
        let blocks = options.ram_budget.max_ram_blocks(max_block_size(&source))?;
        Ok(Self::new(source, blocks, options.data_prefetch_threshold))
    }

    pub fn source(&self) -> &S {
        match &self.source {
            Some(source) => source,
            None => unreachable!("block source used after into_inner"),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cached_blocks(&self) -> usize {
        self.fifo.len()
    }

    pub fn is_cached(&self, band: usize, x: usize, y: usize) -> bool {
        self.cell_index(band, x, y).is_some_and(|i| self.cells[band][i].is_some())
    }

    /// Number of block requests that were not in the cache
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Misses served from the read-ahead buffer
    pub fn prefetch_hits(&self) -> u64 {
        self.prefetch_hits
    }

    /// Block waiting in the read-ahead buffer
    pub fn prefetched(&self) -> Option<BlockCoord> {
        self.read_ahead.as_ref().and_then(|r| r.ready)
    }

    fn cell_index(&self, band: usize, x: usize, y: usize) -> Option<usize> {
        let source = self.source();
        if band >= source.band_count() || x >= source.blocks_x(band) || y >= source.blocks_y(band) {
            return None;
        }
        Some(y * source.blocks_x(band) + x)
    }

    fn block_size(&self, band: usize) -> usize {
        self.source().block_size_bytes(band)
    }

    /// Mutable access to a block, loading it from the source on a miss.
    ///
    /// # Panics
    ///
    /// Panics when the coordinate is outside the source.
    pub fn block_mut(&mut self, band: usize, x: usize, y: usize) -> Result<&mut [u8]> {
        let Some(cell) = self.cell_index(band, x, y) else {
            panic!("block ({x}, {y}) of band {band} outside the cached source");
        };
        let size = self.block_size(band);
        let cached = self.cells[band][cell];
        let slot = match cached {
            Some(slot) => slot,
            None => self.load(BlockCoord::new(band, x, y), cell)?,
        };
        Ok(&mut self.buffers[slot][..size])
    }

    pub fn block(&mut self, band: usize, x: usize, y: usize) -> Result<&[u8]> {
        self.block_mut(band, x, y).map(|b| &*b)
    }

    fn alloc(&self) -> Result<Box<[u8]>> {
        alloc_buffer(self.max_block_size).ok_or_else(|| {
            ConfigError::RamAllocation {
                count: 1,
                block_size: self.max_block_size,
            }
            .into()
        })
    }

    /// Fetch `coord` into `buf`, taking it from the read-ahead buffer when it
    /// is the block waiting there.
    fn fetch(&mut self, coord: BlockCoord, buf: &mut Box<[u8]>) -> Result<()> {
        if let Some(ahead) = self.read_ahead.as_mut() {
            if ahead.ready == Some(coord) {
                std::mem::swap(buf, &mut ahead.buffer);
                ahead.ready = None;
                self.prefetch_hits += 1;
                return Ok(());
            }
        }
        let size = self.source().block_size_bytes(coord.band);
        source_of(&mut self.source).read_block(coord.band, coord.x, coord.y, &mut buf[..size])
    }

    fn load(&mut self, coord: BlockCoord, cell: usize) -> Result<usize> {
        self.misses += 1;

        let slot = if self.buffers.len() < self.capacity {
            let mut buffer = self.alloc()?;
            self.fetch(coord, &mut buffer)?;
            self.buffers.push(buffer);
            self.fifo.push(coord);
            self.buffers.len() - 1
        } else {
            if self.spare.is_empty() {
                self.spare = self.alloc()?;
            }
            let Some(victim) = self.fifo.front() else {
                unreachable!("full cache with an empty FIFO");
            };
            let victim_cell = y_x_cell(self.source(), victim);
            let Some(slot) = self.cells[victim.band][victim_cell] else {
                unreachable!("FIFO entry {victim:?} is not cached");
            };

            let mut spare = std::mem::take(&mut self.spare);
            let fetched = self.fetch(coord, &mut spare);
            self.spare = spare;
            fetched?;
            self.write_back(victim, slot)?;

            std::mem::swap(&mut self.buffers[slot], &mut self.spare);
            self.cells[victim.band][victim_cell] = None;
            self.fifo.rotate(coord);
            trace!(?victim, incoming = ?coord, "evicted cached block");
            slot
        };
        self.cells[coord.band][cell] = Some(slot);

        self.prefetch_after(coord);
        Ok(slot)
    }

    /// Read ahead after a miss at `coord`. Failures only drop the read-ahead
    /// block; the block itself reports the error when it is requested.
    fn prefetch_after(&mut self, coord: BlockCoord) {
        let Some(mut ahead) = self.read_ahead.take() else {
            return;
        };
        if let Err(e) = self.prefetch_into(&mut ahead, coord) {
            ahead.ready = None;
            warn!(error = %e, after = ?coord, "read-ahead failed");
        }
        self.read_ahead = Some(ahead);
    }

    fn prefetch_into(&mut self, ahead: &mut ReadAhead, coord: BlockCoord) -> Result<()> {
        let Some(next) = ahead.observe(coord, self.source()) else {
            return Ok(());
        };
        if ahead.ready == Some(next) || self.is_cached(next.band, next.x, next.y) {
            return Ok(());
        }
        if ahead.buffer.is_empty() {
            ahead.buffer = self.alloc()?;
        }
        ahead.ready = None;
        let size = self.block_size(next.band);
        source_of(&mut self.source).read_block(
            next.band,
            next.x,
            next.y,
            &mut ahead.buffer[..size],
        )?;
        ahead.ready = Some(next);
        trace!(block = ?next, "read ahead");
        Ok(())
    }

    fn write_back(&mut self, coord: BlockCoord, slot: usize) -> Result<()> {
        let source = source_of(&mut self.source);
        if !source.is_writable() {
            return Ok(());
        }
        let size = source.block_size_bytes(coord.band);
        source.write_block(coord.band, coord.x, coord.y, &self.buffers[slot][..size])
    }

    /// Write every cached block back to the source; blocks stay cached.
    pub fn flush(&mut self) -> Result<()> {
        let cached: Vec<BlockCoord> = self.fifo.iter().copied().collect();
        for coord in cached {
            let cell = y_x_cell(self.source(), coord);
            if let Some(slot) = self.cells[coord.band][cell] {
                self.write_back(coord, slot)?;
            }
        }
        Ok(())
    }

    /// Flush and hand the source back.
    pub fn into_inner(mut self) -> Result<S> {
        self.flush()?;
        match self.source.take() {
            Some(source) => Ok(source),
            None => unreachable!("block source used after into_inner"),
        }
    }
}

fn y_x_cell<S: BlockSource>(source: &S, coord: BlockCoord) -> usize {
    coord.y * source.blocks_x(coord.band) + coord.x
}

impl<S: BlockSource> Drop for CachedBlocks<S> {
    fn drop(&mut self) {
        if self.source.is_none() {
            return;
        }
        if let Err(e) = self.flush() {
            warn!(error = %e, "failed to write cached blocks back");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One band of `nx * ny` blocks of 4 bytes, counting I/O
    #[derive(Debug)]
    struct VecSource {
        nx: usize,
        ny: usize,
        blocks: Vec<[u8; 4]>,
        writable: bool,
        /// Column whose blocks cannot be read
        broken_x: Option<usize>,
        reads: Vec<(usize, usize)>,
        writes: usize,
    }

    impl VecSource {
        fn new(nx: usize, ny: usize) -> Self {
            Self {
                nx,
                ny,
                blocks: (0..nx * ny).map(|i| [i as u8; 4]).collect(),
                writable: true,
                broken_x: None,
                reads: Vec::new(),
                writes: 0,
            }
        }
    }

    impl BlockSource for VecSource {
        fn band_count(&self) -> usize {
            1
        }

        fn blocks_x(&self, _band: usize) -> usize {
            self.nx
        }

        fn blocks_y(&self, _band: usize) -> usize {
            self.ny
        }

        fn block_size_bytes(&self, _band: usize) -> usize {
            4
        }

        fn is_writable(&self) -> bool {
            self.writable
        }

        fn read_block(&mut self, _band: usize, x: usize, y: usize, buf: &mut [u8]) -> Result<()> {
            if self.broken_x == Some(x) {
                return Err(crate::error::SwapError::Poisoned.into());
            }
            self.reads.push((x, y));
            buf.copy_from_slice(&self.blocks[y * self.nx + x]);
            Ok(())
        }

        fn write_block(&mut self, _band: usize, x: usize, y: usize, buf: &[u8]) -> Result<()> {
            self.writes += 1;
            self.blocks[y * self.nx + x].copy_from_slice(buf);
            Ok(())
        }
    }

    #[test]
    fn test_capacity_is_clamped() {
        assert_eq!(CachedBlocks::new(VecSource::new(2, 2), 100, 0).capacity(), 4);
        assert_eq!(CachedBlocks::new(VecSource::new(2, 2), 0, 0).capacity(), 1);
    }

    #[test]
    fn test_eviction_writes_back() {
        let mut cache = CachedBlocks::new(VecSource::new(3, 1), 2, 0);
        cache.block_mut(0, 0, 0).unwrap().fill(100);
        cache.block_mut(0, 1, 0).unwrap();
        assert_eq!(cache.source().writes, 0);

        // third block evicts the first
        assert_eq!(cache.block(0, 2, 0).unwrap(), &[2; 4]);
        assert!(!cache.is_cached(0, 0, 0));
        assert_eq!(cache.source().writes, 1);
        assert_eq!(cache.source().blocks[0], [100; 4]);
        assert_eq!(cache.block(0, 0, 0).unwrap(), &[100; 4]);
        assert_eq!(cache.misses(), 4);
    }

    #[test]
    fn test_read_only_source_is_not_written() {
        let mut source = VecSource::new(2, 1);
        source.writable = false;
        let mut cache = CachedBlocks::new(source, 1, 0);
        cache.block_mut(0, 0, 0).unwrap().fill(7);
        cache.block_mut(0, 1, 0).unwrap();

        let source = cache.into_inner().unwrap();
        assert_eq!(source.writes, 0);
        assert_eq!(source.blocks[0], [0; 4]);
    }

    #[test]
    fn test_into_inner_flushes() {
        let mut cache = CachedBlocks::new(VecSource::new(2, 2), 4, 0);
        cache.block_mut(0, 1, 1).unwrap().fill(9);
        let source = cache.into_inner().unwrap();
        assert_eq!(source.blocks[3], [9; 4]);
    }

    #[test]
    fn test_sequential_scan_reads_ahead() {
        let mut cache = CachedBlocks::new(VecSource::new(6, 1), 2, 1);
        cache.block(0, 0, 0).unwrap();
        cache.block(0, 1, 0).unwrap();
        assert_eq!(cache.prefetched(), Some(BlockCoord::new(0, 2, 0)));

        assert_eq!(cache.block(0, 2, 0).unwrap(), &[2; 4]);
        assert_eq!(cache.prefetch_hits(), 1);
        assert_eq!(cache.prefetched(), Some(BlockCoord::new(0, 3, 0)));
        // every block read exactly once
        assert_eq!(cache.source().reads, vec![(0, 0), (1, 0), (2, 0), (3, 0)]);
    }

    #[test]
    fn test_failed_read_ahead_keeps_requested_block() {
        let mut source = VecSource::new(4, 1);
        source.broken_x = Some(2);
        let mut cache = CachedBlocks::new(source, 4, 1);
        cache.block(0, 0, 0).unwrap();

        // reading block 2 ahead fails, block 1 is still served
        assert_eq!(cache.block(0, 1, 0).unwrap(), &[1; 4]);
        assert!(cache.is_cached(0, 1, 0));
        assert_eq!(cache.prefetched(), None);

        assert!(cache.block(0, 2, 0).is_err());
        assert!(!cache.is_cached(0, 2, 0));
        assert_eq!(cache.block(0, 3, 0).unwrap(), &[3; 4]);
    }

    #[test]
    fn test_jump_resets_direction() {
        let mut cache = CachedBlocks::new(VecSource::new(8, 1), 2, 2);
        cache.block(0, 0, 0).unwrap();
        cache.block(0, 1, 0).unwrap();
        assert_eq!(cache.prefetched(), None);
        cache.block(0, 5, 0).unwrap();
        cache.block(0, 6, 0).unwrap();
        assert_eq!(cache.prefetched(), None);
        cache.block(0, 7, 0).unwrap();
        assert_eq!(cache.prefetched(), None);
    }
}
