//! Swap files backing the blocks that do not fit in RAM.
//!
//! Each swap file is an anonymous temporary file cut into fixed slots of the
//! manager's maximum block size. The OS removes the files once they are
//! closed, so dropping a [`DiskSwap`] cleans everything up.

use crate::error::SwapError;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use tracing::debug;

/// Location of one block slot inside a swap file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiskBlock {
    pub file: usize,
    pub offset: u64,
}

/// Set of swap files plus the pool of slots not bound to any block.
#[derive(Debug)]
pub struct DiskSwap {
    files: Vec<File>,
    inactive: Vec<DiskBlock>,
    block_size: usize,
    blocks_per_file: usize,
    temp_dir: Option<PathBuf>,
}

impl DiskSwap {
    /// Create an empty swap area; no file is created until [`allocate`](Self::allocate).
    ///
    /// `block_size` must be non-zero and no larger than `max_file_size`.
    pub fn new(block_size: usize, max_file_size: u64, temp_dir: Option<PathBuf>) -> Self {
        debug_assert!(block_size > 0 && block_size as u64 <= max_file_size);
        let blocks_per_file = (max_file_size / block_size as u64).max(1) as usize;
        Self {
            files: Vec::new(),
            inactive: Vec::new(),
            block_size,
            blocks_per_file,
            temp_dir,
        }
    }

    pub fn blocks_per_file(&self) -> usize {
        self.blocks_per_file
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Number of slots not bound to a block
    pub fn inactive_count(&self) -> usize {
        self.inactive.len()
    }

    /// Reserve `count` slots, reusing inactive ones before creating files.
    ///
    /// On failure every slot taken so far, including the slots of files that
    /// were created, goes back to the inactive pool.
    pub fn allocate(&mut self, count: usize) -> io::Result<Vec<DiskBlock>> {
        let reused = count.min(self.inactive.len());
        let mut blocks: Vec<DiskBlock> = self.inactive.split_off(self.inactive.len() - reused);

        let mut missing = count - reused;
        while missing > 0 {
            let slots = missing.min(self.blocks_per_file);
            match self.create_file(slots) {
                Ok(file_index) => {
                    blocks.extend((0..slots).map(|slot| DiskBlock {
                        file: file_index,
                        offset: (slot * self.block_size) as u64,
                    }));
                    missing -= slots;
                }
                Err(e) => {
                    self.inactive.extend(blocks);
                    return Err(e);
                }
            }
        }

        Ok(blocks)
    }

    fn create_file(&mut self, slots: usize) -> io::Result<usize> {
        let file = match &self.temp_dir {
            Some(dir) => tempfile::tempfile_in(dir)?,
            None => tempfile::tempfile()?,
        };
        file.set_len((slots * self.block_size) as u64)?;
        self.files.push(file);

        let index = self.files.len() - 1;
        debug!(file = index, slots, block_size = self.block_size, "created swap file");
        Ok(index)
    }

    /// Return a slot to the inactive pool
    pub fn release(&mut self, block: DiskBlock) {
        debug_assert!(!self.inactive.contains(&block), "slot {block:?} released twice");
        self.inactive.push(block);
    }

    /// Cut every swap file to zero length so the next read comes up short
    #[cfg(test)]
    pub(crate) fn truncate_files(&self) {
        for file in &self.files {
            file.set_len(0).unwrap();
        }
    }

    /// Fill `buf` from a slot; `buf` must be exactly one block long
    pub fn read_block(&self, block: DiskBlock, buf: &mut [u8]) -> Result<(), SwapError> {
        debug_assert_eq!(buf.len(), self.block_size);
        let mut file = &self.files[block.file];
        file.seek(SeekFrom::Start(block.offset))
            .and_then(|_| file.read_exact(buf))
            .map_err(|source| SwapError::Read {
                file: block.file,
                offset: block.offset,
                source,
            })
    }

    /// Store `buf` into a slot; `buf` must be exactly one block long
    pub fn write_block(&self, block: DiskBlock, buf: &[u8]) -> Result<(), SwapError> {
        debug_assert_eq!(buf.len(), self.block_size);
        let mut file = &self.files[block.file];
        file.seek(SeekFrom::Start(block.offset))
            .and_then(|_| file.write_all(buf))
            .map_err(|source| SwapError::Write {
                file: block.file,
                offset: block.offset,
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_splits_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut swap = DiskSwap::new(100, 1000, Some(dir.path().to_path_buf()));

        let blocks = swap.allocate(12).unwrap();
        assert_eq!(blocks.len(), 12);
        assert_eq!(swap.blocks_per_file(), 10);
        assert_eq!(swap.file_count(), 2);
        assert_eq!(blocks[9], DiskBlock { file: 0, offset: 900 });
        assert_eq!(blocks[10], DiskBlock { file: 1, offset: 0 });
    }

    #[test]
    fn test_released_slots_are_reused() {
        let mut swap = DiskSwap::new(64, 64 * 4, None);
        let blocks = swap.allocate(4).unwrap();
        swap.release(blocks[2]);
        swap.release(blocks[0]);

        let again = swap.allocate(3).unwrap();
        assert_eq!(swap.file_count(), 2);
        assert!(again.contains(&blocks[0]));
        assert!(again.contains(&blocks[2]));
        assert_eq!(swap.inactive_count(), 0);
    }

    #[test]
    fn test_read_write_roundtrip() {
        let mut swap = DiskSwap::new(8, 32, None);
        let blocks = swap.allocate(3).unwrap();

        swap.write_block(blocks[1], &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        swap.write_block(blocks[2], &[9; 8]).unwrap();

        let mut buf = [0u8; 8];
        swap.read_block(blocks[1], &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);
        swap.read_block(blocks[0], &mut buf).unwrap();
        assert_eq!(buf, [0; 8]);
    }

    #[test]
    fn test_missing_temp_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let mut swap = DiskSwap::new(8, 64, Some(missing));

        assert!(swap.allocate(1).is_err());
        assert_eq!(swap.file_count(), 0);
    }
}
