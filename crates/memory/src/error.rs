//! Error types for the block memory engine.
//!
//! Configuration problems are reported as [`ConfigError`] and leave the
//! manager untouched. Disk failures while paging blocks are [`SwapError`]s:
//! after one, the manager no longer trusts its swap files and refuses any
//! further block access.

use std::io;
use thiserror::Error;

/// Recoverable errors raised while configuring or reshaping a manager.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no bands given")]
    NoBands,

    #[error("band layout lengths differ: {blocks_x} x, {blocks_y} y, {block_sizes} sizes")]
    BandCountMismatch {
        blocks_x: usize,
        blocks_y: usize,
        block_sizes: usize,
    },

    #[error("band {band} has no blocks ({blocks_x}x{blocks_y})")]
    ZeroBlocks {
        band: usize,
        blocks_x: usize,
        blocks_y: usize,
    },

    #[error("band {band} has a zero block size")]
    ZeroBlockSize { band: usize },

    #[error("block of {block_size} bytes does not fit a {max_disk_file_size} byte swap file")]
    BlockLargerThanDiskFile {
        block_size: usize,
        max_disk_file_size: u64,
    },

    #[error("at least one RAM block is required")]
    NoRamBlocks,

    #[error("memory percentage {0} outside 1..=100")]
    MemPercentOutOfRange(u32),

    #[error("could not allocate {count} RAM blocks of {block_size} bytes")]
    RamAllocation { count: usize, block_size: usize },

    #[error("could not create swap file: {0}")]
    DiskAllocation(#[source] io::Error),

    #[error("cannot remove {requested} of {available} {what}")]
    InvalidShrink {
        what: &'static str,
        requested: usize,
        available: usize,
    },

    #[error("band {band} out of range ({bands} bands)")]
    BandOutOfRange { band: usize, bands: usize },

    #[error("invalid option {key} = {value:?}: {reason}")]
    InvalidOption {
        key: String,
        value: String,
        reason: String,
    },
}

/// Fatal I/O failure while moving a block between RAM and a swap file.
#[derive(Error, Debug)]
pub enum SwapError {
    #[error("reading block at offset {offset} of swap file {file} failed: {source}")]
    Read {
        file: usize,
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("writing block at offset {offset} of swap file {file} failed: {source}")]
    Write {
        file: usize,
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("manager disabled by an earlier swap failure")]
    Poisoned,
}

/// Errors of the raster level API.
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Swap(#[from] SwapError),

    #[error(transparent)]
    Core(#[from] tessella_core::Error),

    #[error("block buffer holds {actual} bytes, block size is {expected}")]
    BlockSizeMismatch { expected: usize, actual: usize },
}

impl MemoryError {
    /// Whether the manager behind this error can still be used
    pub fn is_fatal(&self) -> bool {
        matches!(self, MemoryError::Swap(_))
    }
}

/// Result alias for raster level operations.
pub type Result<T> = std::result::Result<T, MemoryError>;
