//! # Tessella Memory
//!
//! Block storage engine for rasters larger than the RAM they are allowed to use.
//!
//! ## Components
//!
//! - **manager**: `BandBlocksManager`, bounded RAM blocks with FIFO swapping to temp files
//! - **disk**: swap files and block slots
//! - **index**: band × row × column map of where each block lives
//! - **band** / **raster**: pixel access and an expansible in-memory raster
//! - **cached**: FIFO block cache with read-ahead in front of any `BlockSource`
//! - **options** / **budget**: RAM budget and raster options

pub mod band;
pub mod budget;
pub mod cached;
pub mod disk;
pub mod error;
pub mod fifo;
pub mod index;
pub mod manager;
pub mod options;
pub mod raster;

pub use band::Band;
pub use budget::{HostMemory, max_ram_blocks_for_percent, ram_blocks_for_percent};
pub use cached::{BlockSource, CachedBlocks};
pub use disk::{DiskBlock, DiskSwap};
pub use error::{ConfigError, MemoryError, Result, SwapError};
pub use fifo::SwapFifo;
pub use index::{BlockCoord, BlockIndex, BlockLocation, Edge, SlotId};
pub use manager::{BandBlocksManager, Residency};
pub use options::{DEFAULT_MAX_DISK_FILE_SIZE, DEFAULT_MEM_PERCENT, RamBudget, RasterOptions};
pub use raster::MemoryRaster;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::band::Band;
    pub use crate::cached::{BlockSource, CachedBlocks};
    pub use crate::error::{ConfigError, MemoryError, Result, SwapError};
    pub use crate::manager::{BandBlocksManager, Residency};
    pub use crate::options::{RamBudget, RasterOptions};
    pub use crate::raster::MemoryRaster;
    pub use tessella_core::prelude::*;
}
