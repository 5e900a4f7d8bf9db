//! RAM budget derived from the memory available on the host

use crate::error::ConfigError;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

/// Snapshot of host memory in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostMemory {
    pub total: u64,
    pub available: u64,
}

impl HostMemory {
    pub fn query() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
        );
        Self {
            total: system.total_memory(),
            available: system.available_memory(),
        }
    }

    /// Memory that may actually be claimed: the smaller of total and available.
    ///
    /// Hosts that do not report available memory (0) fall back to the total,
    /// so the budget there is a share of physical memory.
    pub fn usable(&self) -> u64 {
        match self.available {
            0 => self.total,
            available => available.min(self.total),
        }
    }
}

/// Number of blocks of `block_size` bytes that fit in `percent`% of usable memory.
///
/// Always at least one block so a raster can be opened on a host under
/// memory pressure.
pub fn ram_blocks_for_percent(
    percent: u8,
    block_size: usize,
    memory: HostMemory,
) -> Result<usize, ConfigError> {
    if percent == 0 || percent > 100 {
        return Err(ConfigError::MemPercentOutOfRange(percent.into()));
    }
    if block_size == 0 {
        return Err(ConfigError::ZeroBlockSize { band: 0 });
    }

    let budget = memory.usable() as u128 * percent as u128 / 100;
    let blocks = budget.div_ceil(block_size as u128);
    Ok(blocks.clamp(1, usize::MAX as u128) as usize)
}

/// Same as [`ram_blocks_for_percent`] against the current host memory
pub fn max_ram_blocks_for_percent(percent: u8, block_size: usize) -> Result<usize, ConfigError> {
    ram_blocks_for_percent(percent, block_size, HostMemory::query())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1 << 30;

    #[test]
    fn test_percent_of_available_memory() {
        let memory = HostMemory {
            total: 8 * GIB,
            available: 4 * GIB,
        };
        // 50% of 4 GiB in 1 MiB blocks
        assert_eq!(ram_blocks_for_percent(50, 1 << 20, memory).unwrap(), 2048);
        // rounds up
        assert_eq!(ram_blocks_for_percent(1, 3 * (1 << 20), memory).unwrap(), 14);
    }

    #[test]
    fn test_at_least_one_block() {
        let memory = HostMemory { total: 1024, available: 0 };
        assert_eq!(ram_blocks_for_percent(1, 1 << 20, memory).unwrap(), 1);
    }

    #[test]
    fn test_unreported_available_uses_total() {
        let memory = HostMemory { total: 2 * GIB, available: 0 };
        assert_eq!(memory.usable(), 2 * GIB);
        assert_eq!(ram_blocks_for_percent(50, 1 << 20, memory).unwrap(), 1024);
    }

    #[test]
    fn test_percent_out_of_range() {
        let memory = HostMemory { total: GIB, available: GIB };
        assert!(matches!(
            ram_blocks_for_percent(0, 64, memory),
            Err(ConfigError::MemPercentOutOfRange(0))
        ));
        assert!(matches!(
            ram_blocks_for_percent(101, 64, memory),
            Err(ConfigError::MemPercentOutOfRange(101))
        ));
    }

    #[test]
    fn test_host_query() {
        let memory = HostMemory::query();
        assert!(memory.usable() <= memory.total);
        assert!(max_ram_blocks_for_percent(10, 4096).unwrap() >= 1);
    }
}
