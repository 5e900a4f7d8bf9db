//! Raster creation options

use crate::budget;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Default cap of a single swap file (2 GiB)
pub const DEFAULT_MAX_DISK_FILE_SIZE: u64 = 2_147_483_648;

pub const DEFAULT_MEM_PERCENT: u8 = 50;

/// How many blocks may stay in RAM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RamBudget {
    /// Percentage (1..=100) of the memory available on the host
    MemPercent(u8),
    /// Absolute number of blocks
    Blocks(usize),
}

impl Default for RamBudget {
    fn default() -> Self {
        RamBudget::MemPercent(DEFAULT_MEM_PERCENT)
    }
}

impl RamBudget {
    /// Resolve to a block count for blocks of `max_block_size` bytes
    pub fn max_ram_blocks(&self, max_block_size: usize) -> Result<usize, ConfigError> {
        match *self {
            RamBudget::MemPercent(percent) => {
                budget::max_ram_blocks_for_percent(percent, max_block_size)
            }
            RamBudget::Blocks(0) => Err(ConfigError::NoRamBlocks),
            RamBudget::Blocks(blocks) => Ok(blocks),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            RamBudget::MemPercent(p) if p == 0 || p > 100 => {
                Err(ConfigError::MemPercentOutOfRange(p.into()))
            }
            RamBudget::Blocks(0) => Err(ConfigError::NoRamBlocks),
            _ => Ok(()),
        }
    }
}

/// Options for memory rasters and block caches.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use tessella_memory::{RamBudget, RasterOptions};
///
/// let options: RasterOptions = serde_json::from_str(r#"{"ram_budget": {"blocks": 16}}"#).unwrap();
/// assert_eq!(options.ram_budget, RamBudget::Blocks(16));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterOptions {
    pub ram_budget: RamBudget,
    /// Read-ahead trigger for cached access: 0 disables it, `n` prefetches
    /// once reads have moved `n` blocks in the same direction
    pub data_prefetch_threshold: u32,
    pub max_disk_file_size: u64,
    /// Directory for swap files, the system temp directory when unset
    pub temp_dir: Option<PathBuf>,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            ram_budget: RamBudget::default(),
            data_prefetch_threshold: 0,
            max_disk_file_size: DEFAULT_MAX_DISK_FILE_SIZE,
            temp_dir: None,
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidOption {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

impl RasterOptions {
    pub fn with_ram_blocks(mut self, blocks: usize) -> Self {
        self.ram_budget = RamBudget::Blocks(blocks);
        self
    }

    pub fn with_mem_percent(mut self, percent: u8) -> Self {
        self.ram_budget = RamBudget::MemPercent(percent);
        self
    }

    pub fn with_prefetch_threshold(mut self, threshold: u32) -> Self {
        self.data_prefetch_threshold = threshold;
        self
    }

    pub fn with_max_disk_file_size(mut self, bytes: u64) -> Self {
        self.max_disk_file_size = bytes;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Build options from driver style string pairs.
    ///
    /// Recognised keys: `MAX_MEM_PERCENT_USED`, `MAX_NUMBER_OF_RAM_BLOCKS`
    /// (wins over the percentage when both are given),
    /// `DATA_PREFETCH_THRESHOLD`, `MAX_DISK_FILE_SIZE` and `TEMP_DIR`.
    /// Other keys are ignored.
    pub fn from_info(info: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut options = Self::default();

        if let Some(value) = info.get("MAX_MEM_PERCENT_USED") {
            let percent: u32 = parse("MAX_MEM_PERCENT_USED", value)?;
            let percent = u8::try_from(percent)
                .map_err(|_| ConfigError::MemPercentOutOfRange(percent))?;
            options.ram_budget = RamBudget::MemPercent(percent);
        }
        if let Some(value) = info.get("MAX_NUMBER_OF_RAM_BLOCKS") {
            options.ram_budget = RamBudget::Blocks(parse("MAX_NUMBER_OF_RAM_BLOCKS", value)?);
        }
        if let Some(value) = info.get("DATA_PREFETCH_THRESHOLD") {
            options.data_prefetch_threshold = parse("DATA_PREFETCH_THRESHOLD", value)?;
        }
        if let Some(value) = info.get("MAX_DISK_FILE_SIZE") {
            options.max_disk_file_size = parse("MAX_DISK_FILE_SIZE", value)?;
        }
        if let Some(value) = info.get("TEMP_DIR") {
            options.temp_dir = Some(PathBuf::from(value));
        }

        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ram_budget.validate()?;
        if self.max_disk_file_size == 0 {
            return Err(ConfigError::InvalidOption {
                key: "max_disk_file_size".to_string(),
                value: "0".to_string(),
                reason: "swap files need room for at least one block".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let options = RasterOptions::default();
        assert_eq!(options.ram_budget, RamBudget::MemPercent(50));
        assert_eq!(options.max_disk_file_size, 2_147_483_648);
        assert_eq!(options.data_prefetch_threshold, 0);
    }

    #[test]
    fn test_from_info() {
        let options = RasterOptions::from_info(&info(&[
            ("MAX_MEM_PERCENT_USED", "30"),
            ("DATA_PREFETCH_THRESHOLD", "2"),
            ("MAX_DISK_FILE_SIZE", "1000"),
            ("UNRELATED", "x"),
        ]))
        .unwrap();

        assert_eq!(options.ram_budget, RamBudget::MemPercent(30));
        assert_eq!(options.data_prefetch_threshold, 2);
        assert_eq!(options.max_disk_file_size, 1000);
    }

    #[test]
    fn test_block_count_wins_over_percent() {
        let options = RasterOptions::from_info(&info(&[
            ("MAX_MEM_PERCENT_USED", "30"),
            ("MAX_NUMBER_OF_RAM_BLOCKS", "12"),
        ]))
        .unwrap();
        assert_eq!(options.ram_budget, RamBudget::Blocks(12));
        assert_eq!(options.ram_budget.max_ram_blocks(4096).unwrap(), 12);
    }

    #[test]
    fn test_percent_out_of_range_rejected() {
        assert!(matches!(
            RasterOptions::from_info(&info(&[("MAX_MEM_PERCENT_USED", "101")])),
            Err(ConfigError::MemPercentOutOfRange(101))
        ));
        assert!(matches!(
            RasterOptions::from_info(&info(&[("MAX_MEM_PERCENT_USED", "400")])),
            Err(ConfigError::MemPercentOutOfRange(400))
        ));
        assert!(matches!(
            RasterOptions::from_info(&info(&[("MAX_MEM_PERCENT_USED", "lots")])),
            Err(ConfigError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_partial_json() {
        let options: RasterOptions =
            serde_json::from_str(r#"{"ram_budget": {"mem_percent": 10}, "temp_dir": "/scratch"}"#)
                .unwrap();
        assert_eq!(options.ram_budget, RamBudget::MemPercent(10));
        assert_eq!(options.temp_dir, Some(PathBuf::from("/scratch")));
        assert_eq!(options.max_disk_file_size, DEFAULT_MAX_DISK_FILE_SIZE);
    }
}
