//! Per-band layout description

use crate::error::{Error, Result};
use crate::raster::PixelType;
use serde::{Deserialize, Serialize};

/// Layout and metadata of one raster band.
///
/// Describes how the band is cut into blocks; the number of blocks follows
/// from the raster grid size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandProperty {
    pub pixel_type: PixelType,
    /// Block width in pixels
    pub block_width: usize,
    /// Block height in pixels
    pub block_height: usize,
    /// No-data value; bands without one are initialised with zeros
    pub nodata: Option<f64>,
    #[serde(default)]
    pub description: String,
}

impl BandProperty {
    pub fn new(pixel_type: PixelType, block_width: usize, block_height: usize) -> Self {
        Self {
            pixel_type,
            block_width,
            block_height,
            nodata: None,
            description: String::new(),
        }
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn pixels_per_block(&self) -> usize {
        self.block_width * self.block_height
    }

    pub fn block_size_bytes(&self) -> usize {
        self.pixel_type
            .block_size_bytes(self.block_width, self.block_height)
    }

    /// Number of blocks (x, y) needed to cover `cols` x `rows` pixels
    pub fn blocks_for(&self, cols: usize, rows: usize) -> (usize, usize) {
        (
            cols.div_ceil(self.block_width),
            rows.div_ceil(self.block_height),
        )
    }

    /// Value written into cells that hold no data
    pub fn fill_value(&self) -> f64 {
        self.nodata.unwrap_or(0.0)
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_width == 0 || self.block_height == 0 {
            return Err(Error::InvalidDimensions {
                width: self.block_width,
                height: self.block_height,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_for_partial_edges() {
        let prop = BandProperty::new(PixelType::Int16, 64, 32);
        assert_eq!(prop.blocks_for(64, 32), (1, 1));
        assert_eq!(prop.blocks_for(65, 100), (2, 4));
        assert_eq!(prop.block_size_bytes(), 64 * 32 * 2);
    }

    #[test]
    fn test_zero_block_is_invalid() {
        let prop = BandProperty::new(PixelType::UInt8, 0, 8);
        assert!(matches!(
            prop.validate(),
            Err(Error::InvalidDimensions { width: 0, height: 8 })
        ));
    }

    #[test]
    fn test_serde_roundtrip() {
        let prop = BandProperty::new(PixelType::CFloat64, 16, 16)
            .with_nodata(-9999.0)
            .with_description("elevation");
        let json = serde_json::to_string(&prop).unwrap();
        let back: BandProperty = serde_json::from_str(&json).unwrap();
        assert_eq!(back, prop);
    }
}
