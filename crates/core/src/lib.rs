//! # Tessella Core
//!
//! Shared types for the Tessella geospatial toolkit.
//!
//! This crate provides:
//! - `PixelType` and `PixelAccessor`: typed access to raw block buffers
//! - `BandProperty` and `Grid`: band layout and georeferencing of a raster
//! - `GeoTransform`: Affine transformation for georeferencing
//! - A Well-Known Binary codec for `geo_types` geometries

pub mod error;
pub mod raster;
pub mod vector;

pub use error::{Error, Result};
pub use raster::{BandProperty, GeoTransform, Grid, PixelAccessor, PixelType};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::raster::{BandProperty, GeoTransform, Grid, PixelAccessor, PixelType};
    pub use crate::vector::wkb::{WkbByteOrder, read_wkb, write_wkb};
}
