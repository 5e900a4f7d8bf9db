//! Raster data structures shared by the raster drivers

mod band_property;
mod geotransform;
mod grid;
mod pixel;

pub use band_property::BandProperty;
pub use geotransform::GeoTransform;
pub use grid::Grid;
pub use pixel::{PixelAccessor, PixelElement, PixelType};
