//! Vector geometry support
//!
//! Geometries are `geo_types` values; this module only adds the binary
//! encodings used to exchange them with databases and file formats.

pub mod wkb;

pub use geo_types::Geometry;
pub use wkb::{WkbByteOrder, read_wkb, wkb_size, write_wkb};
