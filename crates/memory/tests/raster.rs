//! Integration tests for memory rasters and the block cache on top of them.

use approx::assert_relative_eq;
use ndarray::Array2;
use std::collections::HashMap;
use tessella_core::raster::{BandProperty, PixelType};
use tessella_core::{GeoTransform, Grid};
use tessella_memory::{BlockSource, CachedBlocks, MemoryError, MemoryRaster, RasterOptions};

fn options(ram_blocks: usize) -> RasterOptions {
    RasterOptions::default()
        .with_ram_blocks(ram_blocks)
        .with_max_disk_file_size(4096)
}

fn ramp(rows: usize, cols: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(r, c)| (r * 100 + c) as f64 * 0.5)
}

#[test]
fn test_array_round_trip_through_swap() {
    let dir = tempfile::tempdir().unwrap();
    let grid = Grid::new(37, 23).with_transform(GeoTransform::new(500.0, 900.0, 10.0, -10.0));
    let bands = vec![
        BandProperty::new(PixelType::Float32, 8, 8),
        BandProperty::new(PixelType::Int32, 8, 8).with_nodata(-9999.0),
    ];
    let mut raster = MemoryRaster::new(grid, bands, &options(3).with_temp_dir(dir.path())).unwrap();
    assert!(raster.manager().disk_resident_blocks() > 0);

    let data = ramp(23, 37);
    raster.band(0).unwrap().write_array(data.view()).unwrap();
    raster.band(1).unwrap().write_array(data.mapv(f64::round).view()).unwrap();

    let back = raster.band(0).unwrap().read_array().unwrap();
    for (a, b) in back.iter().zip(data.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-3);
    }
    let ints = raster.band(1).unwrap().read_array().unwrap();
    assert_eq!(ints, data.mapv(f64::round));
    assert!(raster.manager().swap_count() > 0);
}

#[test]
fn test_write_array_shape_mismatch() {
    let bands = vec![BandProperty::new(PixelType::UInt8, 4, 4)];
    let mut raster = MemoryRaster::new(Grid::new(5, 5), bands, &options(2)).unwrap();
    let err = raster.band(0).unwrap().write_array(ramp(4, 5).view()).unwrap_err();
    assert!(matches!(err, MemoryError::Core(_)));
}

#[test]
fn test_block_buffer_length_is_checked() {
    let bands = vec![BandProperty::new(PixelType::UInt16, 4, 4)];
    let mut raster = MemoryRaster::new(Grid::new(8, 8), bands, &options(1)).unwrap();
    let mut band = raster.band(0).unwrap();

    let mut short = vec![0u8; 31];
    let err = band.read(0, 0, &mut short).unwrap_err();
    assert!(matches!(err, MemoryError::BlockSizeMismatch { expected: 32, actual: 31 }));
    assert!(band.write(2, 0, &[0u8; 32]).is_err());
    assert!(band.get_value(8, 0).is_err());
}

#[test]
fn test_every_pixel_type_stores_values() {
    let cases = [
        (PixelType::Bit1, 1.0),
        (PixelType::Bit2, 3.0),
        (PixelType::Bit4, 11.0),
        (PixelType::UInt8, 200.0),
        (PixelType::Int8, -100.0),
        (PixelType::UInt16, 60000.0),
        (PixelType::Int16, -30000.0),
        (PixelType::UInt32, 4.0e9),
        (PixelType::Int32, -2.0e9),
        (PixelType::UInt64, 1.0e15),
        (PixelType::Int64, -1.0e15),
        (PixelType::Float32, 1.5),
        (PixelType::Float64, -2.25e100),
        (PixelType::CInt16, -7.0),
        (PixelType::CInt32, 70000.0),
        (PixelType::CFloat32, 0.25),
        (PixelType::CFloat64, 1.0e-300),
    ];
    for (pixel_type, value) in cases {
        let bands = vec![BandProperty::new(pixel_type, 3, 3)];
        let mut raster = MemoryRaster::new(Grid::new(7, 7), bands, &options(2)).unwrap();
        let mut band = raster.band(0).unwrap();
        // (4, 4) and (5, 4) are neighbours inside block (1, 1)
        band.set_value(5, 4, value).unwrap();
        band.set_value(4, 4, 0.0).unwrap();
        if pixel_type.is_complex() {
            band.set_ivalue(5, 4, 2.0).unwrap();
        }
        band.set_value(6, 6, value).unwrap();

        assert_relative_eq!(band.get_value(5, 4).unwrap(), value, max_relative = 1e-6);
        assert_relative_eq!(band.get_value(6, 6).unwrap(), value, max_relative = 1e-6);
        assert_eq!(band.get_value(4, 4).unwrap(), 0.0, "{pixel_type}");
        let imag = if pixel_type.is_complex() { 2.0 } else { 0.0 };
        assert_eq!(band.get_ivalue(5, 4).unwrap(), imag, "{pixel_type}");
    }
}

#[test]
fn test_growth_on_every_side() {
    let bands = vec![BandProperty::new(PixelType::Float64, 4, 4).with_nodata(-1.0)];
    let grid = Grid::new(6, 5).with_transform(GeoTransform::new(100.0, 200.0, 2.0, -2.0));
    let mut raster = MemoryRaster::new(grid, bands, &options(2)).unwrap();
    raster.fill_nodata().unwrap();
    raster.band(0).unwrap().set_value(0, 0, 7.0).unwrap();
    let corner = raster.grid().transform.pixel_to_geo(0, 0);

    assert_eq!(raster.add_top_lines(1).unwrap(), 4);
    assert_eq!(raster.add_left_columns(5).unwrap(), 8);
    assert_eq!(raster.add_bottom_lines(2).unwrap(), 2);
    assert_eq!(raster.add_right_columns(3).unwrap(), 3);
    raster.add_bottom_bands(1).unwrap();

    assert_eq!((raster.cols(), raster.rows()), (17, 11));
    assert_eq!(raster.band_count(), 2);
    // the pixel set before growing keeps its world position
    assert_eq!(raster.grid().transform.pixel_to_geo(8, 4), corner);

    let data = raster.band(0).unwrap().read_array().unwrap();
    assert_eq!(data[[4, 8]], 7.0);
    assert_eq!(data.iter().filter(|&&v| v == 7.0).count(), 1);
    assert!(data.iter().all(|&v| v == 7.0 || v == -1.0));
    let added = raster.band(1).unwrap().read_array().unwrap();
    assert!(added.iter().all(|&v| v == -1.0));
}

#[test]
fn test_options_from_driver_keys() {
    let info: HashMap<String, String> = [
        ("MAX_NUMBER_OF_RAM_BLOCKS", "2"),
        ("DATA_PREFETCH_THRESHOLD", "1"),
        ("MAX_DISK_FILE_SIZE", "1024"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let options = RasterOptions::from_info(&info).unwrap();

    let bands = vec![BandProperty::new(PixelType::UInt8, 8, 8)];
    let raster = MemoryRaster::new(Grid::new(32, 32), bands, &options).unwrap();
    assert_eq!(raster.manager().max_ram_blocks(), 2);
    // 14 disk blocks of 64 bytes, 16 per file
    assert_eq!(raster.manager().disk_file_count(), 1);
}

#[test]
fn test_cache_over_raster_writes_back() {
    let bands = vec![BandProperty::new(PixelType::UInt8, 2, 2); 2];
    let mut raster = MemoryRaster::new(Grid::new(6, 2), bands, &options(2)).unwrap();
    raster.band(1).unwrap().set_value(5, 1, 33.0).unwrap();

    let mut cache = CachedBlocks::new(raster, 2, 1);
    assert_eq!(cache.capacity(), 2);
    for band in 0..2 {
        for x in 0..3 {
            cache.block_mut(band, x, 0).unwrap()[0] = (band * 10 + x) as u8;
        }
    }
    assert_eq!(cache.block(1, 2, 0).unwrap()[3], 33);

    let mut raster = cache.into_inner().unwrap();
    assert_eq!(raster.band_count(), 2);
    for band in 0..2 {
        let mut b = raster.band(band).unwrap();
        for x in 0..3 {
            assert_eq!(b.get_value(x * 2, 0).unwrap(), (band * 10 + x) as f64);
        }
    }
    assert_eq!(raster.band(1).unwrap().get_value(5, 1).unwrap(), 33.0);
    assert_eq!(raster.blocks_x(0), 3);
}

#[test]
fn test_cache_sized_from_memory_percent() {
    let bands = vec![BandProperty::new(PixelType::Int16, 16, 16)];
    let raster = MemoryRaster::new(Grid::new(64, 64), bands, &options(4)).unwrap();
    let cache = CachedBlocks::from_mem_percent(raster, 10, 0).unwrap();
    // any real host holds sixteen 512 byte blocks in 10% of its memory
    assert_eq!(cache.capacity(), 16);
}

#[test]
fn test_cache_configured_from_options() {
    let bands = vec![BandProperty::new(PixelType::UInt8, 4, 4)];
    let raster = MemoryRaster::new(Grid::new(16, 4), bands, &options(4)).unwrap();
    let cache_options = RasterOptions::default()
        .with_ram_blocks(2)
        .with_prefetch_threshold(1);
    let mut cache = CachedBlocks::with_options(raster, &cache_options).unwrap();
    assert_eq!(cache.capacity(), 2);

    for x in 0..4 {
        cache.block(0, x, 0).unwrap();
    }
    // blocks 2 and 3 came from the read-ahead buffer
    assert_eq!(cache.misses(), 4);
    assert_eq!(cache.prefetch_hits(), 2);
}
