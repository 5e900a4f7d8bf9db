//! Pixel types and typed access to raw block buffers
//!
//! Blocks are stored as plain byte buffers in row-major order. A
//! [`PixelAccessor`] is chosen once per band from its [`PixelType`] and reads
//! or writes single pixels of a block as `f64`, so band code never has to
//! branch on the data type per pixel.

use crate::error::{Error, Result};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Data type of the pixels of a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelType {
    Bit1,
    Bit2,
    Bit4,
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    UInt64,
    Int64,
    Float32,
    Float64,
    /// Complex with `i16` real and imaginary parts
    CInt16,
    /// Complex with `i32` real and imaginary parts
    CInt32,
    CFloat32,
    CFloat64,
}

impl PixelType {
    pub const ALL: [PixelType; 17] = [
        PixelType::Bit1,
        PixelType::Bit2,
        PixelType::Bit4,
        PixelType::UInt8,
        PixelType::Int8,
        PixelType::UInt16,
        PixelType::Int16,
        PixelType::UInt32,
        PixelType::Int32,
        PixelType::UInt64,
        PixelType::Int64,
        PixelType::Float32,
        PixelType::Float64,
        PixelType::CInt16,
        PixelType::CInt32,
        PixelType::CFloat32,
        PixelType::CFloat64,
    ];

    /// Number of bits used by one pixel (both parts for complex types)
    pub fn bits_per_pixel(self) -> usize {
        match self {
            PixelType::Bit1 => 1,
            PixelType::Bit2 => 2,
            PixelType::Bit4 => 4,
            PixelType::UInt8 | PixelType::Int8 => 8,
            PixelType::UInt16 | PixelType::Int16 => 16,
            PixelType::UInt32 | PixelType::Int32 | PixelType::Float32 | PixelType::CInt16 => 32,
            PixelType::UInt64
            | PixelType::Int64
            | PixelType::Float64
            | PixelType::CInt32
            | PixelType::CFloat32 => 64,
            PixelType::CFloat64 => 128,
        }
    }

    pub fn is_complex(self) -> bool {
        matches!(
            self,
            PixelType::CInt16 | PixelType::CInt32 | PixelType::CFloat32 | PixelType::CFloat64
        )
    }

    /// Whether several pixels share one byte
    pub fn is_sub_byte(self) -> bool {
        self.bits_per_pixel() < 8
    }

    /// Size in bytes of a `width` x `height` block of this type.
    ///
    /// Sub-byte types are rounded up to whole bytes for the entire block,
    /// not per row.
    pub fn block_size_bytes(self, width: usize, height: usize) -> usize {
        (self.bits_per_pixel() * width * height).div_ceil(8)
    }

    pub fn name(self) -> &'static str {
        match self {
            PixelType::Bit1 => "bit1",
            PixelType::Bit2 => "bit2",
            PixelType::Bit4 => "bit4",
            PixelType::UInt8 => "uint8",
            PixelType::Int8 => "int8",
            PixelType::UInt16 => "uint16",
            PixelType::Int16 => "int16",
            PixelType::UInt32 => "uint32",
            PixelType::Int32 => "int32",
            PixelType::UInt64 => "uint64",
            PixelType::Int64 => "int64",
            PixelType::Float32 => "float32",
            PixelType::Float64 => "float64",
            PixelType::CInt16 => "cint16",
            PixelType::CInt32 => "cint32",
            PixelType::CFloat32 => "cfloat32",
            PixelType::CFloat64 => "cfloat64",
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        PixelType::ALL
            .into_iter()
            .find(|t| t.name() == lower)
            .ok_or_else(|| Error::UnsupportedDataType(s.to_string()))
    }
}

/// Primitive values stored little-endian inside a block buffer.
pub trait PixelElement: Copy + ToPrimitive {
    /// Encoded size in bytes
    const SIZE: usize;

    fn read_le(bytes: &[u8]) -> Self;

    fn write_le(self, bytes: &mut [u8]);

    /// Convert from `f64`, saturating at the type bounds (NaN maps to 0 for integers)
    fn from_f64(value: f64) -> Self;

    fn as_f64(self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }
}

macro_rules! impl_pixel_element {
    ($($t:ty),*) => {
        $(
            impl PixelElement for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$t>::from_le_bytes(raw)
                }

                #[inline]
                fn write_le(self, bytes: &mut [u8]) {
                    bytes[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn from_f64(value: f64) -> Self {
                    value as $t
                }
            }
        )*
    };
}

impl_pixel_element!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Reads pixel `index` of a block
pub type GetFn = fn(&[u8], usize) -> f64;
/// Writes pixel `index` of a block
pub type SetFn = fn(&mut [u8], usize, f64);

/// Typed pixel access over raw block buffers.
///
/// Indexes are pixel offsets inside the block (`col + row * block_width`).
/// For real types the imaginary accessors read 0 and ignore writes.
#[derive(Clone, Copy)]
pub struct PixelAccessor {
    pixel_type: PixelType,
    get: GetFn,
    set: SetFn,
    get_imag: GetFn,
    set_imag: SetFn,
}

impl PixelAccessor {
    pub fn for_type(pixel_type: PixelType) -> Self {
        let (get, set, get_imag, set_imag): (GetFn, SetFn, GetFn, SetFn) = match pixel_type {
            PixelType::Bit1 => (get_bits::<1>, set_bits::<1>, get_zero, set_nothing),
            PixelType::Bit2 => (get_bits::<2>, set_bits::<2>, get_zero, set_nothing),
            PixelType::Bit4 => (get_bits::<4>, set_bits::<4>, get_zero, set_nothing),
            PixelType::UInt8 => (get_real::<u8>, set_real::<u8>, get_zero, set_nothing),
            PixelType::Int8 => (get_real::<i8>, set_real::<i8>, get_zero, set_nothing),
            PixelType::UInt16 => (get_real::<u16>, set_real::<u16>, get_zero, set_nothing),
            PixelType::Int16 => (get_real::<i16>, set_real::<i16>, get_zero, set_nothing),
            PixelType::UInt32 => (get_real::<u32>, set_real::<u32>, get_zero, set_nothing),
            PixelType::Int32 => (get_real::<i32>, set_real::<i32>, get_zero, set_nothing),
            PixelType::UInt64 => (get_real::<u64>, set_real::<u64>, get_zero, set_nothing),
            PixelType::Int64 => (get_real::<i64>, set_real::<i64>, get_zero, set_nothing),
            PixelType::Float32 => (get_real::<f32>, set_real::<f32>, get_zero, set_nothing),
            PixelType::Float64 => (get_real::<f64>, set_real::<f64>, get_zero, set_nothing),
            PixelType::CInt16 => (
                get_part::<i16, 0>,
                set_part::<i16, 0>,
                get_part::<i16, 1>,
                set_part::<i16, 1>,
            ),
            PixelType::CInt32 => (
                get_part::<i32, 0>,
                set_part::<i32, 0>,
                get_part::<i32, 1>,
                set_part::<i32, 1>,
            ),
            PixelType::CFloat32 => (
                get_part::<f32, 0>,
                set_part::<f32, 0>,
                get_part::<f32, 1>,
                set_part::<f32, 1>,
            ),
            PixelType::CFloat64 => (
                get_part::<f64, 0>,
                set_part::<f64, 0>,
                get_part::<f64, 1>,
                set_part::<f64, 1>,
            ),
        };

        Self {
            pixel_type,
            get,
            set,
            get_imag,
            set_imag,
        }
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    #[inline]
    pub fn get(&self, block: &[u8], index: usize) -> f64 {
        (self.get)(block, index)
    }

    #[inline]
    pub fn set(&self, block: &mut [u8], index: usize, value: f64) {
        (self.set)(block, index, value)
    }

    #[inline]
    pub fn get_imag(&self, block: &[u8], index: usize) -> f64 {
        (self.get_imag)(block, index)
    }

    #[inline]
    pub fn set_imag(&self, block: &mut [u8], index: usize, value: f64) {
        (self.set_imag)(block, index, value)
    }
}

impl fmt::Debug for PixelAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelAccessor")
            .field("pixel_type", &self.pixel_type)
            .finish()
    }
}

fn get_real<T: PixelElement>(block: &[u8], index: usize) -> f64 {
    let start = index * T::SIZE;
    T::read_le(&block[start..start + T::SIZE]).as_f64()
}

fn set_real<T: PixelElement>(block: &mut [u8], index: usize, value: f64) {
    let start = index * T::SIZE;
    T::from_f64(value).write_le(&mut block[start..start + T::SIZE]);
}

// Complex pixels interleave the parts: real at 2i, imaginary at 2i + 1.
fn get_part<T: PixelElement, const PART: usize>(block: &[u8], index: usize) -> f64 {
    get_real::<T>(block, index * 2 + PART)
}

fn set_part<T: PixelElement, const PART: usize>(block: &mut [u8], index: usize, value: f64) {
    set_real::<T>(block, index * 2 + PART, value)
}

// Sub-byte pixels are packed starting at the least significant bits.
fn get_bits<const BITS: usize>(block: &[u8], index: usize) -> f64 {
    let per_byte = 8 / BITS;
    let mask = (1u8 << BITS) - 1;
    let shift = (index % per_byte) * BITS;
    f64::from((block[index / per_byte] >> shift) & mask)
}

fn set_bits<const BITS: usize>(block: &mut [u8], index: usize, value: f64) {
    let per_byte = 8 / BITS;
    let mask = (1u8 << BITS) - 1;
    let shift = (index % per_byte) * BITS;
    let bits = (value as u8).min(mask);
    let byte = &mut block[index / per_byte];
    *byte = (*byte & !(mask << shift)) | (bits << shift);
}

fn get_zero(_block: &[u8], _index: usize) -> f64 {
    0.0
}

fn set_nothing(_block: &mut [u8], _index: usize, _value: f64) {}
