
//! The "simple" data type convention.
//!
//! The storage engine treats pixels as opaque byte sequences. Under the
//! simple convention, the user data type word additionally declares a base
//! sample type and a byte order, as `endian * 10 + base type`, and the file
//! records the convention under the reserved meta-data key `_sif_agree`.
//!
//! Every operation in this module swaps bytes at the file boundary, so
//! callers always see pixel values in native order, whatever order the
//! file stores. Writes pass through a grow-only scratch buffer owned by
//! the handle; a large write keeps the buffer at its high-water mark in
//! anticipation of more of the same.

use crate::error::{Error, ErrorKind, Result, UnitResult};
use crate::io::{convert_from_native, convert_to_native, swap_element_bytes, ByteOrder};
use crate::file::{is_possibly_sif_file, SifFile, UniformValue};
use crate::math::Vec2;
use crate::meta::ImageDescription;

use std::path::Path;

/// The name of the convention under the `_sif_agree` meta-data key.
pub const AGREEMENT_SIMPLE: &str = "simple";

/// The base sample types of the simple convention.
/// The numeric codes occupy the ones digit of the user data type word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    /// Unsigned 8-bit integers. Code `0`.
    UInt8,

    /// Signed 8-bit integers. Code `1`.
    Int8,

    /// Unsigned 16-bit integers. Code `2`.
    UInt16,

    /// Signed 16-bit integers. Code `3`.
    Int16,

    /// Unsigned 32-bit integers. Code `4`.
    UInt32,

    /// Signed 32-bit integers. Code `5`.
    Int32,

    /// Unsigned 64-bit integers. Code `6`.
    UInt64,

    /// Signed 64-bit integers. Code `7`.
    Int64,

    /// IEEE-754 32-bit floats. Code `8`.
    Float32,

    /// IEEE-754 64-bit floats. Code `9`.
    Float64,
}

impl SampleType {
    /// Interpret a base type code.
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(SampleType::UInt8),
            1 => Ok(SampleType::Int8),
            2 => Ok(SampleType::UInt16),
            3 => Ok(SampleType::Int16),
            4 => Ok(SampleType::UInt32),
            5 => Ok(SampleType::Int32),
            6 => Ok(SampleType::UInt64),
            7 => Ok(SampleType::Int64),
            8 => Ok(SampleType::Float32),
            9 => Ok(SampleType::Float64),
            _ => Err(Error::new(ErrorKind::UndefinedDataType)),
        }
    }

    /// The numeric code of this sample type.
    pub fn code(self) -> i32 {
        match self {
            SampleType::UInt8 => 0,
            SampleType::Int8 => 1,
            SampleType::UInt16 => 2,
            SampleType::Int16 => 3,
            SampleType::UInt32 => 4,
            SampleType::Int32 => 5,
            SampleType::UInt64 => 6,
            SampleType::Int64 => 7,
            SampleType::Float32 => 8,
            SampleType::Float64 => 9,
        }
    }

    /// Bytes per sample.
    pub fn byte_size(self) -> usize {
        match self {
            SampleType::UInt8 | SampleType::Int8 => 1,
            SampleType::UInt16 | SampleType::Int16 => 2,
            SampleType::UInt32 | SampleType::Int32 | SampleType::Float32 => 4,
            SampleType::UInt64 | SampleType::Int64 | SampleType::Float64 => 8,
        }
    }
}

/// Combine a sample type and a byte order into a user data type word.
pub fn user_data_type_code(sample_type: SampleType, byte_order: ByteOrder) -> i32 {
    byte_order.code() * 10 + sample_type.code()
}

/// Split a user data type word into its sample type and byte order.
pub fn split_user_data_type(code: i32) -> Result<(SampleType, ByteOrder)> {
    let sample_type = SampleType::from_code(code.rem_euclid(10))?;
    let byte_order = ByteOrder::from_code(code.div_euclid(10))?;
    Ok((sample_type, byte_order))
}

/// Create a new image file under the simple convention.
///
/// The pixel size follows from the sample type, the byte order starts as
/// the native order of this machine, and `_sif_agree` is set to `"simple"`.
#[allow(clippy::too_many_arguments)]
pub fn create(
    path: impl AsRef<Path>,
    size: Vec2<usize>,
    bands: usize,
    sample_type: SampleType,
    consolidate: bool,
    defragment: bool,
    tile_size: Vec2<usize>,
    intrinsic_write: bool,
) -> Result<SifFile> {
    let description = ImageDescription {
        size,
        bands,
        tile_size,
        data_unit_size: sample_type.byte_size(),
        user_data_type: user_data_type_code(sample_type, ByteOrder::native()),
        consolidate,
        defragment,
        intrinsic_write,
    };

    let mut file = SifFile::create(path, &description)?;
    file.set_agreement(AGREEMENT_SIMPLE)?;
    Ok(file)
}

/// Create a new simple image file with every behaviour flag enabled
/// and 64 × 64 pixel tiles.
pub fn create_with_defaults(
    path: impl AsRef<Path>,
    size: Vec2<usize>,
    bands: usize,
    sample_type: SampleType,
) -> Result<SifFile> {
    create(path, size, bands, sample_type, true, true, Vec2(64, 64), true)
}

/// Open an existing image file that must conform to the simple convention.
pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<SifFile> {
    let file = SifFile::open(path, read_only)?;

    if file.is_simple() {
        Ok(file)
    } else {
        let _ = file.close();
        Err(Error::detailed(ErrorKind::IncorrectDataType, "the file does not declare the simple convention"))
    }
}

/// Whether the file at the path is a SIF file conforming
/// to the simple convention.
pub fn is_simple_by_name(path: impl AsRef<Path>) -> bool {
    is_possibly_sif_file(&path)
        && SifFile::open(path, true).map(|file| file.is_simple()).unwrap_or(false)
}

impl SifFile {
    /// Whether this file declares the simple convention.
    pub fn is_simple(&self) -> bool {
        self.agreement().map(|agreement| agreement == AGREEMENT_SIMPLE).unwrap_or(false)
    }

    /// The byte order of the pixel values in this file.
    pub fn simple_byte_order(&self) -> Result<ByteOrder> {
        ByteOrder::from_code(self.user_data_type().div_euclid(10))
    }

    /// Declare the byte order of the pixel values. Never change this
    /// once a raster has been written.
    pub fn simple_set_byte_order(&mut self, byte_order: ByteOrder) {
        let base_type = self.user_data_type().rem_euclid(10);
        self.set_user_data_type(byte_order.code() * 10 + base_type);
    }

    /// The sample type of the pixel values in this file.
    pub fn simple_sample_type(&self) -> Result<SampleType> {
        SampleType::from_code(self.user_data_type().rem_euclid(10))
    }

    /// Declare the sample type of the pixel values. Never change this
    /// once a raster has been written.
    pub fn simple_set_sample_type(&mut self, sample_type: SampleType) {
        let endian_part = self.user_data_type().div_euclid(10);
        self.set_user_data_type(endian_part * 10 + sample_type.code());
    }

    /// Like [`SifFile::get_raster`], but the buffer comes back
    /// in native byte order.
    pub fn simple_get_raster(
        &mut self,
        buffer: &mut [u8],
        position: Vec2<usize>,
        size: Vec2<usize>,
        band: usize,
    ) -> UnitResult {
        let byte_order = self.simple_byte_order()?;
        self.get_raster(buffer, position, size, band)?;
        convert_to_native(buffer, self.data_unit_size(), byte_order);
        Ok(())
    }

    /// Like [`SifFile::set_raster`], but the data is given in native byte
    /// order and converted to the byte order of the file while writing.
    pub fn simple_set_raster(
        &mut self,
        data: &[u8],
        position: Vec2<usize>,
        size: Vec2<usize>,
        band: usize,
    ) -> UnitResult {
        let byte_order = self.simple_byte_order()?;

        if byte_order == ByteOrder::native() {
            return self.set_raster(data, position, size, band);
        }

        self.write_swapped(data, |file, swapped| {
            file.set_raster(swapped, position, size, band)
        })
    }

    /// Like [`SifFile::get_tile_slice`], but the buffer comes back
    /// in native byte order.
    pub fn simple_get_tile_slice(
        &mut self,
        buffer: &mut [u8],
        tile: Vec2<usize>,
        band: usize,
    ) -> UnitResult {
        let byte_order = self.simple_byte_order()?;
        self.get_tile_slice(buffer, tile, band)?;
        convert_to_native(buffer, self.data_unit_size(), byte_order);
        Ok(())
    }

    /// Like [`SifFile::set_tile_slice`], but the data is given in native
    /// byte order and converted to the byte order of the file while writing.
    pub fn simple_set_tile_slice(
        &mut self,
        data: &[u8],
        tile: Vec2<usize>,
        band: usize,
    ) -> UnitResult {
        let byte_order = self.simple_byte_order()?;

        if byte_order == ByteOrder::native() {
            return self.set_tile_slice(data, tile, band);
        }

        self.write_swapped(data, |file, swapped| {
            file.set_tile_slice(swapped, tile, band)
        })
    }

    /// Like [`SifFile::fill_tile_slice`], with the value in native order.
    pub fn simple_fill_tile_slice(
        &mut self,
        tile: Vec2<usize>,
        band: usize,
        value: &[u8],
    ) -> UnitResult {
        let swapped = self.swapped_scalar(value)?;
        self.fill_tile_slice(tile, band, &swapped)
    }

    /// Like [`SifFile::fill_tiles`], with the value in native order.
    pub fn simple_fill_tiles(&mut self, band: usize, value: &[u8]) -> UnitResult {
        let swapped = self.swapped_scalar(value)?;
        self.fill_tiles(band, &swapped)
    }

    /// Like [`SifFile::is_shallow_uniform`], with the reported value
    /// converted to native order.
    pub fn simple_is_shallow_uniform(
        &self,
        position: Vec2<usize>,
        size: Vec2<usize>,
        band: usize,
    ) -> Result<Option<UniformValue>> {
        let byte_order = self.simple_byte_order()?;
        let value = self.is_shallow_uniform(position, size, band)?;
        Ok(value.map(|value| self.native_value(value, byte_order)))
    }

    /// Like [`SifFile::is_slice_shallow_uniform`], with the reported value
    /// converted to native order.
    pub fn simple_is_slice_shallow_uniform(
        &self,
        tile: Vec2<usize>,
        band: usize,
    ) -> Result<Option<UniformValue>> {
        let byte_order = self.simple_byte_order()?;
        let value = self.is_slice_shallow_uniform(tile, band)?;
        Ok(value.map(|value| self.native_value(value, byte_order)))
    }

    fn native_value(&self, mut value: UniformValue, byte_order: ByteOrder) -> UniformValue {
        convert_to_native(&mut value, self.data_unit_size(), byte_order);
        value
    }

    fn swapped_scalar(&mut self, value: &[u8]) -> Result<UniformValue> {
        let byte_order = self.simple_byte_order()?;
        let mut swapped = UniformValue::from_slice(value);
        convert_from_native(&mut swapped, value.len(), byte_order);
        Ok(swapped)
    }

    /// Swap a copy of `data` into the file's byte order inside the
    /// grow-only scratch buffer, then run the write with it. Only called
    /// when the file's order differs from the native order.
    fn write_swapped(
        &mut self,
        data: &[u8],
        write: impl FnOnce(&mut Self, &[u8]) -> UnitResult,
    ) -> UnitResult {
        let mut scratch = self.grow_region_buffer(data.len());
        scratch[..data.len()].copy_from_slice(data);
        swap_element_bytes(&mut scratch[..data.len()], self.data_unit_size());

        let result = write(self, &scratch[..data.len()]);
        self.restore_region_buffer(scratch);
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn type_codes_round_trip() {
        for code in 0..10 {
            let sample_type = SampleType::from_code(code).unwrap();
            assert_eq!(sample_type.code(), code);
        }

        assert!(SampleType::from_code(10).is_err());
        assert!(SampleType::from_code(-1).is_err());
    }

    #[test]
    fn user_data_type_packing() {
        let code = user_data_type_code(SampleType::UInt16, ByteOrder::BigEndian);
        assert_eq!(code, 12);

        let (sample_type, byte_order) = split_user_data_type(code).unwrap();
        assert_eq!(sample_type, SampleType::UInt16);
        assert_eq!(byte_order, ByteOrder::BigEndian);

        assert!(split_user_data_type(25).is_err());
    }

    #[test]
    fn sample_sizes() {
        assert_eq!(SampleType::UInt8.byte_size(), 1);
        assert_eq!(SampleType::Int16.byte_size(), 2);
        assert_eq!(SampleType::Float32.byte_size(), 4);
        assert_eq!(SampleType::Float64.byte_size(), 8);
    }
}
