
//! The fixed file header: image parameters, behaviour flags,
//! and the georeferencing transform.
//!
//! The header is the first thing in a file. Its own byte count is the first
//! field; it is written last, after the rest of the header has been flushed,
//! by rewinding and patching the placeholder.

use crate::error::{i32_to_usize, Error, ErrorKind, Result, UnitResult};
use crate::io::Storage;
use crate::math::{ceil_div, Vec2};

/// The newest SIF format version this library can read and write.
pub const LIBRARY_VERSION: i32 = 2;

/// The byte count of the fixed header layout:
/// the patched size field, the file identifier, seventeen
/// 32-bit fields, and six doubles.
pub(crate) const HEADER_BYTE_SIZE: usize = 4 + 8 + 17 * 4 + 6 * 8;

/// The eight identifier bytes near the start of each SIF file.
/// Used to abort reading non-SIF files.
pub mod magic_number {
    use super::*;

    /// The identifier bytes, located at byte offset 4,
    /// directly after the header size field.
    pub const BYTES: [u8; 8] = *b"!**SIF**";

    /// The byte offset of the identifier within the file.
    pub const OFFSET: u64 = 4;

    /// Without validation, write the identifier to the stream.
    pub(crate) fn write(storage: &mut Storage) -> UnitResult {
        storage.write_all(&BYTES)
    }

    /// Whether the given bytes are the SIF file identifier.
    pub fn matches(bytes: &[u8]) -> bool {
        bytes == &BYTES[..]
    }
}

/// Every parameter of the image that is fixed when the file is created,
/// in the form the caller supplies it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageDescription {
    /// Width and height of the image in pixels.
    pub size: Vec2<usize>,

    /// Number of bands. At least one.
    pub bands: usize,

    /// Width and height of one tile in pixels.
    /// Neither needs to divide the image dimensions.
    pub tile_size: Vec2<usize>,

    /// Bytes per pixel per band.
    pub data_unit_size: usize,

    /// An opaque tag for the caller; the storage engine never interprets it.
    /// The "simple" convention stores `endian * 10 + base type` here.
    pub user_data_type: i32,

    /// Deep-scan dirty tiles for uniformity when the file is flushed or closed.
    pub consolidate: bool,

    /// Compact the block region when the file is flushed or closed.
    pub defragment: bool,

    /// Deep-scan every written slice immediately, collapsing uniform
    /// slices without ever touching a block.
    pub intrinsic_write: bool,
}

impl ImageDescription {
    /// Describe an image with the given geometry.
    /// All behaviour flags start disabled and the user data type is zero.
    pub fn new(size: Vec2<usize>, bands: usize, tile_size: Vec2<usize>, data_unit_size: usize) -> Self {
        ImageDescription {
            size,
            bands,
            tile_size,
            data_unit_size,
            user_data_type: 0,
            consolidate: false,
            defragment: false,
            intrinsic_write: false,
        }
    }

    /// Check the basic sanity of the parameters.
    pub fn validate(&self) -> UnitResult {
        if self.bands < 1 {
            return Err(Error::detailed(ErrorKind::InvalidBand, "an image requires at least one band"));
        }

        if self.size.width() < 1 || self.size.height() < 1 {
            return Err(Error::detailed(ErrorKind::InvalidRegionSize, "image dimensions must be at least one pixel"));
        }

        if self.tile_size.width() < 1 || self.tile_size.height() < 1 {
            return Err(Error::detailed(ErrorKind::InvalidTileSize, "tile dimensions must be at least one pixel"));
        }

        if self.data_unit_size < 1 {
            return Err(Error::detailed(ErrorKind::InvalidBuffer, "pixels must occupy at least one byte"));
        }

        Ok(())
    }
}

/// The in-memory form of the file header.
///
/// Derived quantities (tile counts, byte sizes) are computed from the
/// primary fields instead of being stored, so they can never disagree;
/// the stored copies are verified against them when a file is opened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    /// The format version the file was last written as.
    pub version: i32,

    /// Width and height of the image in pixels.
    pub size: Vec2<usize>,

    /// Number of bands.
    pub bands: usize,

    /// Number of meta-data entries at the time the header was last
    /// written or read. Refreshed from the meta-data store on flush.
    pub key_count: usize,

    /// Width and height of one tile in pixels.
    pub tile_size: Vec2<usize>,

    /// Bytes per pixel per band.
    pub data_unit_size: usize,

    /// The caller's opaque data type tag.
    pub user_data_type: i32,

    /// Compact the block region on flush and close.
    pub defragment: bool,

    /// Deep-scan dirty tiles on flush and close.
    pub consolidate: bool,

    /// Deep-scan every slice as it is written.
    pub intrinsic_write: bool,

    /// The affine georeferencing transform.
    /// Maps pixel `(x, y)` to `(t[0] + x*t[1] + y*t[2], t[3] + x*t[4] + y*t[5])`.
    pub affine_geo_transform: [f64; 6],
}

impl Header {
    /// The header of a freshly created image. The transform starts
    /// as the identity mapping.
    pub fn from_description(description: &ImageDescription) -> Self {
        Header {
            version: LIBRARY_VERSION,
            size: description.size,
            bands: description.bands,
            key_count: 0,
            tile_size: description.tile_size,
            data_unit_size: description.data_unit_size,
            user_data_type: description.user_data_type,
            defragment: description.defragment,
            consolidate: description.consolidate,
            intrinsic_write: description.intrinsic_write,
            affine_geo_transform: [0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        }
    }

    /// Number of tile columns.
    pub fn tiles_across(&self) -> usize {
        ceil_div(self.size.width(), self.tile_size.width())
    }

    /// Number of tile rows.
    pub fn tiles_down(&self) -> usize {
        ceil_div(self.size.height(), self.tile_size.height())
    }

    /// Total number of tiles.
    pub fn tile_count(&self) -> usize {
        self.tiles_across() * self.tiles_down()
    }

    /// Pixels per band within one tile.
    pub fn units_per_slice(&self) -> usize {
        self.tile_size.area()
    }

    /// Bytes of one band of one tile.
    pub fn slice_bytes(&self) -> usize {
        self.units_per_slice() * self.data_unit_size
    }

    /// Bytes of one tile across all bands, which is also the size
    /// of one block in the block region.
    pub fn tile_bytes(&self) -> usize {
        self.slice_bytes() * self.bands
    }

    /// Bytes of the uniformity flag vector of one tile.
    pub fn uniform_flag_bytes(&self) -> usize {
        ceil_div(self.bands, 8)
    }

    /// Bytes of one tile record: the uniform pixel values, the
    /// uniformity flags, and the 32-bit block number.
    pub fn tile_record_bytes(&self) -> usize {
        self.bands * self.data_unit_size + self.uniform_flag_bytes() + 4
    }

    /// The number of pixels a tile actually covers within the image.
    /// Everything except the rightmost column and bottommost row of tiles
    /// covers the full tile size.
    pub fn tile_extent(&self, tile: Vec2<usize>) -> Vec2<usize> {
        let extent_x = self.tile_size.width().min(self.size.width() - tile.x() * self.tile_size.width());
        let extent_y = self.tile_size.height().min(self.size.height() - tile.y() * self.tile_size.height());
        Vec2(extent_x, extent_y)
    }

    /// Write the header at the start of the file, stamping it with the
    /// requested wire version, and patch the leading size field afterwards.
    /// Returns the header byte count.
    pub fn write(&mut self, storage: &mut Storage, version: i32) -> Result<u64> {
        if version < 1 {
            return Err(Error::new(ErrorKind::CannotWriteVersion));
        }

        self.version = version;

        storage.seek_to(0)?;
        storage.write_i32(0)?; // placeholder for the byte count
        magic_number::write(storage)?;
        storage.write_i32(self.version)?;
        storage.write_i32(self.size.width() as i32)?;
        storage.write_i32(self.size.height() as i32)?;
        storage.write_i32(self.bands as i32)?;
        storage.write_i32(self.key_count as i32)?;
        storage.write_i32(self.tile_count() as i32)?;
        storage.write_i32(self.tile_size.width() as i32)?;
        storage.write_i32(self.tile_size.height() as i32)?;
        storage.write_i32(self.tile_bytes() as i32)?;
        storage.write_i32(self.tiles_across() as i32)?;
        storage.write_i32(self.data_unit_size as i32)?;
        storage.write_i32(self.user_data_type)?;
        storage.write_i32(self.defragment as i32)?;
        storage.write_i32(self.consolidate as i32)?;
        storage.write_i32(self.intrinsic_write as i32)?;
        storage.write_i32(self.tile_record_bytes() as i32)?;
        storage.write_i32(self.uniform_flag_bytes() as i32)?;

        // version 1 stored the transform in host order while everything
        // else was big-endian; preserved for compatibility
        for component in &self.affine_geo_transform {
            if self.version < 2 { storage.write_f64_native(*component)?; }
            else { storage.write_f64(*component)?; }
        }

        storage.seek_to(0)?;
        storage.write_i32(HEADER_BYTE_SIZE as i32)?;

        Ok(HEADER_BYTE_SIZE as u64)
    }

    /// Read and verify the header from the start of the file.
    /// Returns the header and its declared byte count.
    pub fn read(storage: &mut Storage) -> Result<(Self, u64)> {
        storage.seek_to(0)?;

        let declared_bytes = i32_to_usize(storage.read_i32()?, "negative header size")?;

        let mut magic = [0_u8; 8];
        storage.read_exact(&mut magic)?;
        if !magic_number::matches(&magic) {
            return Err(Error::detailed(ErrorKind::Read, "SIF file identifier missing"));
        }

        let version = storage.read_i32()?;
        if version > LIBRARY_VERSION {
            return Err(Error::new(ErrorKind::IncompatibleVersion));
        }

        let width = i32_to_usize(storage.read_i32()?, "negative image width")?;
        let height = i32_to_usize(storage.read_i32()?, "negative image height")?;
        let bands = i32_to_usize(storage.read_i32()?, "negative band count")?;
        let key_count = i32_to_usize(storage.read_i32()?, "negative key count")?;
        let tile_count = i32_to_usize(storage.read_i32()?, "negative tile count")?;
        let tile_width = i32_to_usize(storage.read_i32()?, "negative tile width")?;
        let tile_height = i32_to_usize(storage.read_i32()?, "negative tile height")?;
        let tile_bytes = i32_to_usize(storage.read_i32()?, "negative tile byte size")?;
        let tiles_across = i32_to_usize(storage.read_i32()?, "negative tile column count")?;
        let data_unit_size = i32_to_usize(storage.read_i32()?, "negative data unit size")?;
        let user_data_type = storage.read_i32()?;
        let defragment = storage.read_i32()? != 0;
        let consolidate = storage.read_i32()? != 0;
        let intrinsic_write = storage.read_i32()? != 0;
        let tile_record_bytes = i32_to_usize(storage.read_i32()?, "negative tile record size")?;
        let uniform_flag_bytes = i32_to_usize(storage.read_i32()?, "negative flag byte count")?;

        let mut affine_geo_transform = [0.0_f64; 6];
        for component in &mut affine_geo_transform {
            *component =
                if version < 2 { storage.read_f64_native()? } else { storage.read_f64()? };
        }

        let header = Header {
            version,
            size: Vec2(width, height),
            bands,
            key_count,
            tile_size: Vec2(tile_width, tile_height),
            data_unit_size,
            user_data_type,
            defragment,
            consolidate,
            intrinsic_write,
            affine_geo_transform,
        };

        if width < 1 || height < 1 || bands < 1 || tile_width < 1 || tile_height < 1 || data_unit_size < 1 {
            return Err(Error::detailed(ErrorKind::Read, "image or tile dimensions are zero"));
        }

        // the original format never validated the declared sizes against the
        // primary fields; a corrupted header would silently misaddress every
        // tile record and block, so verify all of them here
        if declared_bytes != HEADER_BYTE_SIZE
            || tile_count != header.tile_count()
            || tiles_across != header.tiles_across()
            || tile_bytes != header.tile_bytes()
            || tile_record_bytes != header.tile_record_bytes()
            || uniform_flag_bytes != header.uniform_flag_bytes()
        {
            return Err(Error::detailed(ErrorKind::Read, "header fields are inconsistent"));
        }

        Ok((header, declared_bytes as u64))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn description() -> ImageDescription {
        ImageDescription::new(Vec2(10, 10), 3, Vec2(4, 4), 2)
    }

    #[test]
    fn derived_quantities() {
        let header = Header::from_description(&description());

        assert_eq!(header.tiles_across(), 3);
        assert_eq!(header.tiles_down(), 3);
        assert_eq!(header.tile_count(), 9);
        assert_eq!(header.units_per_slice(), 16);
        assert_eq!(header.slice_bytes(), 32);
        assert_eq!(header.tile_bytes(), 96);
        assert_eq!(header.uniform_flag_bytes(), 1);
        assert_eq!(header.tile_record_bytes(), 3 * 2 + 1 + 4);
    }

    #[test]
    fn border_tile_extents() {
        let header = Header::from_description(&description());

        assert_eq!(header.tile_extent(Vec2(0, 0)), Vec2(4, 4));
        assert_eq!(header.tile_extent(Vec2(2, 0)), Vec2(2, 4));
        assert_eq!(header.tile_extent(Vec2(2, 2)), Vec2(2, 2));
    }

    #[test]
    fn tile_larger_than_image() {
        let mut description = description();
        description.tile_size = Vec2(64, 64);
        let header = Header::from_description(&description);

        assert_eq!(header.tile_count(), 1);
        assert_eq!(header.tile_extent(Vec2(0, 0)), Vec2(10, 10));
    }

    #[test]
    fn rejects_degenerate_descriptions() {
        let mut zero_bands = description();
        zero_bands.bands = 0;
        assert!(zero_bands.validate().is_err());

        let mut zero_tile = description();
        zero_tile.tile_size = Vec2(0, 4);
        assert!(zero_tile.validate().is_err());

        assert!(description().validate().is_ok());
    }

    fn temp_storage() -> Storage {
        Storage::new(tempfile::tempfile().unwrap())
    }

    #[test]
    fn header_round_trips_through_a_file() {
        let mut written = Header::from_description(&description());
        written.user_data_type = 12;
        written.key_count = 3;
        written.affine_geo_transform = [1.5, 2.0, 0.0, -8.25, 0.0, -2.0];

        let mut storage = temp_storage();
        let declared = written.write(&mut storage, LIBRARY_VERSION).unwrap();
        assert_eq!(declared, HEADER_BYTE_SIZE as u64);

        let (read_back, read_bytes) = Header::read(&mut storage).unwrap();
        assert_eq!(read_back, written);
        assert_eq!(read_bytes, declared);
    }

    #[test]
    fn version_one_transform_round_trips_in_host_order() {
        let mut written = Header::from_description(&description());
        written.affine_geo_transform = [0.5, 1.0, 0.0, 99.0, 0.0, 1.0];

        let mut storage = temp_storage();
        written.write(&mut storage, 1).unwrap();
        assert_eq!(written.version, 1);

        let (read_back, _) = Header::read(&mut storage).unwrap();
        assert_eq!(read_back.version, 1);
        assert_eq!(read_back.affine_geo_transform, written.affine_geo_transform);
    }

    #[test]
    fn newer_versions_are_rejected() {
        let mut written = Header::from_description(&description());

        let mut storage = temp_storage();
        written.write(&mut storage, LIBRARY_VERSION + 1).unwrap();

        let error = Header::read(&mut storage).unwrap_err();
        assert_eq!(error.kind(), crate::error::ErrorKind::IncompatibleVersion);
    }

    #[test]
    fn garbage_is_not_an_image() {
        let mut storage = temp_storage();
        storage.write_all(&[0x13_u8; 256]).unwrap();

        assert!(Header::read(&mut storage).is_err());
    }
}
