
//! The open image file: lifecycle, raster access, uniformity
//! bookkeeping, and block compaction.
//!
//! A [`SifFile`] owns the underlying file handle, the in-memory header and
//! tile table, the tile ↔ block indices, the meta-data dictionary, and the
//! scratch buffers shared by the raster mapper and the defragmenter. All
//! state lives in the handle; the library keeps no globals. A handle is not
//! safe to share between threads without external locking, and two handles
//! on the same path will corrupt each other if both write.

use crate::block::BlockMap;
use crate::error::{Error, ErrorKind, Result, UnitResult};
use crate::io::Storage;
use crate::math::Vec2;
use crate::meta::{magic_number, Header, ImageDescription, LIBRARY_VERSION};
use crate::metadata::{MetaDataStore, AGREEMENT_KEY, PROJECTION_KEY};
use crate::tile::TileTable;
use crate::uniform::{fill_with_value, slice_is_uniform};

use smallvec::SmallVec;
use std::fs::OpenOptions;
use std::mem;
use std::path::Path;

/// A single pixel value, `data_unit_size` bytes long.
/// Stays on the stack for every "simple" sample type.
pub type UniformValue = SmallVec<[u8; 8]>;

/// An open Sparse Image Format file.
#[derive(Debug)]
pub struct SifFile {
    storage: Storage,
    header: Header,

    /// Actual byte count of the header on disk; the tile-header
    /// table starts here.
    header_bytes: u64,

    /// Byte offset of block zero.
    base_location: u64,

    /// The wire version used for subsequent writes.
    use_file_version: i32,

    read_only: bool,
    closed: bool,

    tiles: TileTable,
    blocks: BlockMap,
    meta_data: MetaDataStore,

    /// One flag per tile: written without an intrinsic uniformity check
    /// since the last consolidation.
    dirty_tiles: Vec<bool>,

    /// Two block-sized scratch buffers, shared by the raster mapper,
    /// the consolidator and the defragmenter.
    tile_buffer: Vec<u8>,
    swap_buffer: Vec<u8>,

    /// Grow-only byte-swap scratch of the "simple" layer.
    region_buffer: Vec<u8>,

    /// The first error ever returned by this handle, for callers
    /// that prefer inspecting a latched status over matching results.
    last_error: Option<ErrorKind>,
}

/// Whether the file at the path begins like a SIF file.
/// Only the identifier bytes are probed; the header is not parsed.
pub fn is_possibly_sif_file(path: impl AsRef<Path>) -> bool {
    let mut leading = [0_u8; 12];

    std::fs::File::open(path)
        .and_then(|mut file| std::io::Read::read_exact(&mut file, &mut leading))
        .map(|_| magic_number::matches(&leading[magic_number::OFFSET as usize..]))
        .unwrap_or(false)
}

impl SifFile {
    /// Create a new image file with the given parameters.
    ///
    /// The header and the tile-header table are written immediately; no
    /// space is reserved for blocks. Every band of every tile starts
    /// uniform with pixel value zero, so a fresh file stores an all-zero
    /// image of any size in a few kilobytes.
    pub fn create(path: impl AsRef<Path>, description: &ImageDescription) -> Result<Self> {
        description.validate()?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|error| Error::io(ErrorKind::InvalidFileMode, error))?;

        let header = Header::from_description(description);
        let tile_count = header.tile_count();
        let tile_bytes = header.tile_bytes();

        let mut sif = SifFile {
            storage: Storage::new(file),
            header,
            header_bytes: 0,
            base_location: 0,
            use_file_version: LIBRARY_VERSION,
            read_only: false,
            closed: false,
            tiles: TileTable::new_fully_uniform(tile_count, header.bands, header.data_unit_size),
            blocks: BlockMap::new(tile_count),
            meta_data: MetaDataStore::new(),
            dirty_tiles: vec![false; tile_count],
            tile_buffer: vec![0_u8; tile_bytes],
            swap_buffer: vec![0_u8; tile_bytes],
            region_buffer: Vec::new(),
            last_error: None,
        };

        sif.header_bytes = sif.header.write(&mut sif.storage, LIBRARY_VERSION)?;
        sif.base_location =
            sif.header_bytes + (tile_count * sif.header.tile_record_bytes()) as u64;
        sif.tiles.write_all(&mut sif.storage, sif.header_bytes, &sif.blocks)?;

        Ok(sif)
    }

    /// Open an existing image file for reading, or for reading and writing.
    ///
    /// Fails when the file is not a SIF file or was written by a newer
    /// format version than this library understands.
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(path)
            .map_err(|error| Error::io(ErrorKind::InvalidFileMode, error))?;

        let mut storage = Storage::new(file);
        let (header, header_bytes) = Header::read(&mut storage)?;

        let tile_count = header.tile_count();
        let (tiles, tile_blocks) = TileTable::read_all(
            &mut storage,
            header_bytes,
            tile_count,
            header.bands,
            header.data_unit_size,
        )?;

        let blocks = BlockMap::from_tile_blocks(tile_blocks)?;
        let base_location = header_bytes + (tile_count * header.tile_record_bytes()) as u64;

        let meta_location = base_location
            + (blocks.last_used_block().map_or(0, |block| block + 1) * header.tile_bytes()) as u64;
        let meta_data = MetaDataStore::read(&mut storage, meta_location, header.key_count)?;

        let tile_bytes = header.tile_bytes();

        Ok(SifFile {
            storage,
            header,
            header_bytes,
            base_location,
            use_file_version: header.version,
            read_only,
            closed: false,
            tiles,
            blocks,
            meta_data,
            dirty_tiles: vec![false; tile_count],
            tile_buffer: vec![0_u8; tile_bytes],
            swap_buffer: vec![0_u8; tile_bytes],
            region_buffer: Vec::new(),
            last_error: None,
        })
    }

    /// Byte-copy this file to a new path and open the copy for writing.
    /// The file is flushed before its bytes are read.
    pub fn create_copy(&mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.flush()?;

        let target = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|error| Error::io(ErrorKind::InvalidFileMode, error))?;

        let mut target = Storage::new(target);
        let mut buffer = mem::take(&mut self.tile_buffer);
        let result = self.copy_bytes_into(&mut target, &mut buffer);
        self.tile_buffer = buffer;
        self.track(result)?;

        target.flush()?;
        drop(target);

        SifFile::open(path, false)
    }

    fn copy_bytes_into(&mut self, target: &mut Storage, buffer: &mut [u8]) -> UnitResult {
        self.storage.seek_to(0)?;

        loop {
            let count = self.storage.read_some(buffer)?;
            if count == 0 {
                return Ok(());
            }

            target.write_all(&buffer[..count])?;
        }
    }

    /// Write out the header, every tile record, and the meta-data, then run
    /// consolidation and defragmentation if their flags are set, and push
    /// everything down to the device. Does nothing on a read-only file.
    pub fn flush(&mut self) -> UnitResult {
        let result = self.run_flush();
        self.track(result)
    }

    /// Flush and consume the handle.
    pub fn close(mut self) -> UnitResult {
        let result = self.run_flush();
        self.closed = true;
        result
    }

    fn run_flush(&mut self) -> UnitResult {
        if self.read_only {
            return Ok(());
        }

        self.header.key_count = self.meta_data.len();
        self.header_bytes = self.header.write(&mut self.storage, self.use_file_version)?;
        self.tiles.write_all(&mut self.storage, self.header_bytes, &self.blocks)?;
        self.write_meta_data()?;

        if self.header.consolidate {
            self.run_consolidation()?;
        }

        if self.header.defragment {
            self.run_defragmentation()?;
        }

        self.storage.flush()
    }

    // ---------------------------------------------------------------------
    // raster and slice access
    // ---------------------------------------------------------------------

    /// Read a rectangular region of one band into `buffer`,
    /// which must hold exactly `width * height * data_unit_size` bytes.
    pub fn get_raster(
        &mut self,
        buffer: &mut [u8],
        position: Vec2<usize>,
        size: Vec2<usize>,
        band: usize,
    ) -> UnitResult {
        let mut tile_buffer = mem::take(&mut self.tile_buffer);
        let result = self.read_region(buffer, position, size, band, &mut tile_buffer);
        self.tile_buffer = tile_buffer;
        self.track(result)
    }

    /// Write a rectangular region of one band from `data`,
    /// which must hold exactly `width * height * data_unit_size` bytes.
    pub fn set_raster(
        &mut self,
        data: &[u8],
        position: Vec2<usize>,
        size: Vec2<usize>,
        band: usize,
    ) -> UnitResult {
        let mut tile_buffer = mem::take(&mut self.tile_buffer);
        let result = self.write_region(data, position, size, band, &mut tile_buffer);
        self.tile_buffer = tile_buffer;
        self.track(result)
    }

    /// Read one band of one tile into `buffer`, which must hold exactly
    /// `tile_width * tile_height * data_unit_size` bytes.
    ///
    /// A shallow uniform slice is produced from its header value without
    /// touching the disk.
    pub fn get_tile_slice(
        &mut self,
        buffer: &mut [u8],
        tile: Vec2<usize>,
        band: usize,
    ) -> UnitResult {
        let result = self
            .check_tile(tile)
            .and_then(|tile_index| {
                self.check_band(band)?;
                self.check_buffer(buffer.len(), self.header.slice_bytes())?;
                Ok(tile_index)
            })
            .and_then(|tile_index| self.read_slice(buffer, tile_index, band));

        self.track(result)
    }

    /// Write one band of one tile from `data`, which must hold exactly
    /// `tile_width * tile_height * data_unit_size` bytes.
    ///
    /// With `intrinsic_write` enabled the buffer is deep-scanned first and
    /// a uniform slice collapses into the tile header without a block
    /// write; otherwise the tile is marked dirty for the next
    /// consolidation.
    pub fn set_tile_slice(&mut self, data: &[u8], tile: Vec2<usize>, band: usize) -> UnitResult {
        let result = self
            .check_tile(tile)
            .and_then(|tile_index| {
                self.check_writable()?;
                self.check_band(band)?;
                self.check_buffer(data.len(), self.header.slice_bytes())?;
                Ok(tile_index)
            })
            .and_then(|tile_index| self.write_slice(data, tile_index, band));

        self.track(result)
    }

    /// Make one band of one tile uniform with the given pixel value,
    /// releasing the tile's block if every band becomes uniform.
    /// No block bytes are touched.
    pub fn fill_tile_slice(&mut self, tile: Vec2<usize>, band: usize, value: &[u8]) -> UnitResult {
        let result = self
            .check_tile(tile)
            .and_then(|tile_index| {
                self.check_writable()?;
                self.check_band(band)?;
                self.check_buffer(value.len(), self.header.data_unit_size)?;
                Ok(tile_index)
            })
            .and_then(|tile_index| {
                self.tiles.set_uniform_value(tile_index, band, value);
                self.tiles.set_uniform(tile_index, band);
                self.collapse_if_uniform(tile_index);
                self.write_tile_record(tile_index)
            });

        self.track(result)
    }

    /// Make one band of every tile uniform with the given pixel value,
    /// then rewrite the whole tile-header table in one pass.
    pub fn fill_tiles(&mut self, band: usize, value: &[u8]) -> UnitResult {
        let result = self
            .check_writable()
            .and_then(|_| self.check_band(band))
            .and_then(|_| self.check_buffer(value.len(), self.header.data_unit_size))
            .and_then(|_| {
                for tile_index in 0..self.header.tile_count() {
                    self.tiles.set_uniform_value(tile_index, band, value);
                    self.tiles.set_uniform(tile_index, band);
                    self.collapse_if_uniform(tile_index);
                }

                self.tiles.write_all(&mut self.storage, self.header_bytes, &self.blocks)
            });

        self.track(result)
    }

    /// Whether every tile overlapping the region is shallow uniform in the
    /// band, with one common pixel value. Returns that value if so.
    /// No pixel bytes are scanned.
    pub fn is_shallow_uniform(
        &self,
        position: Vec2<usize>,
        size: Vec2<usize>,
        band: usize,
    ) -> Result<Option<UniformValue>> {
        self.check_region(position, size)?;
        self.check_band(band)?;

        let tile_size = self.header.tile_size;
        let first_tile = Vec2(position.x() / tile_size.width(), position.y() / tile_size.height());
        let last_tile = Vec2(
            (position.x() + size.width() - 1) / tile_size.width(),
            (position.y() + size.height() - 1) / tile_size.height(),
        );

        let first_value = match self.is_slice_shallow_uniform(first_tile, band)? {
            Some(value) => value,
            None => return Ok(None),
        };

        for tile_y in first_tile.y()..=last_tile.y() {
            for tile_x in first_tile.x()..=last_tile.x() {
                match self.is_slice_shallow_uniform(Vec2(tile_x, tile_y), band)? {
                    Some(value) if value == first_value => {}
                    _ => return Ok(None),
                }
            }
        }

        Ok(Some(first_value))
    }

    /// Whether one band of one tile is shallow uniform,
    /// and its header pixel value if so.
    pub fn is_slice_shallow_uniform(
        &self,
        tile: Vec2<usize>,
        band: usize,
    ) -> Result<Option<UniformValue>> {
        let tile_index = self.check_tile(tile)?;
        self.check_band(band)?;

        if self.tiles.is_uniform(tile_index, band) {
            Ok(Some(UniformValue::from_slice(self.tiles.uniform_value(tile_index, band))))
        } else {
            Ok(None)
        }
    }

    // ---------------------------------------------------------------------
    // consolidation and defragmentation
    // ---------------------------------------------------------------------

    /// Deep-scan every dirty tile that owns a block, collapse bands found
    /// uniform, release blocks of fully uniform tiles, and rewrite the
    /// meta-data past the new last used block.
    ///
    /// Does nothing unless the `consolidate` flag is set and the file
    /// is writable.
    pub fn consolidate(&mut self) -> UnitResult {
        let result = self.run_consolidation();
        self.track(result)
    }

    /// Move used blocks to the low end of the block region, ordered by
    /// their owning tile index, then rewrite the meta-data, truncating the
    /// freed tail of the file.
    ///
    /// Does nothing unless the `defragment` flag is set and the file
    /// is writable.
    pub fn defragment(&mut self) -> UnitResult {
        let result = self.run_defragmentation();
        self.track(result)
    }

    fn run_consolidation(&mut self) -> UnitResult {
        if self.read_only || !self.header.consolidate {
            return Ok(());
        }

        let mut buffer = mem::take(&mut self.tile_buffer);
        let result = self.consolidate_dirty_tiles(&mut buffer);
        self.tile_buffer = buffer;
        result?;

        self.write_meta_data()
    }

    fn consolidate_dirty_tiles(&mut self, buffer: &mut [u8]) -> UnitResult {
        let slice_bytes = self.header.slice_bytes();
        let value_size = self.header.data_unit_size;
        let tiles_across = self.header.tiles_across();

        for tile_index in 0..self.header.tile_count() {
            if !self.dirty_tiles[tile_index] || self.blocks.block_of_tile(tile_index).is_none() {
                continue;
            }

            let tile = Vec2(tile_index % tiles_across, tile_index / tiles_across);
            let extent = self.header.tile_extent(tile);

            for band in 0..self.header.bands {
                if self.tiles.is_uniform(tile_index, band) {
                    continue;
                }

                self.read_slice(&mut buffer[..slice_bytes], tile_index, band)?;

                if slice_is_uniform(
                    &buffer[..slice_bytes],
                    value_size,
                    self.header.tile_size.width(),
                    extent,
                ) {
                    self.tiles.set_uniform_value(tile_index, band, &buffer[..value_size]);
                    self.tiles.set_uniform(tile_index, band);
                }
            }

            self.collapse_if_uniform(tile_index);
            self.write_tile_record(tile_index)?;
            self.dirty_tiles[tile_index] = false;
        }

        Ok(())
    }

    fn run_defragmentation(&mut self) -> UnitResult {
        if self.read_only || !self.header.defragment {
            return Ok(());
        }

        // walk the tiles in index order, pulling each allocated block down
        // to the next target position; whoever lives there gets the
        // vacated block in exchange
        let mut target = 0;

        for tile_index in 0..self.header.tile_count() {
            let current = match self.blocks.block_of_tile(tile_index) {
                Some(block) => block,
                None => continue,
            };

            if target == current {
                target += 1;
                continue;
            }

            let evicted = self.blocks.tile_of_block(target);
            self.blocks.assign(tile_index, target);

            match evicted {
                Some(evicted_tile) => {
                    self.blocks.assign(evicted_tile, current);
                    self.write_tile_record(evicted_tile)?;
                }
                None => self.blocks.clear_block(current),
            }

            self.swap_disk_blocks(target, current, evicted.is_none())?;
            self.write_tile_record(tile_index)?;
            target += 1;
        }

        // block moves may have overwritten the meta-data region
        self.write_meta_data()
    }

    /// Exchange the on-disk contents of two blocks. When the target block
    /// holds no tile, the exchange degenerates to a one-way copy.
    fn swap_disk_blocks(&mut self, first: usize, second: usize, one_way: bool) -> UnitResult {
        let tile_bytes = self.header.tile_bytes();
        let mut first_content = mem::take(&mut self.tile_buffer);
        let mut second_content = mem::take(&mut self.swap_buffer);

        let result = self.swap_disk_blocks_buffered(
            first,
            second,
            one_way,
            &mut first_content[..tile_bytes],
            &mut second_content[..tile_bytes],
        );

        self.tile_buffer = first_content;
        self.swap_buffer = second_content;
        result
    }

    fn swap_disk_blocks_buffered(
        &mut self,
        first: usize,
        second: usize,
        one_way: bool,
        first_content: &mut [u8],
        second_content: &mut [u8],
    ) -> UnitResult {
        let first_location = self.block_location(first);
        let second_location = self.block_location(second);

        self.storage.seek_to(second_location)?;
        self.storage.read_exact(second_content)?;

        if !one_way {
            self.storage.seek_to(first_location)?;
            self.storage.read_exact(first_content)?;
            self.storage.seek_to(second_location)?;
            self.storage.write_all(first_content)?;
        }

        self.storage.seek_to(first_location)?;
        self.storage.write_all(second_content)
    }

    // ---------------------------------------------------------------------
    // flags, header accessors, meta-data sugar
    // ---------------------------------------------------------------------

    /// The parsed file header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Width and height of the image in pixels.
    pub fn size(&self) -> Vec2<usize> {
        self.header.size
    }

    /// Number of bands.
    pub fn bands(&self) -> usize {
        self.header.bands
    }

    /// Width and height of one tile in pixels.
    pub fn tile_size(&self) -> Vec2<usize> {
        self.header.tile_size
    }

    /// Bytes per pixel per band.
    pub fn data_unit_size(&self) -> usize {
        self.header.data_unit_size
    }

    /// The tile ↔ block indices, for inspection.
    pub fn blocks(&self) -> &BlockMap {
        &self.blocks
    }

    /// The tile-header table, for inspection.
    pub fn tiles(&self) -> &TileTable {
        &self.tiles
    }

    /// Byte offset of block zero.
    pub fn base_location(&self) -> u64 {
        self.base_location
    }

    /// Whether the file was opened read-only.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// The format version the file was last written as.
    pub fn file_version(&self) -> i32 {
        self.header.version
    }

    /// Choose the wire format version for subsequent writes.
    /// Versions below one cannot be written.
    pub fn use_file_format_version(&mut self, version: i32) -> UnitResult {
        let result = if version < 1 {
            Err(Error::new(ErrorKind::CannotWriteVersion))
        } else {
            self.use_file_version = version;
            Ok(())
        };

        self.track(result)
    }

    /// The caller's opaque data type tag.
    pub fn user_data_type(&self) -> i32 {
        self.header.user_data_type
    }

    /// Replace the caller's opaque data type tag.
    pub fn set_user_data_type(&mut self, user_data_type: i32) {
        self.header.user_data_type = user_data_type;
    }

    /// Whether dirty tiles are deep-scanned on flush and close.
    pub fn is_consolidate_set(&self) -> bool {
        self.header.consolidate
    }

    /// Enable or disable consolidation on flush and close.
    pub fn set_consolidate(&mut self, enabled: bool) {
        self.header.consolidate = enabled;
    }

    /// Whether the block region is compacted on flush and close.
    pub fn is_defragment_set(&self) -> bool {
        self.header.defragment
    }

    /// Enable or disable defragmentation on flush and close.
    pub fn set_defragment(&mut self, enabled: bool) {
        self.header.defragment = enabled;
    }

    /// Whether written slices are deep-scanned immediately.
    pub fn is_intrinsic_write_set(&self) -> bool {
        self.header.intrinsic_write
    }

    /// Enable or disable the deep scan of every written slice.
    pub fn set_intrinsic_write(&mut self, enabled: bool) {
        self.header.intrinsic_write = enabled;
    }

    /// The affine georeferencing transform.
    pub fn affine_geo_transform(&self) -> &[f64; 6] {
        &self.header.affine_geo_transform
    }

    /// Replace the affine georeferencing transform.
    pub fn set_affine_geo_transform(&mut self, transform: [f64; 6]) {
        self.header.affine_geo_transform = transform;
    }

    /// The projection string (OpenGIS WKT), or the empty string
    /// if none was stored.
    pub fn projection(&self) -> Result<String> {
        self.reserved_string(PROJECTION_KEY)
    }

    /// Store the projection string.
    pub fn set_projection(&mut self, projection: &str) -> UnitResult {
        let result = self.check_writable().map(|_| self.meta_data.set_str(PROJECTION_KEY, projection));
        self.track(result)
    }

    /// The data type convention of this file, or the empty string
    /// if none was declared. Only `"simple"` is understood by this library.
    pub fn agreement(&self) -> Result<String> {
        self.reserved_string(AGREEMENT_KEY)
    }

    /// Declare the data type convention of this file.
    pub fn set_agreement(&mut self, agreement: &str) -> UnitResult {
        let result = self.check_writable().map(|_| self.meta_data.set_str(AGREEMENT_KEY, agreement));
        self.track(result)
    }

    fn reserved_string(&self, key: &[u8]) -> Result<String> {
        match self.meta_data.get_str(key) {
            Ok(value) => Ok(value.to_owned()),
            Err(error) if error.kind() == ErrorKind::MetaDataKey => Ok(String::new()),
            Err(error) => Err(error),
        }
    }

    /// The raw value of a meta-data entry.
    pub fn get_meta_data_binary(&self, key: &[u8]) -> Result<&[u8]> {
        self.meta_data.get(key)
    }

    /// The string value of a meta-data entry.
    pub fn get_meta_data(&self, key: &[u8]) -> Result<&str> {
        self.meta_data.get_str(key)
    }

    /// Insert or replace a meta-data entry with a string value.
    /// Persisted on the next flush.
    pub fn set_meta_data(&mut self, key: &[u8], value: &str) -> UnitResult {
        let result = self.check_writable().map(|_| self.meta_data.set_str(key, value));
        self.track(result)
    }

    /// Insert or replace a meta-data entry with raw bytes.
    /// Persisted on the next flush.
    pub fn set_meta_data_binary(&mut self, key: &[u8], value: &[u8]) -> UnitResult {
        let result = self.check_writable().map(|_| self.meta_data.set(key, value));
        self.track(result)
    }

    /// Remove a meta-data entry. Removing a missing key is not an error.
    pub fn remove_meta_data_item(&mut self, key: &[u8]) -> UnitResult {
        let result = self.check_writable().map(|_| {
            self.meta_data.remove(key);
        });

        self.track(result)
    }

    /// Number of meta-data entries.
    pub fn meta_data_item_count(&self) -> usize {
        self.meta_data.len()
    }

    /// All meta-data keys, in no particular order.
    pub fn meta_data_keys(&self) -> Vec<&[u8]> {
        self.meta_data.keys().collect()
    }

    /// The first error this handle ever returned, if any.
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    /// Forget the latched error.
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    // ---------------------------------------------------------------------
    // internals
    // ---------------------------------------------------------------------

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(error) = &result {
            if self.last_error.is_none() {
                self.last_error = Some(error.kind());
            }
        }

        result
    }

    fn check_writable(&self) -> UnitResult {
        if self.read_only { Err(Error::new(ErrorKind::InvalidFileMode)) } else { Ok(()) }
    }

    fn check_band(&self, band: usize) -> UnitResult {
        if band >= self.header.bands { Err(Error::new(ErrorKind::InvalidBand)) } else { Ok(()) }
    }

    fn check_tile(&self, tile: Vec2<usize>) -> Result<usize> {
        if tile.x() >= self.header.tiles_across() || tile.y() >= self.header.tiles_down() {
            Err(Error::new(ErrorKind::InvalidTileNumber))
        } else {
            Ok(tile.y() * self.header.tiles_across() + tile.x())
        }
    }

    fn check_region(&self, position: Vec2<usize>, size: Vec2<usize>) -> UnitResult {
        if size.width() < 1
            || size.height() < 1
            || position.x() + size.width() > self.header.size.width()
            || position.y() + size.height() > self.header.size.height()
        {
            Err(Error::new(ErrorKind::InvalidRegionSize))
        } else {
            Ok(())
        }
    }

    fn check_buffer(&self, actual: usize, expected: usize) -> UnitResult {
        if actual != expected { Err(Error::new(ErrorKind::InvalidBuffer)) } else { Ok(()) }
    }

    /// Byte offset of a block, or of the region past the last block
    /// when `block` equals one past the last used index.
    fn block_location(&self, block: usize) -> u64 {
        self.base_location + (block * self.header.tile_bytes()) as u64
    }

    fn write_tile_record(&mut self, tile_index: usize) -> UnitResult {
        self.tiles.write_record(
            &mut self.storage,
            self.header_bytes,
            tile_index,
            self.blocks.block_of_tile(tile_index),
        )
    }

    fn write_meta_data(&mut self) -> UnitResult {
        let location =
            self.block_location(self.blocks.last_used_block().map_or(0, |block| block + 1));
        self.meta_data.write(&mut self.storage, location)?;
        Ok(())
    }

    /// Release the tile's block if every band is now uniform.
    fn collapse_if_uniform(&mut self, tile_index: usize) {
        if self.tiles.all_uniform(tile_index) {
            self.blocks.release(tile_index);
        }
    }

    /// Produce one slice, either by replicating the header value
    /// or by reading it from the tile's block.
    fn read_slice(&mut self, buffer: &mut [u8], tile_index: usize, band: usize) -> UnitResult {
        if self.tiles.is_uniform(tile_index, band) {
            fill_with_value(buffer, self.tiles.uniform_value(tile_index, band));
            return Ok(());
        }

        let block = self
            .blocks
            .block_of_tile(tile_index)
            .ok_or_else(|| Error::detailed(ErrorKind::InvalidBlockNumber, "non-uniform tile has no block"))?;

        let location = self.block_location(block) + (band * self.header.slice_bytes()) as u64;
        self.storage.seek_to(location)?;
        self.storage.read_exact(buffer)
    }

    /// Store one slice. Collapses uniform data into the tile header when
    /// the intrinsic scan is enabled, otherwise writes through to the
    /// tile's block, allocating one on first use.
    fn write_slice(&mut self, data: &[u8], tile_index: usize, band: usize) -> UnitResult {
        let tiles_across = self.header.tiles_across();
        let tile = Vec2(tile_index % tiles_across, tile_index / tiles_across);
        let extent = self.header.tile_extent(tile);
        let value_size = self.header.data_unit_size;

        if self.header.intrinsic_write
            && slice_is_uniform(data, value_size, self.header.tile_size.width(), extent)
        {
            self.tiles.set_uniform_value(tile_index, band, &data[..value_size]);
            self.tiles.set_uniform(tile_index, band);
            self.collapse_if_uniform(tile_index);
            return self.write_tile_record(tile_index);
        }

        let block = match self.blocks.block_of_tile(tile_index) {
            Some(block) => block,

            None => {
                let block = self.blocks.allocate(tile_index)?;

                // seed the fresh block with the buffer once per band; the
                // other bands keep their uniform bits, so their copies are
                // placeholders that are never read back
                self.storage.seek_to(self.block_location(block))?;
                for _ in 0..self.header.bands {
                    self.storage.write_all(data)?;
                }

                block
            }
        };

        if !self.header.intrinsic_write {
            self.dirty_tiles[tile_index] = true;
        }

        let location = self.block_location(block) + (band * self.header.slice_bytes()) as u64;
        self.storage.seek_to(location)?;
        self.storage.write_all(data)?;

        self.tiles.clear_uniform(tile_index, band);
        self.write_tile_record(tile_index)
    }

    /// Copy the overlap of each covered tile between the region buffer
    /// and the tile buffer, reading each slice once.
    fn read_region(
        &mut self,
        buffer: &mut [u8],
        position: Vec2<usize>,
        size: Vec2<usize>,
        band: usize,
        tile_buffer: &mut [u8],
    ) -> UnitResult {
        self.check_region(position, size)?;
        self.check_band(band)?;
        self.check_buffer(buffer.len(), size.area() * self.header.data_unit_size)?;

        let value_size = self.header.data_unit_size;
        let slice_bytes = self.header.slice_bytes();
        let Vec2(tile_width, tile_height) = self.header.tile_size;
        let Vec2(x, y) = position;
        let Vec2(width, height) = size;

        let first_tile_x = x / tile_width;
        let first_tile_y = y / tile_height;
        let last_tile_x = (x + width - 1) / tile_width;
        let last_tile_y = (y + height - 1) / tile_height;

        for tile_y in first_tile_y..=last_tile_y {
            for tile_x in first_tile_x..=last_tile_x {
                let tile_index = self.check_tile(Vec2(tile_x, tile_y))?;
                self.read_slice(&mut tile_buffer[..slice_bytes], tile_index, band)?;

                let start_x = x.saturating_sub(tile_x * tile_width);
                let start_y = y.saturating_sub(tile_y * tile_height);
                let end_x = (x + width - 1 - tile_x * tile_width).min(tile_width - 1);
                let end_y = (y + height - 1 - tile_y * tile_height).min(tile_height - 1);
                let data_x = tile_x * tile_width + start_x - x;
                let data_y = tile_y * tile_height + start_y - y;

                let row_bytes = (end_x - start_x + 1) * value_size;
                for row in 0..=(end_y - start_y) {
                    let from = ((start_y + row) * tile_width + start_x) * value_size;
                    let into = ((data_y + row) * width + data_x) * value_size;
                    buffer[into..into + row_bytes]
                        .copy_from_slice(&tile_buffer[from..from + row_bytes]);
                }
            }
        }

        Ok(())
    }

    /// Fetch, modify and store each covered tile: the slice is read,
    /// the overlapping window is replaced, and the slice is written back
    /// through the intrinsic-write machinery.
    fn write_region(
        &mut self,
        data: &[u8],
        position: Vec2<usize>,
        size: Vec2<usize>,
        band: usize,
        tile_buffer: &mut [u8],
    ) -> UnitResult {
        self.check_writable()?;
        self.check_region(position, size)?;
        self.check_band(band)?;
        self.check_buffer(data.len(), size.area() * self.header.data_unit_size)?;

        let value_size = self.header.data_unit_size;
        let slice_bytes = self.header.slice_bytes();
        let Vec2(tile_width, tile_height) = self.header.tile_size;
        let Vec2(x, y) = position;
        let Vec2(width, height) = size;

        let first_tile_x = x / tile_width;
        let first_tile_y = y / tile_height;
        let last_tile_x = (x + width - 1) / tile_width;
        let last_tile_y = (y + height - 1) / tile_height;

        for tile_y in first_tile_y..=last_tile_y {
            for tile_x in first_tile_x..=last_tile_x {
                let tile_index = self.check_tile(Vec2(tile_x, tile_y))?;
                self.read_slice(&mut tile_buffer[..slice_bytes], tile_index, band)?;

                let start_x = x.saturating_sub(tile_x * tile_width);
                let start_y = y.saturating_sub(tile_y * tile_height);
                let end_x = (x + width - 1 - tile_x * tile_width).min(tile_width - 1);
                let end_y = (y + height - 1 - tile_y * tile_height).min(tile_height - 1);
                let data_x = tile_x * tile_width + start_x - x;
                let data_y = tile_y * tile_height + start_y - y;

                let row_bytes = (end_x - start_x + 1) * value_size;
                for row in 0..=(end_y - start_y) {
                    let into = ((start_y + row) * tile_width + start_x) * value_size;
                    let from = ((data_y + row) * width + data_x) * value_size;
                    tile_buffer[into..into + row_bytes]
                        .copy_from_slice(&data[from..from + row_bytes]);
                }

                self.write_slice(&tile_buffer[..slice_bytes], tile_index, band)?;
            }
        }

        Ok(())
    }

    pub(crate) fn grow_region_buffer(&mut self, bytes: usize) -> Vec<u8> {
        let mut buffer = mem::take(&mut self.region_buffer);
        if buffer.len() < bytes {
            buffer.resize(bytes, 0);
        }

        buffer
    }

    pub(crate) fn restore_region_buffer(&mut self, buffer: Vec<u8>) {
        // the high-water mark is kept so repeated large writes reuse it
        self.region_buffer = buffer;
    }
}

impl Drop for SifFile {
    fn drop(&mut self) {
        if !self.closed && !self.read_only {
            // best effort; errors surface through close() for callers
            // that need to observe them
            let _ = self.run_flush();
        }
    }
}
