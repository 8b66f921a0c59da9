
//! The tile-header table: one fixed-size record per tile, stored
//! directly after the file header.
//!
//! A record holds the uniform pixel value of every band, the uniformity
//! flag bits, and the tile's block number. All records of an image live in
//! two contiguous arrays here rather than in per-tile allocations, matching
//! their contiguous layout in the file.

use crate::block::BlockMap;
use crate::error::{Error, ErrorKind, Result, UnitResult};
use crate::io::Storage;
use crate::math::ceil_div;
use bit_field::BitField;

/// The in-memory tile-header table of an image.
#[derive(Debug, Clone, PartialEq)]
pub struct TileTable {
    tile_count: usize,
    bands: usize,
    value_size: usize,
    flag_bytes: usize,

    /// `tile_count * bands * value_size` bytes. Slot `(tile, band)` holds the
    /// common pixel of that band while its uniformity bit is set; otherwise
    /// the slot is scratch, but it is still written out.
    uniform_values: Vec<u8>,

    /// `tile_count * flag_bytes` bytes, bit `band` stored MSB-first.
    /// Bits past the last band are always one, keeping them neutral
    /// in the all-uniform test.
    uniform_flags: Vec<u8>,
}

impl TileTable {
    /// The table of a freshly created image: every band of every tile is
    /// uniform with pixel value zero.
    pub fn new_fully_uniform(tile_count: usize, bands: usize, value_size: usize) -> Self {
        let flag_bytes = ceil_div(bands, 8);

        TileTable {
            tile_count,
            bands,
            value_size,
            flag_bytes,
            uniform_values: vec![0_u8; tile_count * bands * value_size],
            uniform_flags: vec![0xFF_u8; tile_count * flag_bytes],
        }
    }

    /// Number of tiles in the table.
    pub fn tile_count(&self) -> usize {
        self.tile_count
    }

    /// Bytes of one record on disk.
    pub fn record_bytes(&self) -> usize {
        self.bands * self.value_size + self.flag_bytes + 4
    }

    fn value_offset(&self, tile: usize, band: usize) -> usize {
        (tile * self.bands + band) * self.value_size
    }

    /// Whether the given band of the given tile is shallow uniform.
    pub fn is_uniform(&self, tile: usize, band: usize) -> bool {
        let byte = self.uniform_flags[tile * self.flag_bytes + band / 8];
        byte.get_bit(7 - band % 8)
    }

    /// Mark a band of a tile as uniform.
    pub fn set_uniform(&mut self, tile: usize, band: usize) {
        self.uniform_flags[tile * self.flag_bytes + band / 8].set_bit(7 - band % 8, true);
    }

    /// Mark a band of a tile as not uniform.
    pub fn clear_uniform(&mut self, tile: usize, band: usize) {
        self.uniform_flags[tile * self.flag_bytes + band / 8].set_bit(7 - band % 8, false);
    }

    /// Whether every band of the tile is shallow uniform.
    ///
    /// Bits above the last band are forced high in a copy of the final flag
    /// byte before testing, so stray trailing bits can never veto the result.
    pub fn all_uniform(&self, tile: usize) -> bool {
        let flags = &self.uniform_flags[tile * self.flag_bytes..(tile + 1) * self.flag_bytes];
        let trailing_mask =
            if self.bands % 8 == 0 { 0x00_u8 } else { 0xFF_u8 >> (8 - self.bands % 8) };

        flags.iter().enumerate().all(|(index, &byte)| {
            let byte = if index + 1 == self.flag_bytes { byte | trailing_mask } else { byte };
            byte == 0xFF
        })
    }

    /// The stored uniform pixel value of a band of a tile.
    pub fn uniform_value(&self, tile: usize, band: usize) -> &[u8] {
        let offset = self.value_offset(tile, band);
        &self.uniform_values[offset..offset + self.value_size]
    }

    /// Store the uniform pixel value of a band of a tile.
    pub fn set_uniform_value(&mut self, tile: usize, band: usize, value: &[u8]) {
        debug_assert_eq!(value.len(), self.value_size, "uniform value has the wrong size");
        let offset = self.value_offset(tile, band);
        self.uniform_values[offset..offset + self.value_size].copy_from_slice(value);
    }

    fn write_record_at_cursor(
        &self,
        storage: &mut Storage,
        tile: usize,
        block: Option<usize>,
    ) -> UnitResult {
        let values = self.value_offset(tile, 0);
        storage.write_all(&self.uniform_values[values..values + self.bands * self.value_size])?;

        let flags = tile * self.flag_bytes;
        storage.write_all(&self.uniform_flags[flags..flags + self.flag_bytes])?;

        storage.write_i32(block.map_or(-1, |block| block as i32))
    }

    /// Rewrite the record of a single tile in place.
    pub fn write_record(
        &self,
        storage: &mut Storage,
        table_location: u64,
        tile: usize,
        block: Option<usize>,
    ) -> UnitResult {
        debug_assert!(tile < self.tile_count, "tile record index out of range");
        storage.seek_to(table_location + (tile * self.record_bytes()) as u64)?;
        self.write_record_at_cursor(storage, tile, block)
    }

    /// Write the whole table in one sequential pass.
    pub fn write_all(
        &self,
        storage: &mut Storage,
        table_location: u64,
        blocks: &BlockMap,
    ) -> UnitResult {
        storage.seek_to(table_location)?;

        for tile in 0..self.tile_count {
            self.write_record_at_cursor(storage, tile, blocks.block_of_tile(tile))?;
        }

        Ok(())
    }

    /// Read the whole table. Returns the table and the block number of
    /// every tile, in tile order, for rebuilding the block map.
    pub fn read_all(
        storage: &mut Storage,
        table_location: u64,
        tile_count: usize,
        bands: usize,
        value_size: usize,
    ) -> Result<(Self, Vec<Option<usize>>)> {
        let mut table = TileTable::new_fully_uniform(tile_count, bands, value_size);
        let mut tile_blocks = vec![None; tile_count];

        storage.seek_to(table_location)?;

        for tile in 0..tile_count {
            let values = table.value_offset(tile, 0);
            storage.read_exact(&mut table.uniform_values[values..values + bands * value_size])?;

            let flags = tile * table.flag_bytes;
            storage.read_exact(&mut table.uniform_flags[flags..flags + table.flag_bytes])?;

            let block = storage.read_i32()?;
            tile_blocks[tile] = match block {
                -1 => None,
                block if block >= 0 => Some(block as usize),
                _ => return Err(Error::detailed(ErrorKind::InvalidBlockNumber, "negative block number in tile record")),
            };
        }

        Ok((table, tile_blocks))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn starts_fully_uniform() {
        let table = TileTable::new_fully_uniform(4, 3, 2);

        for tile in 0..4 {
            assert!(table.all_uniform(tile));
            for band in 0..3 {
                assert!(table.is_uniform(tile, band));
                assert_eq!(table.uniform_value(tile, band), &[0, 0]);
            }
        }
    }

    #[test]
    fn flag_bits_are_msb_first() {
        let mut table = TileTable::new_fully_uniform(1, 3, 1);
        table.clear_uniform(0, 0);

        // band zero lives in the most significant bit
        assert_eq!(table.uniform_flags[0] & 0x80, 0);
        assert!(table.is_uniform(0, 1));
        assert!(table.is_uniform(0, 2));
    }

    #[test]
    fn trailing_bits_do_not_veto_all_uniform() {
        let mut table = TileTable::new_fully_uniform(1, 3, 1);

        // clear the whole flag byte, then restore only the three real bands
        table.uniform_flags[0] = 0;
        assert!(!table.all_uniform(0));

        for band in 0..3 {
            table.set_uniform(0, band);
        }
        assert!(table.all_uniform(0));
    }

    #[test]
    fn nine_bands_span_two_flag_bytes() {
        let mut table = TileTable::new_fully_uniform(1, 9, 1);
        assert!(table.all_uniform(0));

        table.clear_uniform(0, 8);
        assert!(!table.is_uniform(0, 8));
        assert!(!table.all_uniform(0));

        table.set_uniform(0, 8);
        assert!(table.all_uniform(0));
    }

    #[test]
    fn uniform_values_are_per_band() {
        let mut table = TileTable::new_fully_uniform(2, 2, 2);
        table.set_uniform_value(1, 1, &[0xAB, 0xCD]);

        assert_eq!(table.uniform_value(1, 1), &[0xAB, 0xCD]);
        assert_eq!(table.uniform_value(1, 0), &[0, 0]);
        assert_eq!(table.uniform_value(0, 1), &[0, 0]);
    }
}
