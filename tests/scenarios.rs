//! End-to-end walks through the storage engine: uniform fills that never
//! allocate a block, writes that do, re-collapapsing overwrites, raster
//! windows spanning tiles, foreign byte orders, and defragmentation.

extern crate sif;

use sif::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn scratch_path(directory: &TempDir, name: &str) -> PathBuf {
    directory.path().join(name)
}

/// A 10x10 single-band byte image with 4x4 tiles and intrinsic writes.
fn small_intrinsic_image() -> ImageDescription {
    let mut description = ImageDescription::new(Vec2(10, 10), 1, Vec2(4, 4), 1);
    description.intrinsic_write = true;
    description
}

#[test]
fn uniform_fill_never_allocates_a_block() {
    let directory = TempDir::new().unwrap();
    let path = scratch_path(&directory, "fill.sif");

    let mut file = SifFile::create(&path, &small_intrinsic_image()).unwrap();
    assert_eq!(file.header().tile_count(), 9);

    file.fill_tile_slice(Vec2(0, 0), 0, &[0x55]).unwrap();

    for block in 0..file.header().tile_count() {
        assert_eq!(file.blocks().tile_of_block(block), None);
    }

    assert!(file.tiles().is_uniform(0, 0));
    assert_eq!(file.tiles().uniform_value(0, 0), &[0x55]);

    file.close().unwrap();

    // the fill must survive the round trip purely through the tile header
    let mut file = SifFile::open(&path, false).unwrap();
    let mut slice = vec![0_u8; 16];
    file.get_tile_slice(&mut slice, Vec2(0, 0), 0).unwrap();
    assert_eq!(slice, vec![0x55; 16]);

    // a non-uniform write forces a physical block into existence
    let ramp: Vec<u8> = (0..16).collect();
    file.set_tile_slice(&ramp, Vec2(0, 0), 0).unwrap();

    assert_eq!(file.blocks().block_of_tile(0), Some(0));

    let mut slice = vec![0_u8; 16];
    file.get_tile_slice(&mut slice, Vec2(0, 0), 0).unwrap();
    assert_eq!(slice, ramp);

    let expected_minimum = file.base_location() + file.header().tile_bytes() as u64;
    drop(file);
    assert!(std::fs::metadata(&path).unwrap().len() >= expected_minimum);

    // overwriting with constant pixels re-collapses the tile on the spot
    let mut file = SifFile::open(&path, false).unwrap();
    file.set_tile_slice(&[0x55; 16], Vec2(0, 0), 0).unwrap();

    for block in 0..file.header().tile_count() {
        assert_eq!(file.blocks().tile_of_block(block), None);
    }

    let mut slice = vec![0_u8; 16];
    file.get_tile_slice(&mut slice, Vec2(0, 0), 0).unwrap();
    assert_eq!(slice, vec![0x55; 16]);
}

#[test]
fn raster_window_is_scattered_over_single_pixel_tiles() {
    let directory = TempDir::new().unwrap();
    let path = scratch_path(&directory, "scatter.sif");

    let mut description = ImageDescription::new(Vec2(2, 2), 1, Vec2(1, 1), 1);
    description.intrinsic_write = true;

    let mut file = SifFile::create(&path, &description).unwrap();
    assert_eq!(file.header().tiles_across(), 2);

    file.set_raster(&[1, 2, 3, 4], Vec2(0, 0), Vec2(2, 2), 0).unwrap();

    let mut pixel = [0_u8; 1];
    file.get_tile_slice(&mut pixel, Vec2(0, 0), 0).unwrap();
    assert_eq!(pixel, [1]);
    file.get_tile_slice(&mut pixel, Vec2(1, 0), 0).unwrap();
    assert_eq!(pixel, [2]);
    file.get_tile_slice(&mut pixel, Vec2(0, 1), 0).unwrap();
    assert_eq!(pixel, [3]);
    file.get_tile_slice(&mut pixel, Vec2(1, 1), 0).unwrap();
    assert_eq!(pixel, [4]);
}

#[test]
fn big_endian_pixels_are_stored_swapped() {
    if ByteOrder::native() == ByteOrder::BigEndian {
        return; // the interesting direction needs a little-endian host
    }

    let directory = TempDir::new().unwrap();
    let path = scratch_path(&directory, "big_endian.sif");

    let mut file = sif::simple::create(
        &path,
        Vec2(2, 1),
        1,
        SampleType::UInt16,
        false,
        false,
        Vec2(2, 1),
        false,
    )
    .unwrap();

    file.simple_set_byte_order(ByteOrder::BigEndian);

    let pixels: Vec<u8> = [0x1234_u16, 0x5678]
        .iter()
        .flat_map(|value| value.to_ne_bytes().to_vec())
        .collect();

    file.simple_set_raster(&pixels, Vec2(0, 0), Vec2(2, 1), 0).unwrap();
    file.flush().unwrap();

    // the file must hold network-order pixel bytes at the slice offset
    let base = file.base_location() as usize;
    let stored = std::fs::read(&path).unwrap();
    assert_eq!(&stored[base..base + 4], &[0x12, 0x34, 0x56, 0x78]);

    // while the caller keeps seeing host-order values
    let mut read_back = vec![0_u8; 4];
    file.simple_get_raster(&mut read_back, Vec2(0, 0), Vec2(2, 1), 0).unwrap();
    assert_eq!(read_back, pixels);
}

#[test]
fn defragmentation_moves_the_surviving_block_down() {
    let directory = TempDir::new().unwrap();
    let path = scratch_path(&directory, "defrag.sif");

    // three 4x4 tiles in a row, no automatic maintenance
    let description = ImageDescription::new(Vec2(12, 4), 1, Vec2(4, 4), 1);
    let mut file = SifFile::create(&path, &description).unwrap();

    let ramp: Vec<u8> = (0..16).collect();
    for tile_x in 0..3 {
        file.set_tile_slice(&ramp, Vec2(tile_x, 0), 0).unwrap();
    }

    // refilling the first two tiles leaves only tile 2's block in use,
    // stranded at block index 2
    file.fill_tile_slice(Vec2(0, 0), 0, &[0]).unwrap();
    file.fill_tile_slice(Vec2(1, 0), 0, &[0]).unwrap();
    assert_eq!(file.blocks().block_of_tile(2), Some(2));

    file.close().unwrap();

    let mut file = SifFile::open(&path, false).unwrap();
    file.set_defragment(true);
    file.flush().unwrap();

    assert_eq!(file.blocks().block_of_tile(2), Some(0));
    assert!(file.blocks().is_consistent());

    let mut slice = vec![0_u8; 16];
    file.get_tile_slice(&mut slice, Vec2(2, 0), 0).unwrap();
    assert_eq!(slice, ramp);

    // the freed tail is gone: one block, no meta-data, one trailing byte
    let expected = file.base_location() + file.header().tile_bytes() as u64 + 1;
    file.close().unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), expected);
}
