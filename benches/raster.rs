#[macro_use]
extern crate bencher;

extern crate sif;
use sif::prelude::*;

use bencher::Bencher;

fn write_sparse_image(bench: &mut Bencher) {
    let directory = tempfile::TempDir::new().unwrap();
    let path = directory.path().join("bench_write.sif");

    let mut description = ImageDescription::new(Vec2(256, 256), 1, Vec2(64, 64), 1);
    description.intrinsic_write = true;

    // half the tiles stay uniform, half get real data
    let ramp: Vec<u8> = (0..64 * 64).map(|index| (index % 251) as u8).collect();

    bench.iter(|| {
        let mut file = SifFile::create(&path, &description).unwrap();

        for tile_y in 0..4 {
            for tile_x in 0..4 {
                if (tile_x + tile_y) % 2 == 0 {
                    file.set_tile_slice(&ramp, Vec2(tile_x, tile_y), 0).unwrap();
                } else {
                    file.fill_tile_slice(Vec2(tile_x, tile_y), 0, &[0x40]).unwrap();
                }
            }
        }

        bencher::black_box(file.close().unwrap());
    })
}

fn read_full_raster(bench: &mut Bencher) {
    let directory = tempfile::TempDir::new().unwrap();
    let path = directory.path().join("bench_read.sif");

    let mut description = ImageDescription::new(Vec2(256, 256), 1, Vec2(64, 64), 1);
    description.intrinsic_write = true;

    let mut file = SifFile::create(&path, &description).unwrap();
    let ramp: Vec<u8> = (0..64 * 64).map(|index| (index % 247) as u8).collect();
    file.set_tile_slice(&ramp, Vec2(1, 1), 0).unwrap();
    file.set_tile_slice(&ramp, Vec2(2, 3), 0).unwrap();
    file.flush().unwrap();

    let mut buffer = vec![0_u8; 256 * 256];

    bench.iter(|| {
        file.get_raster(&mut buffer, Vec2(0, 0), Vec2(256, 256), 0).unwrap();
        bencher::black_box(&buffer);
    })
}

benchmark_group!(raster, write_sparse_image, read_full_raster);
benchmark_main!(raster);
