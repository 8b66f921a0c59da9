
//! Deep uniformity scanning of slice buffers.
//!
//! A slice buffer always spans the full `tile_width × tile_height`
//! rectangle, but border tiles cover fewer real pixels. The scan walks only
//! the in-image extent; the bytes beyond it are junk and must not
//! disqualify uniformity.

use crate::math::Vec2;

/// Whether every pixel inside the extent equals the first pixel,
/// compared byte for byte.
///
/// `row_units` is the number of pixels per buffer row (the tile width);
/// `extent` is the in-image sub-rectangle, anchored at the top-left corner.
pub fn slice_is_uniform(
    slice: &[u8],
    value_size: usize,
    row_units: usize,
    extent: Vec2<usize>,
) -> bool {
    debug_assert!(extent.width() >= 1 && extent.width() <= row_units, "scan extent exceeds the slice row");

    match value_size {
        // single bytes and byte pairs are compared without sub-slicing,
        // these two sizes dominate real images
        1 => {
            let first = slice[0];

            (0..extent.height()).all(|row| {
                let start = row * row_units;
                slice[start..start + extent.width()].iter().all(|&byte| byte == first)
            })
        }

        2 => {
            let first = [slice[0], slice[1]];

            (0..extent.height()).all(|row| {
                let start = row * row_units * 2;
                slice[start..start + extent.width() * 2]
                    .chunks_exact(2)
                    .all(|unit| unit == first)
            })
        }

        _ => {
            let first = &slice[..value_size];

            (0..extent.height()).all(|row| {
                let start = row * row_units * value_size;
                slice[start..start + extent.width() * value_size]
                    .chunks_exact(value_size)
                    .all(|unit| unit == first)
            })
        }
    }
}

/// Fill a slice buffer by replicating a single pixel value.
pub fn fill_with_value(buffer: &mut [u8], value: &[u8]) {
    if value.len() == 1 {
        let byte = value[0];
        for slot in buffer.iter_mut() {
            *slot = byte;
        }
    } else {
        for unit in buffer.chunks_exact_mut(value.len()) {
            unit.copy_from_slice(value);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn uniform_bytes() {
        let slice = [7_u8; 16];
        assert!(slice_is_uniform(&slice, 1, 4, Vec2(4, 4)));

        let mut slice = slice;
        slice[9] = 8;
        assert!(!slice_is_uniform(&slice, 1, 4, Vec2(4, 4)));
    }

    #[test]
    fn border_junk_is_ignored() {
        // a 4x4 tile of which only the top-left 2x2 pixels are real
        let mut slice = [0x55_u8; 16];
        slice[2] = 0xEE; // outside the extent, same row
        slice[11] = 0xEE; // outside the extent, below
        assert!(slice_is_uniform(&slice, 1, 4, Vec2(2, 2)));

        slice[4] = 0xEE; // row 1, column 0: inside
        assert!(!slice_is_uniform(&slice, 1, 4, Vec2(2, 2)));
    }

    #[test]
    fn word_sized_units() {
        let mut slice = Vec::new();
        for _ in 0..16 {
            slice.extend_from_slice(&[0x12, 0x34]);
        }
        assert!(slice_is_uniform(&slice, 2, 4, Vec2(4, 4)));

        slice[2 * 5 + 1] = 0x35;
        assert!(!slice_is_uniform(&slice, 2, 4, Vec2(4, 4)));
    }

    #[test]
    fn wide_units_use_full_comparison() {
        let pixel = [1_u8, 2, 3, 4];
        let mut slice = Vec::new();
        for _ in 0..4 {
            slice.extend_from_slice(&pixel);
        }
        assert!(slice_is_uniform(&slice, 4, 2, Vec2(2, 2)));

        slice[4 * 3] = 9;
        assert!(!slice_is_uniform(&slice, 4, 2, Vec2(2, 2)));
    }

    #[test]
    fn replication_fills_every_unit() {
        let mut buffer = [0_u8; 8];
        fill_with_value(&mut buffer, &[0xAB, 0xCD]);
        assert_eq!(buffer, [0xAB, 0xCD, 0xAB, 0xCD, 0xAB, 0xCD, 0xAB, 0xCD]);

        let mut bytes = [0_u8; 4];
        fill_with_value(&mut bytes, &[9]);
        assert_eq!(bytes, [9, 9, 9, 9]);
    }
}
