
//! Byte order primitives and positioned access to the underlying file.
//!
//! Everything multi-byte in a SIF file is stored in network (big-endian)
//! order, except the affine transform doubles of legacy version-1 files,
//! which remain in the order of the machine that wrote them.

use crate::error::{Error, ErrorKind, Result, UnitResult};
use lebe::prelude::*;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

/// The byte order of the pixel values stored in a file.
///
/// The storage engine itself never interprets pixel bytes; this code only
/// becomes meaningful through the "simple" data type convention, where it
/// occupies the tens digit of the user data type word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Least significant byte first. Code `0`.
    LittleEndian,

    /// Most significant byte first. Code `1`.
    BigEndian,
}

impl ByteOrder {
    /// The byte order of the machine this library runs on.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") { ByteOrder::BigEndian } else { ByteOrder::LittleEndian }
    }

    /// Interpret a stored endian code.
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(ByteOrder::LittleEndian),
            1 => Ok(ByteOrder::BigEndian),
            _ => Err(Error::new(ErrorKind::UndefinedEndian)),
        }
    }

    /// The numeric code of this byte order.
    pub fn code(self) -> i32 {
        match self {
            ByteOrder::LittleEndian => 0,
            ByteOrder::BigEndian => 1,
        }
    }
}

/// Reverse the bytes of every `element_size`-sized element in the buffer,
/// in place. The buffer length must be a multiple of the element size.
pub fn swap_element_bytes(buffer: &mut [u8], element_size: usize) {
    if element_size < 2 {
        return;
    }

    debug_assert_eq!(
        buffer.len() % element_size,
        0,
        "buffer length is not a multiple of the element size"
    );

    for element in buffer.chunks_exact_mut(element_size) {
        element.reverse();
    }
}

/// Convert a buffer of native-order elements to the requested order, in place.
pub fn convert_from_native(buffer: &mut [u8], element_size: usize, order: ByteOrder) {
    if order != ByteOrder::native() {
        swap_element_bytes(buffer, element_size);
    }
}

/// Convert a buffer of elements stored in the given order to native order, in place.
pub fn convert_to_native(buffer: &mut [u8], element_size: usize, order: ByteOrder) {
    if order != ByteOrder::native() {
        swap_element_bytes(buffer, element_size);
    }
}

/// Positioned access to the bytes of an image file.
///
/// Every operation maps its failure to the matching [`ErrorKind`]
/// and retains the OS error for diagnostics. Offsets are 64-bit.
#[derive(Debug)]
pub struct Storage {
    inner: File,
}

impl Storage {
    /// Wrap an opened file.
    pub fn new(inner: File) -> Self {
        Storage { inner }
    }

    /// Move the cursor to an absolute byte position.
    pub fn seek_to(&mut self, position: u64) -> UnitResult {
        self.inner
            .seek(SeekFrom::Start(position))
            .map(|_| ())
            .map_err(|error| Error::io(ErrorKind::Seek, error))
    }

    /// Fill the whole buffer from the current position.
    pub fn read_exact(&mut self, buffer: &mut [u8]) -> UnitResult {
        self.inner.read_exact(buffer).map_err(|error| Error::io(ErrorKind::Read, error))
    }

    /// Read as many bytes as are available, returning the count. Zero means end of file.
    pub fn read_some(&mut self, buffer: &mut [u8]) -> Result<usize> {
        self.inner.read(buffer).map_err(|error| Error::io(ErrorKind::Read, error))
    }

    /// Write the whole buffer at the current position.
    pub fn write_all(&mut self, buffer: &[u8]) -> UnitResult {
        self.inner.write_all(buffer).map_err(|error| Error::io(ErrorKind::Write, error))
    }

    /// Cut the file off at the given length, or zero-extend it to that length.
    pub fn truncate(&mut self, length: u64) -> UnitResult {
        self.inner.set_len(length).map_err(|error| Error::io(ErrorKind::Truncate, error))
    }

    /// Push all written bytes down to the operating system and the device.
    pub fn flush(&mut self) -> UnitResult {
        self.inner.sync_all().map_err(|error| Error::io(ErrorKind::Write, error))
    }

    /// Read a big-endian 32-bit signed integer.
    pub fn read_i32(&mut self) -> Result<i32> {
        i32::read_from_big_endian(&mut self.inner).map_err(|error| Error::io(ErrorKind::Read, error))
    }

    /// Write a big-endian 32-bit signed integer.
    pub fn write_i32(&mut self, value: i32) -> UnitResult {
        self.inner.write_as_big_endian(&value).map_err(|error| Error::io(ErrorKind::Write, error))
    }

    /// Read a big-endian IEEE-754 double.
    pub fn read_f64(&mut self) -> Result<f64> {
        f64::read_from_big_endian(&mut self.inner).map_err(|error| Error::io(ErrorKind::Read, error))
    }

    /// Write a big-endian IEEE-754 double.
    pub fn write_f64(&mut self, value: f64) -> UnitResult {
        self.inner.write_as_big_endian(&value).map_err(|error| Error::io(ErrorKind::Write, error))
    }

    /// Read a host-order double, as found in version-1 files.
    pub fn read_f64_native(&mut self) -> Result<f64> {
        f64::read_from_native_endian(&mut self.inner)
            .map_err(|error| Error::io(ErrorKind::Read, error))
    }

    /// Write a host-order double, reproducing the version-1 anomaly.
    pub fn write_f64_native(&mut self, value: f64) -> UnitResult {
        self.inner.write_as_native_endian(&value).map_err(|error| Error::io(ErrorKind::Write, error))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn swap_words() {
        let mut buffer = [0x12, 0x34, 0x56, 0x78];
        swap_element_bytes(&mut buffer, 2);
        assert_eq!(buffer, [0x34, 0x12, 0x78, 0x56]);
    }

    #[test]
    fn swap_doubles() {
        let mut buffer = [0, 1, 2, 3, 4, 5, 6, 7];
        swap_element_bytes(&mut buffer, 8);
        assert_eq!(buffer, [7, 6, 5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn swap_single_bytes_is_identity() {
        let mut buffer = [1, 2, 3];
        swap_element_bytes(&mut buffer, 1);
        assert_eq!(buffer, [1, 2, 3]);
    }

    #[test]
    fn native_conversion_round_trips() {
        let original = [0x12, 0x34, 0x56, 0x78];

        for order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
            let mut buffer = original;
            convert_from_native(&mut buffer, 4, order);
            convert_to_native(&mut buffer, 4, order);
            assert_eq!(buffer, original);
        }
    }

    #[test]
    fn endian_codes() {
        assert_eq!(ByteOrder::from_code(0).unwrap(), ByteOrder::LittleEndian);
        assert_eq!(ByteOrder::from_code(1).unwrap(), ByteOrder::BigEndian);
        assert!(ByteOrder::from_code(2).is_err());
        assert_eq!(ByteOrder::native().code(), ByteOrder::native().code());
    }
}
