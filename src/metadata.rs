
//! The keyed meta-data dictionary of an image.
//!
//! Entries map a key (a non-empty byte string, in practice a short name)
//! to an arbitrary byte value. On disk the entries live directly after the
//! last used block, as a sequence of length-prefixed records with no
//! ordering guarantee. Keys starting with `_sif_` are reserved for the
//! format itself (`_sif_proj` for the projection, `_sif_agree` for the
//! data type convention).

use crate::error::{i32_to_usize, Error, ErrorKind, Result};
use crate::io::Storage;
use std::collections::HashMap;

/// The reserved key holding the projection string (OpenGIS WKT).
pub const PROJECTION_KEY: &[u8] = b"_sif_proj";

/// The reserved key naming the data type convention of the file.
pub const AGREEMENT_KEY: &[u8] = b"_sif_agree";

/// An in-memory dictionary of meta-data entries.
///
/// String values are stored with their `NUL` terminator so that files
/// written by this library are byte-identical to those of the original
/// tooling; binary values are stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetaDataStore {
    entries: HashMap<Vec<u8>, Vec<u8>>,
}

impl MetaDataStore {
    /// An empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the dictionary holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry exists for the key.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    /// The raw value bytes of an entry.
    pub fn get(&self, key: &[u8]) -> Result<&[u8]> {
        self.entries
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::new(ErrorKind::MetaDataKey))
    }

    /// The value of an entry as a string, which must be `NUL`-terminated
    /// valid UTF-8 up to the terminator.
    pub fn get_str(&self, key: &[u8]) -> Result<&str> {
        let value = self.get(key)?;

        let terminator = value
            .iter()
            .position(|&byte| byte == 0)
            .ok_or_else(|| Error::detailed(ErrorKind::MetaDataValue, "meta-data value is not a string"))?;

        std::str::from_utf8(&value[..terminator])
            .map_err(|_| Error::detailed(ErrorKind::MetaDataValue, "meta-data string is not valid UTF-8"))
    }

    /// Insert an entry or replace the value of an existing one.
    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        debug_assert!(!key.is_empty(), "meta-data keys must not be empty");
        self.entries.insert(key.to_vec(), value.to_vec());
    }

    /// Insert or replace an entry with a string value.
    /// The terminator is stored with the value.
    pub fn set_str(&mut self, key: &[u8], value: &str) {
        let mut bytes = Vec::with_capacity(value.len() + 1);
        bytes.extend_from_slice(value.as_bytes());
        bytes.push(0);
        debug_assert!(!key.is_empty(), "meta-data keys must not be empty");
        self.entries.insert(key.to_vec(), bytes);
    }

    /// Remove an entry. Returns whether it existed.
    pub fn remove(&mut self, key: &[u8]) -> bool {
        self.entries.remove(key).is_some()
    }

    /// All keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.keys().map(Vec::as_slice)
    }

    /// Write all entries at the given byte location and truncate the file
    /// one byte past the written region. Returns the truncated length.
    ///
    /// Record layout: `i32 key length | key bytes | i32 value length |
    /// value bytes`, with the key stored `NUL`-terminated and its length
    /// counting the terminator.
    pub(crate) fn write(&self, storage: &mut Storage, location: u64) -> Result<u64> {
        storage.seek_to(location)?;
        let mut end = location;

        for (key, value) in &self.entries {
            storage.write_i32((key.len() + 1) as i32)?;
            storage.write_all(key)?;
            storage.write_all(&[0])?;
            storage.write_i32(value.len() as i32)?;
            storage.write_all(value)?;
            end += (4 + key.len() + 1 + 4 + value.len()) as u64;
        }

        // the extra byte is preserved for bit-exact compatibility
        let length = end + 1;
        storage.truncate(length)?;
        Ok(length)
    }

    /// Read exactly `count` entries from the given byte location.
    /// Any short read abandons the partially read dictionary.
    pub(crate) fn read(storage: &mut Storage, location: u64, count: usize) -> Result<Self> {
        let mut store = MetaDataStore::new();
        storage.seek_to(location)?;

        for _ in 0..count {
            let key_length = i32_to_usize(storage.read_i32()?, "negative meta-data key length")?;
            let mut key = vec![0_u8; key_length];
            storage.read_exact(&mut key)?;

            // the stored length counts the terminator
            if key.last() == Some(&0) {
                key.pop();
            }

            let value_length = i32_to_usize(storage.read_i32()?, "negative meta-data value length")?;
            let mut value = vec![0_u8; value_length];
            storage.read_exact(&mut value)?;

            store.entries.insert(key, value);
        }

        Ok(store)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn string_values_round_trip() {
        let mut store = MetaDataStore::new();
        store.set_str(b"_sif_proj", "EPSG:26913");

        assert_eq!(store.get_str(b"_sif_proj").unwrap(), "EPSG:26913");
        assert_eq!(store.get(b"_sif_proj").unwrap(), b"EPSG:26913\0");
    }

    #[test]
    fn binary_values_may_lack_terminators() {
        let mut store = MetaDataStore::new();
        store.set(b"histogram", &[1, 2, 3]);

        assert_eq!(store.get(b"histogram").unwrap(), &[1, 2, 3]);
        assert_eq!(store.get_str(b"histogram").unwrap_err().kind(), ErrorKind::MetaDataValue);
    }

    #[test]
    fn missing_keys_are_reported() {
        let store = MetaDataStore::new();
        assert_eq!(store.get(b"nothing").unwrap_err().kind(), ErrorKind::MetaDataKey);
    }

    #[test]
    fn removal_shrinks_the_store() {
        let mut store = MetaDataStore::new();
        store.set_str(b"a", "1");
        store.set_str(b"b", "2");
        assert_eq!(store.len(), 2);

        assert!(store.remove(b"a"));
        assert!(!store.remove(b"a"));
        assert_eq!(store.len(), 1);
        assert!(store.contains(b"b"));
    }

    #[test]
    fn updating_a_key_keeps_one_entry() {
        let mut store = MetaDataStore::new();
        store.set_str(b"k", "first");
        store.set_str(b"k", "second, longer value");

        assert_eq!(store.len(), 1);
        assert_eq!(store.get_str(b"k").unwrap(), "second, longer value");
    }
}
