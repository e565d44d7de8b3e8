//! The verified asset bundle and its packed container format.
//!
//! A package is a gzip stream wrapping a packed sequence of (path, bytes)
//! pairs: u32 LE entry count, then per entry a u32 LE path length, the UTF-8
//! path, a u32 LE payload length, and the payload. Both the packer (release
//! tooling, tests) and the loader live here, so the format has exactly one
//! definition.

use std::collections::HashMap;
use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("Package stream is truncated")]
    Truncated,
    #[error("Package entry path is not valid UTF-8")]
    BadPath,
    #[error("Failed to decompress package: {0}")]
    Decompression(String),
}

/// The installed set of interface files served to the display surface.
/// Produced only from a fully verified package; immutable afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetBundle {
    files: HashMap<String, Vec<u8>>,
}

impl AssetBundle {
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Parse the packed (path, bytes) sequence. Later duplicates of a path
    /// replace earlier ones.
    pub fn unpack(bytes: &[u8]) -> Result<Self, BundleError> {
        let mut cursor = Cursor { bytes, offset: 0 };
        let count = cursor.read_u32()?;

        let mut files = HashMap::new();
        for _ in 0..count {
            let path_len = cursor.read_u32()? as usize;
            let path = std::str::from_utf8(cursor.read_slice(path_len)?)
                .map_err(|_| BundleError::BadPath)?
                .to_string();
            let data_len = cursor.read_u32()? as usize;
            let data = cursor.read_slice(data_len)?.to_vec();
            files.insert(path, data);
        }
        Ok(Self { files })
    }

    /// Serialize (path, bytes) pairs into the packed container format.
    pub fn pack(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        for (path, data) in entries {
            out.extend_from_slice(&(path.len() as u32).to_le_bytes());
            out.extend_from_slice(path.as_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(data);
        }
        out
    }
}

impl FromIterator<(String, Vec<u8>)> for AssetBundle {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl Cursor<'_> {
    fn read_u32(&mut self) -> Result<u32, BundleError> {
        let slice = self.read_slice(4)?;
        Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
    }

    fn read_slice(&mut self, len: usize) -> Result<&[u8], BundleError> {
        let end = self.offset.checked_add(len).ok_or(BundleError::Truncated)?;
        if end > self.bytes.len() {
            return Err(BundleError::Truncated);
        }
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }
}

/// gzip-compress a packed stream.
pub fn compress(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    // Writing to a Vec cannot fail.
    let _ = encoder.write_all(bytes);
    encoder.finish().unwrap_or_default()
}

/// Decompress a package stream; corrupt input is an error, never a panic.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, BundleError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| BundleError::Decompression(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entries() -> Vec<(String, Vec<u8>)> {
        vec![
            ("a.html".to_string(), b"<html>hello</html>".to_vec()),
            ("js/b.js".to_string(), b"console.log('hi');".to_vec()),
            ("img/logo.png".to_string(), vec![0x89, 0x50, 0x4e, 0x47, 0x00]),
        ]
    }

    #[test]
    fn test_pack_unpack_roundtrip() {
        let entries = sample_entries();
        let bundle = AssetBundle::unpack(&AssetBundle::pack(&entries)).unwrap();

        assert_eq!(bundle.len(), 3);
        for (path, data) in &entries {
            assert_eq!(bundle.get(path), Some(data.as_slice()));
        }
        assert_eq!(bundle.get("missing"), None);
    }

    #[test]
    fn test_compress_decompress_roundtrip() {
        let packed = AssetBundle::pack(&sample_entries());
        let restored = decompress(&compress(&packed)).unwrap();
        assert_eq!(restored, packed);
    }

    #[test]
    fn test_truncated_stream_is_rejected() {
        let packed = AssetBundle::pack(&sample_entries());
        for cut in [0, 3, packed.len() / 2, packed.len() - 1] {
            assert!(matches!(
                AssetBundle::unpack(&packed[..cut]),
                Err(BundleError::Truncated)
            ));
        }
    }

    #[test]
    fn test_non_utf8_path_is_rejected() {
        let mut out = Vec::new();
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&[0xff, 0xfe]);
        out.extend_from_slice(&0u32.to_le_bytes());
        assert!(matches!(AssetBundle::unpack(&out), Err(BundleError::BadPath)));
    }

    #[test]
    fn test_corrupt_gzip_is_an_error() {
        assert!(matches!(
            decompress(b"definitely not gzip"),
            Err(BundleError::Decompression(_))
        ));
    }

    #[test]
    fn test_duplicate_path_last_wins() {
        let entries = vec![
            ("a".to_string(), b"first".to_vec()),
            ("a".to_string(), b"second".to_vec()),
        ];
        let bundle = AssetBundle::unpack(&AssetBundle::pack(&entries)).unwrap();
        assert_eq!(bundle.len(), 1);
        assert_eq!(bundle.get("a"), Some(&b"second"[..]));
    }
}
