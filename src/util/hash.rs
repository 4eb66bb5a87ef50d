//! Content hashing for backup manifests.
//!
//! Uses SHA256 so restored trees can be verified byte-for-byte.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::Result;

/// Hex SHA256 of an in-memory buffer.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hex SHA256 of a file, streamed in 8 KiB chunks.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn file_hash(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_file_hash_matches_content_hash() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f.txt");
        std::fs::write(&path, b"assert 1 == 1\n").unwrap();
        assert_eq!(file_hash(&path).unwrap(), content_hash(b"assert 1 == 1\n"));
    }

    #[test]
    fn test_hash_differs_on_change() {
        assert_ne!(content_hash(b"a"), content_hash(b"b"));
    }
}
