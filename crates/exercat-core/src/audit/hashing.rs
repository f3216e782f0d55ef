//! Content hashes recorded in the audit trail.

use crate::error::{CatalogError, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Chunk size for reading files (1MB).
const CHUNK_SIZE: usize = 1024 * 1024;

/// SHA256 of a file as lowercase hex.
pub fn compute_sha256(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).map_err(|e| CatalogError::io_with_path(e, path))?;
    let mut hasher = Sha256::new();

    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| CatalogError::io_with_path(e, path))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hash of a file that may not exist yet. Missing files hash to `None`.
pub fn fingerprint(path: impl AsRef<Path>) -> Result<Option<String>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    compute_sha256(path).map(Some)
}

/// Verify a file against an expected SHA256.
pub fn verify_sha256(path: impl AsRef<Path>, expected: &str) -> Result<bool> {
    Ok(compute_sha256(path)?.eq_ignore_ascii_case(expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sha256_known_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello world").unwrap();

        assert_eq!(
            compute_sha256(&path).unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert!(verify_sha256(
            &path,
            "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9"
        )
        .unwrap());
    }

    #[test]
    fn test_fingerprint_missing_file() {
        let dir = TempDir::new().unwrap();
        assert_eq!(fingerprint(dir.path().join("absent.db")).unwrap(), None);
    }

    #[test]
    fn test_hash_changes_with_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.db");
        std::fs::write(&path, b"one").unwrap();
        let before = fingerprint(&path).unwrap();
        std::fs::write(&path, b"two").unwrap();
        assert_ne!(before, fingerprint(&path).unwrap());
    }
}
