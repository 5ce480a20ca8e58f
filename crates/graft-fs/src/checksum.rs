//! SHA-256 checksum utilities
//!
//! Checksums use the canonical `sha256:<hex>` form and are recorded for
//! every file a deploy writes into the host tree.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::{Error, Result};

const PREFIX: &str = "sha256:";

/// Compute the checksum of a byte slice.
pub fn compute_bytes_checksum(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{PREFIX}{digest:x}")
}

/// Compute the checksum of a file's contents.
pub fn compute_file_checksum(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| Error::io(path, e))?;
    Ok(format!("{PREFIX}{:x}", hasher.finalize()))
}
