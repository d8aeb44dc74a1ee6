//! Content hashing for flattened output files.
//!
//! The unfold pipeline re-runs over the same packs many times; comparing
//! xxHash64 digests lets it leave byte-identical outputs untouched.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Compute xxHash64 of a file.
///
/// Uses streaming to handle large files without loading into memory.
pub fn compute_file_hash(path: &Path) -> Result<u64> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::with_capacity(256 * 1024, file);
    let mut buf = vec![0u8; 256 * 1024];
    let mut hasher = xxhash_rust::xxh64::Xxh64::new(0);

    loop {
        let bytes_read = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read file for hashing: {}", path.display()))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buf[..bytes_read]);
    }

    Ok(hasher.digest())
}

/// Whether `a` and `b` both exist and hold the same bytes.
///
/// Sizes are compared first so differing files are rejected without hashing.
pub fn same_contents(a: &Path, b: &Path) -> Result<bool> {
    let (meta_a, meta_b) = match (std::fs::metadata(a), std::fs::metadata(b)) {
        (Ok(ma), Ok(mb)) => (ma, mb),
        _ => return Ok(false),
    };

    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }

    Ok(compute_file_hash(a)? == compute_file_hash(b)?)
}
