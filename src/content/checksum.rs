//! Content digests for change detection
//!
//! BLAKE3 is the default digest, rendered as 64 lowercase hex characters.
//!
//! The digest is pluggable through [`ContentHasher`] so callers (and tests)
//! can substitute their own function.

use crate::error::EntryError;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Read buffer used when streaming files through a hasher
const READ_BUFFER_SIZE: usize = 256 * 1024;

/// A stable, fixed-size digest over a byte stream
pub trait ContentHasher: Send + Sync {
    /// Consume the reader and return the hex-encoded digest
    fn digest_reader(&self, reader: &mut dyn Read) -> io::Result<String>;
}

/// BLAKE3 digest, 64 hex characters
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl ContentHasher for Blake3Hasher {
    fn digest_reader(&self, reader: &mut dyn Read) -> io::Result<String> {
        let mut hasher = blake3::Hasher::new();
        io::copy(reader, &mut hasher)?;
        Ok(hasher.finalize().to_hex().to_string())
    }
}

/// Compute a BLAKE3 digest for in-memory content
///
/// # Example
///
/// ```
/// use hash_walker::content::checksum::compute_blake3;
///
/// let hash = compute_blake3(b"Hello, World!");
/// assert_eq!(hash.len(), 64);
/// ```
pub fn compute_blake3(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// Open a file and stream it through `hasher`
pub fn hash_file(hasher: &dyn ContentHasher, path: &Path) -> Result<String, EntryError> {
    let file = File::open(path).map_err(|source| EntryError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

    hasher
        .digest_reader(&mut reader)
        .map_err(|source| EntryError::Read {
            path: path.to_path_buf(),
            source,
        })
}
