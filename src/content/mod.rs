//! Content hashing
//!
//! Provides the pluggable digest used by the hasher pool.

pub mod checksum;

pub use checksum::{compute_blake3, hash_file, Blake3Hasher, ContentHasher};
