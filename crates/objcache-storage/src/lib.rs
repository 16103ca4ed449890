//! Framed, versioned, optionally compressed container files.
//!
//! ## Format
//! Each container is stored as:
//! - a fixed-size header (32 bytes, little-endian)
//! - a payload, either stored as-is or as a single zstd frame
//!
//! The header embeds:
//! - a 4-byte magic and a 1-byte format version, both owned by the caller
//! - compression tag and level
//! - on-disk and uncompressed payload lengths
//! - a content hash of the uncompressed payload (blake3, first 8 bytes)
//!
//! Writers stream the payload and patch the header at the end, so the output
//! must be seekable. Readers stream the payload back and only vouch for it
//! after [`ContainerReader::finish`] has checked the length and hash.

mod error;
mod header;
mod read;
mod write;

pub use error::StorageError;
pub use header::{Compression, ContainerHeader, HEADER_LEN, PREAMBLE_LEN};
pub use read::ContainerReader;
pub use write::{ContainerWriter, WriteCompression};

fn hash_prefix(hash: &blake3::Hash) -> u64 {
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}
