use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad magic: expected {}, found {}", escape_magic(.expected), escape_magic(.found))]
    BadMagic { expected: [u8; 4], found: [u8; 4] },
    #[error("unsupported format version: expected {expected}, found {found}")]
    UnsupportedVersion { expected: u8, found: u8 },
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),
    #[error("truncated file: expected at least {expected} bytes, found {found}")]
    Truncated { expected: u64, found: u64 },
    #[error("unsupported compression tag {0}")]
    UnsupportedCompression(u8),
    #[error("decompression failed: {0}")]
    Decompression(String),
    #[error("compression failed: {0}")]
    Compression(String),
    #[error("payload hash mismatch: expected {expected:016x}, found {found:016x}")]
    HashMismatch { expected: u64, found: u64 },
    #[error("payload length mismatch: header says {expected} bytes, read {found}")]
    LengthMismatch { expected: u64, found: u64 },
    #[error("payload has {unread} unread bytes at end of container")]
    TrailingData { unread: u64 },
    #[error("string field of {len} bytes exceeds limit of {limit} bytes")]
    OversizedString { len: u64, limit: u64 },
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
}

fn escape_magic(magic: &[u8; 4]) -> String {
    magic.escape_ascii().to_string()
}
