use std::path::PathBuf;

use crate::file_type::FileType;

pub type Result<T> = std::result::Result<T, ResultError>;

/// Errors produced while writing or reading result entries.
///
/// None of these are fatal to a compiler invocation: callers treat a read
/// error as a cache miss and a write error as "discard the result".
#[derive(Debug, thiserror::Error)]
pub enum ResultError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] objcache_storage::StorageError),

    #[error("failed to read {}: {source}", .path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a regular file", .path.display())]
    NotAFile { path: PathBuf },

    #[error("{} changed size while being stored: expected {expected} bytes, found {found}", .path.display())]
    SourceChanged {
        path: PathBuf,
        expected: u64,
        found: u64,
    },

    #[error("file type {} registered more than once", .file_type.name())]
    DuplicateEntry { file_type: FileType },

    #[error("too many entries: {count} (at most {max})")]
    TooManyEntries { count: usize, max: usize },

    #[error("failed to store raw file {}: {source}", .path.display())]
    RawFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("path is not valid UTF-8: {}", .path.display())]
    NonUtf8Path { path: PathBuf },

    #[error("unknown entry marker {marker} in entry {entry_number}")]
    UnknownEntryMarker { entry_number: u32, marker: u8 },

    #[error("malformed entry {entry_number}: {reason}")]
    MalformedEntry {
        entry_number: u32,
        reason: &'static str,
    },

    #[error("bad size of raw file {}: expected {expected} bytes, found {found}", .path.display())]
    RawFileSizeMismatch {
        path: PathBuf,
        expected: u64,
        found: u64,
    },
}
