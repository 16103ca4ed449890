//! Result entries: every file produced by one compiler invocation, stored as a
//! single cache file.
//!
//! A result file (name ending in [`RESULT_FILE_SUFFIX`]) is an
//! `objcache_storage` container with magic [`RESULT_MAGIC`] and version
//! [`RESULT_VERSION`]. Its payload is:
//!
//! ```text
//! n_entries  u8
//! entry*:
//!   marker     u8   (0 = embedded, 1 = raw reference)
//!   file_type  u8   (see `FileType::code`)
//!   length     u64
//!   raw_name   u32 length + UTF-8   (raw reference only)
//!   payload    `length` bytes        (embedded only)
//! ```
//!
//! Raw references point at a file in the same directory as the result file,
//! see [`raw_file_path`].
//!
//! [`Writer`] builds result files and [`Reader`] replays them to a
//! [`Consumer`].

mod config;
mod context;
mod dump;
mod error;
mod extract;
mod file_type;
mod reader;
mod size_diff;
mod util;
mod writer;

pub use config::{parse_byte_size, ByteSize, ConfigError, ResultConfig};
pub use context::Context;
pub use dump::{EntrySummary, ResultDumper, ResultSummary};
pub use error::{Result, ResultError};
pub use extract::ResultExtractor;
pub use file_type::{
    file_type_to_string, gcno_file_in_mangled_form, gcno_file_in_unmangled_form, FileType,
    ParseFileTypeError, UNKNOWN_FILE_TYPE,
};
pub use reader::{Consumer, EntryKind, Reader};
pub use size_diff::{size_on_disk, FileSizeAndCountDiff};
pub use writer::{raw_file_path, storage_mode_for, StorageMode, Writer};

pub use objcache_storage::{Compression, ContainerHeader};

/// Magic bytes at the start of every result file.
pub const RESULT_MAGIC: [u8; 4] = *b"cCrS";

/// Version of the result payload layout. Bump it whenever the layout or the
/// meaning of a file type code changes.
pub const RESULT_VERSION: u8 = 1;

/// Suffix of result file names. Raw files replace it with `<n>W`.
pub const RESULT_FILE_SUFFIX: &str = "R";

/// Longest raw file name accepted when reading.
pub const MAX_RAW_NAME_LEN: u32 = 4096;

const EMBEDDED_FILE_MARKER: u8 = 0;
const RAW_FILE_MARKER: u8 = 1;
