use std::path::{Path, PathBuf};

use objcache_storage::{ContainerHeader, ContainerReader};

use crate::error::{Result, ResultError};
use crate::file_type::FileType;
use crate::{EMBEDDED_FILE_MARKER, MAX_RAW_NAME_LEN, RAW_FILE_MARKER, RESULT_MAGIC, RESULT_VERSION};

const CHUNK_SIZE: usize = 64 * 1024;

/// How the bytes of one entry are stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// `len` bytes follow in the container as `on_entry_data` chunks.
    Embedded { len: u64 },
    /// The bytes live in the raw file at `path`.
    RawReference { path: PathBuf, len: u64 },
}

impl EntryKind {
    pub fn len(&self) -> u64 {
        match self {
            EntryKind::Embedded { len } | EntryKind::RawReference { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn raw_path(&self) -> Option<&Path> {
        match self {
            EntryKind::Embedded { .. } => None,
            EntryKind::RawReference { path, .. } => Some(path),
        }
    }
}

/// Receives the events of a [`Reader::read`] pass in container order.
///
/// Returning an error from any callback aborts the pass; that error is what
/// `read` returns.
pub trait Consumer {
    fn on_header(&mut self, header: &ContainerHeader, format_version: u8) -> Result<()>;

    fn on_entry_start(
        &mut self,
        entry_number: u32,
        file_type: FileType,
        kind: &EntryKind,
    ) -> Result<()>;

    /// Called zero or more times per embedded entry, never for raw ones.
    fn on_entry_data(&mut self, data: &[u8]) -> Result<()>;

    fn on_entry_end(&mut self) -> Result<()>;
}

/// Replays a result file.
pub struct Reader {
    result_path: PathBuf,
}

impl Reader {
    pub fn new(result_path: impl Into<PathBuf>) -> Self {
        Self {
            result_path: result_path.into(),
        }
    }

    pub fn result_path(&self) -> &Path {
        &self.result_path
    }

    /// Streams the result file to `consumer`.
    ///
    /// Magic and version are checked before any callback. The payload hash is
    /// only checked after the last entry, so on error the consumer may have
    /// seen data that later turned out to be corrupt; it must undo whatever
    /// it did with it.
    pub fn read<C: Consumer + ?Sized>(&self, consumer: &mut C) -> Result<()> {
        let result = self.read_inner(consumer);
        if let Err(err) = &result {
            tracing::debug!(
                target = "objcache.result",
                path = %self.result_path.display(),
                error = %err,
                "failed to read result"
            );
        }
        result
    }

    fn read_inner<C: Consumer + ?Sized>(&self, consumer: &mut C) -> Result<()> {
        let mut container =
            ContainerReader::open_file(&self.result_path, RESULT_MAGIC, RESULT_VERSION)?;
        let header = *container.header();
        consumer.on_header(&header, header.version)?;

        let n_entries = container.read_u8()?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        for entry_number in 0..u32::from(n_entries) {
            let marker = container.read_u8()?;
            let file_type = FileType::from_code(container.read_u8()?);
            let len = container.read_u64()?;

            let kind = match marker {
                EMBEDDED_FILE_MARKER => {
                    if len > container.remaining() {
                        return Err(ResultError::MalformedEntry {
                            entry_number,
                            reason: "embedded length exceeds payload",
                        });
                    }
                    EntryKind::Embedded { len }
                }
                RAW_FILE_MARKER => {
                    let name = container.read_str(MAX_RAW_NAME_LEN)?;
                    EntryKind::RawReference {
                        path: self.resolve_raw_name(entry_number, &name)?,
                        len,
                    }
                }
                marker => {
                    return Err(ResultError::UnknownEntryMarker {
                        entry_number,
                        marker,
                    })
                }
            };

            tracing::trace!(
                target = "objcache.result",
                entry = entry_number,
                file_type = %file_type,
                len,
                raw = kind.raw_path().is_some(),
                "reading result entry"
            );
            consumer.on_entry_start(entry_number, file_type, &kind)?;

            if let EntryKind::Embedded { len } = kind {
                let mut left = len;
                while left > 0 {
                    let n = usize::try_from(left).map_or(CHUNK_SIZE, |left| left.min(CHUNK_SIZE));
                    container.read_bytes(&mut buf[..n])?;
                    consumer.on_entry_data(&buf[..n])?;
                    left -= n as u64;
                }
            }

            consumer.on_entry_end()?;
        }

        container.finish()?;
        Ok(())
    }

    /// Raw names are bare file names next to the result file; anything that
    /// could escape that directory is rejected.
    fn resolve_raw_name(&self, entry_number: u32, name: &str) -> Result<PathBuf> {
        let is_bare_name = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.chars().any(|c| std::path::is_separator(c) || c == '\0');
        if !is_bare_name {
            return Err(ResultError::MalformedEntry {
                entry_number,
                reason: "raw file name is not a bare file name",
            });
        }
        Ok(match self.result_path.parent() {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        })
    }
}

/// Consumer that drains every entry into memory. Handy for tests and small
/// tools; real consumers should stream.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct Recording {
    pub(crate) version: Option<u8>,
    pub(crate) entries: Vec<(u32, FileType, EntryKind, Vec<u8>)>,
    pub(crate) ended: usize,
}

#[cfg(test)]
impl Consumer for Recording {
    fn on_header(&mut self, _header: &ContainerHeader, format_version: u8) -> Result<()> {
        self.version = Some(format_version);
        Ok(())
    }

    fn on_entry_start(
        &mut self,
        entry_number: u32,
        file_type: FileType,
        kind: &EntryKind,
    ) -> Result<()> {
        self.entries
            .push((entry_number, file_type, kind.clone(), Vec::new()));
        Ok(())
    }

    fn on_entry_data(&mut self, data: &[u8]) -> Result<()> {
        if let Some(entry) = self.entries.last_mut() {
            entry.3.extend_from_slice(data);
        }
        Ok(())
    }

    fn on_entry_end(&mut self) -> Result<()> {
        self.ended += 1;
        Ok(())
    }
}
