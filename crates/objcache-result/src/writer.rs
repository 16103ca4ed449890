use std::collections::HashSet;
use std::fs;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use objcache_storage::ContainerWriter;

use crate::config::ResultConfig;
use crate::context::Context;
use crate::error::{Result, ResultError};
use crate::file_type::FileType;
use crate::size_diff::FileSizeAndCountDiff;
use crate::util::{hard_link_or_copy, remove_file_best_effort};
use crate::{
    EMBEDDED_FILE_MARKER, RAW_FILE_MARKER, RESULT_FILE_SUFFIX, RESULT_MAGIC, RESULT_VERSION,
};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// How an entry's bytes are kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageMode {
    /// Bytes are streamed into the (compressed) container.
    Embedded,
    /// Only metadata is written; the bytes live in a separate raw file next
    /// to the result file.
    RawReference,
}

/// Picks the storage mode for a file of `size` bytes stored as `file_type`.
///
/// Object files and split DWARF objects are often several megabytes and are
/// restored verbatim, so they are kept as raw files that can be hard linked
/// or copied without going through the compressor.
pub fn storage_mode_for(config: &ResultConfig, file_type: FileType, size: u64) -> StorageMode {
    let raw_candidate = matches!(
        FileType::from_code(file_type.code()),
        FileType::Object | FileType::DwarfObject
    );
    if config.raw_files && raw_candidate && size >= config.raw_file_min_size.0 {
        StorageMode::RawReference
    } else {
        StorageMode::Embedded
    }
}

/// Path of the raw file holding entry `entry_number` of `result_path`:
/// the result path without its suffix, followed by the entry number and `W`.
pub fn raw_file_path(result_path: &Path, entry_number: u32) -> PathBuf {
    let file_name = result_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name
        .strip_suffix(RESULT_FILE_SUFFIX)
        .unwrap_or(&file_name);
    result_path.with_file_name(format!("{stem}{entry_number}W"))
}

struct PlannedEntry<'p> {
    number: u32,
    file_type: FileType,
    path: &'p Path,
    len: u64,
    mode: StorageMode,
}

/// Collects the files produced by one compiler invocation and writes them as
/// a single result entry.
///
/// Registration is purely in-memory; all I/O happens in [`Writer::finalize`],
/// which consumes the writer.
pub struct Writer<'a> {
    ctx: &'a Context,
    result_path: PathBuf,
    entries: Vec<(FileType, PathBuf)>,
    registered: HashSet<u8>,
}

impl<'a> Writer<'a> {
    pub fn new(ctx: &'a Context, result_path: impl Into<PathBuf>) -> Self {
        Self {
            ctx,
            result_path: result_path.into(),
            entries: Vec::new(),
            registered: HashSet::new(),
        }
    }

    pub fn result_path(&self) -> &Path {
        &self.result_path
    }

    /// Registers `path` to be stored as `file_type`. Each file type may be
    /// registered once.
    ///
    /// `FileType::Unknown` carrying a known code is stored as the named type,
    /// since that is what a reader will decode it as.
    pub fn write(&mut self, file_type: FileType, path: impl Into<PathBuf>) -> Result<()> {
        let file_type = FileType::from_code(file_type.code());
        if !self.registered.insert(file_type.code()) {
            return Err(ResultError::DuplicateEntry { file_type });
        }
        self.entries.push((file_type, path.into()));
        Ok(())
    }

    /// Writes every registered file and returns the resulting change in cache
    /// size and file count (the result file itself plus raw files).
    ///
    /// On failure the result file and any raw files created here are removed
    /// best effort; callers should still treat the result path as garbage.
    pub fn finalize(self) -> Result<FileSizeAndCountDiff> {
        let old_result = fs::metadata(&self.result_path).ok();
        let mut created_raw_files = Vec::new();

        match self.do_finalize(&mut created_raw_files) {
            Ok(mut diff) => {
                let new_result = fs::metadata(&self.result_path).ok();
                diff += FileSizeAndCountDiff::for_file_change(old_result.as_ref(), new_result.as_ref());
                tracing::debug!(
                    target = "objcache.result",
                    path = %self.result_path.display(),
                    entries = self.entries.len(),
                    size_kibibyte = diff.size_kibibyte,
                    count = diff.count,
                    "stored result"
                );
                Ok(diff)
            }
            Err(err) => {
                tracing::debug!(
                    target = "objcache.result",
                    path = %self.result_path.display(),
                    error = %err,
                    "failed to store result"
                );
                remove_file_best_effort(&self.result_path, "finalize.failed");
                for raw in &created_raw_files {
                    remove_file_best_effort(raw, "finalize.failed_raw");
                }
                Err(err)
            }
        }
    }

    fn do_finalize(&self, created_raw_files: &mut Vec<PathBuf>) -> Result<FileSizeAndCountDiff> {
        let n_entries =
            u8::try_from(self.entries.len()).map_err(|_| ResultError::TooManyEntries {
                count: self.entries.len(),
                max: u8::MAX as usize,
            })?;

        // Stat everything up front so a missing source fails before any output
        // is created.
        let planned = self
            .entries
            .iter()
            .enumerate()
            .map(|(number, (file_type, path))| {
                let metadata = fs::metadata(path).map_err(|source| ResultError::SourceUnreadable {
                    path: path.clone(),
                    source,
                })?;
                if !metadata.is_file() {
                    return Err(ResultError::NotAFile { path: path.clone() });
                }
                let len = metadata.len();
                Ok(PlannedEntry {
                    number: number as u32,
                    file_type: *file_type,
                    path,
                    len,
                    mode: storage_mode_for(self.ctx.config(), *file_type, len),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut writer = ContainerWriter::create(
            &self.result_path,
            RESULT_MAGIC,
            RESULT_VERSION,
            self.ctx.config().write_compression(),
        )?;
        writer.write_u8(n_entries)?;

        let mut diff = FileSizeAndCountDiff::default();
        for entry in &planned {
            tracing::trace!(
                target = "objcache.result",
                entry = entry.number,
                file_type = %entry.file_type,
                mode = ?entry.mode,
                len = entry.len,
                path = %entry.path.display(),
                "writing result entry"
            );
            match entry.mode {
                StorageMode::Embedded => write_embedded_entry(&mut writer, entry)?,
                StorageMode::RawReference => {
                    diff += self.write_raw_entry(&mut writer, entry, created_raw_files)?;
                }
            }
        }

        let (out, _header) = writer.finish()?;
        let file = out.into_inner().map_err(|err| err.into_error())?;
        file.sync_all()?;

        Ok(diff)
    }

    fn write_raw_entry<W: Write + Seek>(
        &self,
        writer: &mut ContainerWriter<W>,
        entry: &PlannedEntry<'_>,
        created_raw_files: &mut Vec<PathBuf>,
    ) -> Result<FileSizeAndCountDiff> {
        let raw_path = raw_file_path(&self.result_path, entry.number);
        let raw_name = raw_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ResultError::NonUtf8Path {
                path: raw_path.clone(),
            })?
            .to_string();

        let old_raw = fs::metadata(&raw_path).ok();
        hard_link_or_copy(entry.path, &raw_path, self.ctx.config().hard_link).map_err(|source| {
            ResultError::RawFile {
                path: raw_path.clone(),
                source,
            }
        })?;
        created_raw_files.push(raw_path.clone());

        let new_raw = fs::metadata(&raw_path).map_err(|source| ResultError::RawFile {
            path: raw_path.clone(),
            source,
        })?;
        if new_raw.len() != entry.len {
            return Err(ResultError::SourceChanged {
                path: entry.path.to_path_buf(),
                expected: entry.len,
                found: new_raw.len(),
            });
        }

        writer.write_u8(RAW_FILE_MARKER)?;
        writer.write_u8(entry.file_type.code())?;
        writer.write_u64(entry.len)?;
        writer.write_str(&raw_name)?;

        Ok(FileSizeAndCountDiff::for_file_change(
            old_raw.as_ref(),
            Some(&new_raw),
        ))
    }
}

fn write_embedded_entry<W: Write + Seek>(
    writer: &mut ContainerWriter<W>,
    entry: &PlannedEntry<'_>,
) -> Result<()> {
    writer.write_u8(EMBEDDED_FILE_MARKER)?;
    writer.write_u8(entry.file_type.code())?;
    writer.write_u64(entry.len)?;

    let unreadable = |source: std::io::Error| ResultError::SourceUnreadable {
        path: entry.path.to_path_buf(),
        source,
    };
    let file = fs::File::open(entry.path).map_err(unreadable)?;
    let mut source = file.take(entry.len);
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied = 0u64;
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(unreadable(err)),
        };
        writer.write_all(&buf[..n])?;
        copied += n as u64;
    }

    let current_len = source
        .into_inner()
        .metadata()
        .map_err(unreadable)?
        .len();
    if copied != entry.len || current_len != entry.len {
        return Err(ResultError::SourceChanged {
            path: entry.path.to_path_buf(),
            expected: entry.len,
            found: if copied != entry.len { copied } else { current_len },
        });
    }
    Ok(())
}
