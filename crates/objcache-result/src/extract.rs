use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use objcache_storage::ContainerHeader;

use crate::error::{Result, ResultError};
use crate::file_type::FileType;
use crate::reader::{Consumer, EntryKind};

/// Consumer that writes every entry of a result file into a directory as
/// `<entry number><suffix>`, e.g. `0.o` and `1.stderr`.
pub struct ResultExtractor {
    output_dir: PathBuf,
    current: Option<BufWriter<fs::File>>,
    written: Vec<PathBuf>,
}

impl ResultExtractor {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            current: None,
            written: Vec::new(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Files created so far, in entry order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn suffix(file_type: FileType) -> &'static str {
        match file_type {
            FileType::Object => ".o",
            FileType::Dependency => ".d",
            FileType::StderrOutput => ".stderr",
            FileType::CoverageUnmangled => ".gcno-unmangled",
            FileType::StackUsage => ".su",
            FileType::Diagnostic => ".dia",
            FileType::DwarfObject => ".dwo",
            FileType::CoverageMangled => ".gcno-mangled",
            FileType::Unknown(_) => ".unknown",
        }
    }
}

impl Consumer for ResultExtractor {
    fn on_header(&mut self, _header: &ContainerHeader, _format_version: u8) -> Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    fn on_entry_start(
        &mut self,
        entry_number: u32,
        file_type: FileType,
        kind: &EntryKind,
    ) -> Result<()> {
        let dest = self
            .output_dir
            .join(format!("{entry_number}{}", Self::suffix(file_type)));

        match kind {
            EntryKind::Embedded { .. } => {
                let file = fs::File::create(&dest)?;
                self.current = Some(BufWriter::new(file));
            }
            EntryKind::RawReference { path, len } => {
                let metadata = fs::metadata(path).map_err(|source| ResultError::RawFile {
                    path: path.clone(),
                    source,
                })?;
                if metadata.len() != *len {
                    return Err(ResultError::RawFileSizeMismatch {
                        path: path.clone(),
                        expected: *len,
                        found: metadata.len(),
                    });
                }
                fs::copy(path, &dest).map_err(|source| ResultError::RawFile {
                    path: path.clone(),
                    source,
                })?;
            }
        }

        tracing::trace!(
            target = "objcache.result",
            entry = entry_number,
            file_type = %file_type,
            dest = %dest.display(),
            "extracting result entry"
        );
        self.written.push(dest);
        Ok(())
    }

    fn on_entry_data(&mut self, data: &[u8]) -> Result<()> {
        if let Some(out) = self.current.as_mut() {
            out.write_all(data)?;
        }
        Ok(())
    }

    fn on_entry_end(&mut self) -> Result<()> {
        if let Some(out) = self.current.take() {
            out.into_inner().map_err(|err| err.into_error())?;
        }
        Ok(())
    }
}
