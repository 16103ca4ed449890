use objcache_storage::ContainerHeader;
use serde::Serialize;

use crate::error::Result;
use crate::file_type::FileType;
use crate::reader::{Consumer, EntryKind};

/// Description of a whole result file, as produced by [`ResultDumper`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResultSummary {
    pub format_version: u8,
    pub compression: String,
    pub compression_level: i8,
    pub payload_len: u64,
    pub uncompressed_len: u64,
    pub entries: Vec<EntrySummary>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntrySummary {
    pub number: u32,
    /// Stable name, e.g. `object`.
    pub file_type: String,
    pub file_type_code: u8,
    /// `embedded` or `raw`.
    pub storage: &'static str,
    pub len: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_path: Option<String>,
}

impl ResultSummary {
    /// Human-readable multi-line rendering.
    pub fn render_text(&self) -> String {
        let compression = if self.compression == "none" {
            "none".to_string()
        } else {
            format!("{} (level {})", self.compression, self.compression_level)
        };
        let mut lines = vec![
            format!("Format version: {}", self.format_version),
            format!("Compression: {compression}"),
            format!(
                "Payload: {} bytes ({} uncompressed)",
                self.payload_len, self.uncompressed_len
            ),
            format!("Entries: {}", self.entries.len()),
        ];
        lines.extend(self.entries.iter().map(|entry| {
            let label = FileType::from_code(entry.file_type_code);
            let line = format!(
                "Entry {}: {} ({}), {}, {} bytes",
                entry.number, entry.file_type, label, entry.storage, entry.len
            );
            match &entry.raw_path {
                Some(raw_path) => format!("{line}, {raw_path}"),
                None => line,
            }
        }));

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

/// Consumer that records the structure of a result file without keeping any
/// entry data.
#[derive(Debug, Default)]
pub struct ResultDumper {
    summary: ResultSummary,
}

impl ResultDumper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> &ResultSummary {
        &self.summary
    }

    pub fn into_summary(self) -> ResultSummary {
        self.summary
    }
}

impl Consumer for ResultDumper {
    fn on_header(&mut self, header: &ContainerHeader, format_version: u8) -> Result<()> {
        self.summary = ResultSummary {
            format_version,
            compression: header.compression.as_str().to_string(),
            compression_level: header.compression_level,
            payload_len: header.payload_len,
            uncompressed_len: header.uncompressed_len,
            entries: Vec::new(),
        };
        Ok(())
    }

    fn on_entry_start(
        &mut self,
        entry_number: u32,
        file_type: FileType,
        kind: &EntryKind,
    ) -> Result<()> {
        let name = if file_type.is_known() {
            file_type.name().to_string()
        } else {
            format!("unknown({})", file_type.code())
        };
        self.summary.entries.push(EntrySummary {
            number: entry_number,
            file_type: name,
            file_type_code: file_type.code(),
            storage: match kind {
                EntryKind::Embedded { .. } => "embedded",
                EntryKind::RawReference { .. } => "raw",
            },
            len: kind.len(),
            raw_path: kind.raw_path().map(|path| path.display().to_string()),
        });
        Ok(())
    }

    fn on_entry_data(&mut self, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    fn on_entry_end(&mut self) -> Result<()> {
        Ok(())
    }
}
