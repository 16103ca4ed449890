use std::fmt;
use std::path::{self, PathBuf};
use std::str::FromStr;

use crate::context::Context;

/// Label returned by [`file_type_to_string`] for codes without a known role.
pub const UNKNOWN_FILE_TYPE: &str = "<unknown type>";

/// Role of a file stored in a result entry.
///
/// The numeric codes returned by [`FileType::code`] are written into result
/// files. They must never be changed or removed unless the result format
/// version is incremented; adding new codes is fine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileType {
    /// The main output specified with `-o` or implicitly from the input filename.
    Object,
    /// Dependency file specified with `-MF` or implicitly from the output filename.
    Dependency,
    /// Text the compiler wrote to standard error.
    StderrOutput,
    /// Coverage notes from `-ftest-coverage`, named like the output file but
    /// with a `.gcno` extension.
    CoverageUnmangled,
    /// Stack usage file from `-fstack-usage` (`.su`).
    StackUsage,
    /// Diagnostics file specified by `--serialize-diagnostics`.
    Diagnostic,
    /// Split DWARF object from `-gsplit-dwarf` (`.dwo`).
    DwarfObject,
    /// Coverage notes from `-ftest-coverage` named after the full output path
    /// with separators replaced by `#`.
    CoverageMangled,
    /// A code this version does not know, e.g. written by a newer writer.
    ///
    /// Only [`FileType::from_code`] should construct this, and only for codes
    /// that have no named variant.
    Unknown(u8),
}

impl FileType {
    pub const ALL: [FileType; 8] = [
        FileType::Object,
        FileType::Dependency,
        FileType::StderrOutput,
        FileType::CoverageUnmangled,
        FileType::StackUsage,
        FileType::Diagnostic,
        FileType::DwarfObject,
        FileType::CoverageMangled,
    ];

    pub const fn code(self) -> u8 {
        match self {
            FileType::Object => 0,
            FileType::Dependency => 1,
            FileType::StderrOutput => 2,
            FileType::CoverageUnmangled => 3,
            FileType::StackUsage => 4,
            FileType::Diagnostic => 5,
            FileType::DwarfObject => 6,
            FileType::CoverageMangled => 7,
            FileType::Unknown(code) => code,
        }
    }

    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => FileType::Object,
            1 => FileType::Dependency,
            2 => FileType::StderrOutput,
            3 => FileType::CoverageUnmangled,
            4 => FileType::StackUsage,
            5 => FileType::Diagnostic,
            6 => FileType::DwarfObject,
            7 => FileType::CoverageMangled,
            other => FileType::Unknown(other),
        }
    }

    /// Identifier used on command lines and in JSON output.
    pub const fn name(self) -> &'static str {
        match self {
            FileType::Object => "object",
            FileType::Dependency => "dependency",
            FileType::StderrOutput => "stderr_output",
            FileType::CoverageUnmangled => "coverage_unmangled",
            FileType::StackUsage => "stackusage",
            FileType::Diagnostic => "diagnostic",
            FileType::DwarfObject => "dwarf_object",
            FileType::CoverageMangled => "coverage_mangled",
            FileType::Unknown(_) => "unknown",
        }
    }

    pub const fn is_known(self) -> bool {
        !matches!(self, FileType::Unknown(_))
    }
}

/// Describes `file_type` for logs and dumps. Never use it for control flow.
pub fn file_type_to_string(file_type: FileType) -> &'static str {
    match file_type {
        FileType::Object => ".o",
        FileType::Dependency => ".d",
        FileType::StderrOutput => "<stderr>",
        FileType::CoverageUnmangled => ".gcno-unmangled",
        FileType::StackUsage => ".su",
        FileType::Diagnostic => ".dia",
        FileType::DwarfObject => ".dwo",
        FileType::CoverageMangled => ".gcno-mangled",
        FileType::Unknown(_) => UNKNOWN_FILE_TYPE,
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(file_type_to_string(*self))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown file type name `{0}`")]
pub struct ParseFileTypeError(String);

impl FromStr for FileType {
    type Err = ParseFileTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileType::ALL
            .into_iter()
            .find(|file_type| file_type.name() == s)
            .ok_or_else(|| ParseFileTypeError(s.to_string()))
    }
}

/// Coverage notes filename as GCC writes it when the object path is
/// mangled: the absolute output path with a `.gcno` extension and every path
/// separator replaced by `#`.
pub fn gcno_file_in_mangled_form(ctx: &Context) -> PathBuf {
    let output_obj = ctx.output_obj();
    let abs_output_obj = if output_obj.is_absolute() {
        output_obj.to_path_buf()
    } else {
        ctx.apparent_cwd().join(output_obj)
    };
    let with_extension = abs_output_obj.with_extension("gcno");
    let hashified: String = with_extension
        .to_string_lossy()
        .chars()
        .map(|c| if path::is_separator(c) { '#' } else { c })
        .collect();
    PathBuf::from(hashified)
}

/// Coverage notes filename next to the object file: same directory and base
/// name, `.gcno` extension.
pub fn gcno_file_in_unmangled_form(ctx: &Context) -> PathBuf {
    ctx.output_obj().with_extension("gcno")
}
