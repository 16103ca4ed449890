use std::fmt;
use std::path::Path;

use objcache_storage::WriteCompression;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Settings that influence how result entries are written.
///
/// Loaded from TOML (every key optional) and then overridden from
/// `OBJCACHE_*` environment variables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResultConfig {
    /// Compress the container payload with zstd.
    pub compression: bool,
    /// zstd level; 0 selects zstd's default. Clamped to the `i8` range.
    pub compression_level: i32,
    /// Store object files and split DWARF objects as separate raw files
    /// instead of embedding them.
    pub raw_files: bool,
    /// Files smaller than this are always embedded.
    pub raw_file_min_size: ByteSize,
    /// Hard link raw files instead of copying them (falls back to copying).
    pub hard_link: bool,
}

impl Default for ResultConfig {
    fn default() -> Self {
        Self {
            compression: true,
            compression_level: 0,
            raw_files: true,
            raw_file_min_size: ByteSize(0),
            hard_link: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid value for {name}: {reason}")]
    InvalidEnv { name: &'static str, reason: String },
}

impl ResultConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|err| ConfigError::Toml(err.message().to_string()))
    }

    /// Applies `OBJCACHE_COMPRESSION`, `OBJCACHE_COMPRESSION_LEVEL`,
    /// `OBJCACHE_RAW_FILES`, `OBJCACHE_RAW_FILE_MIN_SIZE` and
    /// `OBJCACHE_HARD_LINK` from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    pub(crate) fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup("OBJCACHE_COMPRESSION") {
            self.compression = parse_bool("OBJCACHE_COMPRESSION", &value)?;
        }
        if let Some(value) = lookup("OBJCACHE_COMPRESSION_LEVEL") {
            self.compression_level =
                value
                    .trim()
                    .parse()
                    .map_err(|err: std::num::ParseIntError| ConfigError::InvalidEnv {
                        name: "OBJCACHE_COMPRESSION_LEVEL",
                        reason: err.to_string(),
                    })?;
        }
        if let Some(value) = lookup("OBJCACHE_RAW_FILES") {
            self.raw_files = parse_bool("OBJCACHE_RAW_FILES", &value)?;
        }
        if let Some(value) = lookup("OBJCACHE_RAW_FILE_MIN_SIZE") {
            self.raw_file_min_size =
                parse_byte_size(&value)
                    .map(ByteSize)
                    .map_err(|reason| ConfigError::InvalidEnv {
                        name: "OBJCACHE_RAW_FILE_MIN_SIZE",
                        reason,
                    })?;
        }
        if let Some(value) = lookup("OBJCACHE_HARD_LINK") {
            self.hard_link = parse_bool("OBJCACHE_HARD_LINK", &value)?;
        }
        Ok(self)
    }

    pub fn write_compression(&self) -> WriteCompression {
        if self.compression {
            WriteCompression::Zstd {
                level: self.compression_level,
            }
        } else {
            WriteCompression::None
        }
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnv {
            name,
            reason: format!("expected a boolean, got `{other}`"),
        }),
    }
}

/// A byte size which supports both raw byte counts and human-friendly suffixes.
///
/// Decimal suffixes (`k`, `M`, `G`, `T`) are powers of 1000, binary suffixes
/// (`Ki`, `Mi`, `Gi`, `Ti`) powers of 1024. A bare number is a byte count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteSize(pub u64);

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ByteSize {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bytes(u64),
            Human(String),
        }

        let repr = Repr::deserialize(deserializer)?;
        match repr {
            Repr::Bytes(value) => Ok(ByteSize(value)),
            Repr::Human(value) => parse_byte_size(&value)
                .map(ByteSize)
                .map_err(serde::de::Error::custom),
        }
    }
}

pub fn parse_byte_size(text: &str) -> Result<u64, String> {
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, suffix) = text.split_at(split);
    if number.is_empty() {
        return Err(format!("invalid size `{text}`"));
    }
    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid size `{text}`"))?;

    let multiplier: u64 = match suffix.trim() {
        "" => 1,
        "k" | "K" => 1000,
        "M" => 1000 * 1000,
        "G" => 1000 * 1000 * 1000,
        "T" => 1000 * 1000 * 1000 * 1000,
        "Ki" => 1024,
        "Mi" => 1024 * 1024,
        "Gi" => 1024 * 1024 * 1024,
        "Ti" => 1024 * 1024 * 1024 * 1024,
        other => return Err(format!("unknown size suffix `{other}` in `{text}`")),
    };

    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes > u64::MAX as f64 {
        return Err(format!("size `{text}` is out of range"));
    }
    Ok(bytes as u64)
}
