use std::fs;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::StorageError;
use crate::header::{Compression, ContainerHeader, HEADER_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCompression {
    None,
    /// Whole-payload streaming zstd. Levels outside the `i8` range are clamped
    /// because the level is recorded in a single header byte.
    Zstd { level: i32 },
}

impl Default for WriteCompression {
    fn default() -> Self {
        Self::Zstd { level: 0 }
    }
}

enum PayloadSink<W: Write> {
    Plain(W),
    Zstd(zstd::stream::write::Encoder<'static, W>),
}

impl<W: Write> Write for PayloadSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            PayloadSink::Plain(w) => w.write(buf),
            PayloadSink::Zstd(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            PayloadSink::Plain(w) => w.flush(),
            PayloadSink::Zstd(encoder) => encoder.flush(),
        }
    }
}

/// Streaming writer for a framed container.
///
/// A zeroed placeholder header is written up front; the payload is streamed
/// (optionally through zstd) while being hashed, and [`ContainerWriter::finish`]
/// seeks back to overwrite the placeholder with the final header.
pub struct ContainerWriter<W: Write + Seek> {
    sink: PayloadSink<W>,
    start: u64,
    magic: [u8; 4],
    version: u8,
    compression: Compression,
    compression_level: i8,
    hasher: blake3::Hasher,
    uncompressed_len: u64,
}

impl ContainerWriter<BufWriter<fs::File>> {
    /// Creates (or truncates) `path` and starts a container in it.
    pub fn create(
        path: &Path,
        magic: [u8; 4],
        version: u8,
        compression: WriteCompression,
    ) -> Result<Self, StorageError> {
        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Self::new(BufWriter::new(file), magic, version, compression)
    }
}

impl<W: Write + Seek> ContainerWriter<W> {
    pub fn new(
        mut out: W,
        magic: [u8; 4],
        version: u8,
        compression: WriteCompression,
    ) -> Result<Self, StorageError> {
        let start = out.stream_position()?;
        out.write_all(&[0u8; HEADER_LEN])?;

        let (compression, compression_level, sink) = match compression {
            WriteCompression::None => (Compression::None, 0, PayloadSink::Plain(out)),
            WriteCompression::Zstd { level } => {
                let level = level.clamp(i8::MIN as i32, i8::MAX as i32);
                let encoder = zstd::stream::write::Encoder::new(out, level)
                    .map_err(|e| StorageError::Compression(e.to_string()))?;
                (Compression::Zstd, level as i8, PayloadSink::Zstd(encoder))
            }
        };

        Ok(Self {
            sink,
            start,
            magic,
            version,
            compression,
            compression_level,
            hasher: blake3::Hasher::new(),
            uncompressed_len: 0,
        })
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Number of payload bytes written so far, before compression.
    pub fn uncompressed_len(&self) -> u64 {
        self.uncompressed_len
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), StorageError> {
        WriteBytesExt::write_u8(self, value)?;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), StorageError> {
        WriteBytesExt::write_u32::<LittleEndian>(self, value)?;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), StorageError> {
        WriteBytesExt::write_u64::<LittleEndian>(self, value)?;
        Ok(())
    }

    /// Writes a `u32` length prefix followed by the UTF-8 bytes of `value`.
    pub fn write_str(&mut self, value: &str) -> Result<(), StorageError> {
        let len = u32::try_from(value.len())
            .map_err(|_| StorageError::OversizedString {
                len: value.len() as u64,
                limit: u32::MAX as u64,
            })?;
        self.write_u32(len)?;
        self.write_all(value.as_bytes())?;
        Ok(())
    }

    /// Ends the payload and writes the final header.
    ///
    /// The returned writer is positioned at the end of the container.
    pub fn finish(self) -> Result<(W, ContainerHeader), StorageError> {
        let mut out = match self.sink {
            PayloadSink::Plain(w) => w,
            PayloadSink::Zstd(encoder) => encoder
                .finish()
                .map_err(|e| StorageError::Compression(e.to_string()))?,
        };

        let end = out.stream_position()?;
        let payload_len = end
            .checked_sub(self.start + HEADER_LEN as u64)
            .ok_or(StorageError::InvalidHeader("payload length underflow"))?;

        let hash = self.hasher.finalize();
        let header = ContainerHeader {
            magic: self.magic,
            version: self.version,
            compression: self.compression,
            compression_level: self.compression_level,
            payload_len,
            uncompressed_len: self.uncompressed_len,
            content_hash: crate::hash_prefix(&hash),
        };

        // Overwrite the placeholder header now that we know the final metadata.
        out.seek(SeekFrom::Start(self.start))?;
        out.write_all(&header.encode())?;
        out.seek(SeekFrom::Start(end))?;
        out.flush()?;

        tracing::trace!(
            target = "objcache.storage",
            compression = header.compression.as_str(),
            payload_len = header.payload_len,
            uncompressed_len = header.uncompressed_len,
            "finished container"
        );

        Ok((out, header))
    }
}

impl<W: Write + Seek> Write for ContainerWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.sink.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.uncompressed_len += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}
