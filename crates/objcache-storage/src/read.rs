use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::StorageError;
use crate::header::{Compression, ContainerHeader, HEADER_LEN, PREAMBLE_LEN};

enum PayloadSource<R: Read> {
    Plain(io::Take<R>),
    Zstd(zstd::stream::read::Decoder<'static, BufReader<io::Take<R>>>),
}

impl<R: Read> Read for PayloadSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            PayloadSource::Plain(r) => r.read(buf),
            PayloadSource::Zstd(decoder) => decoder.read(buf),
        }
    }
}

/// Streaming reader for a framed container.
///
/// Magic and version are checked before any other header field is decoded.
/// The payload hash can only be verified once the whole payload has been
/// consumed, so callers must call [`ContainerReader::finish`] and treat
/// everything read so far as untrusted until it succeeds.
pub struct ContainerReader<R: Read> {
    header: ContainerHeader,
    source: PayloadSource<R>,
    hasher: blake3::Hasher,
    consumed: u64,
}

impl ContainerReader<BufReader<File>> {
    /// Opens a container file, additionally checking that the file is long
    /// enough to hold the payload its header announces.
    pub fn open_file(
        path: &Path,
        expected_magic: [u8; 4],
        expected_version: u8,
    ) -> Result<Self, StorageError> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let reader = Self::open(BufReader::new(file), expected_magic, expected_version)?;

        let expected = (HEADER_LEN as u64)
            .checked_add(reader.header.payload_len)
            .ok_or(StorageError::InvalidHeader("payload length overflow"))?;
        if file_len < expected {
            return Err(StorageError::Truncated {
                expected,
                found: file_len,
            });
        }
        Ok(reader)
    }
}

impl<R: Read> ContainerReader<R> {
    pub fn open(
        mut input: R,
        expected_magic: [u8; 4],
        expected_version: u8,
    ) -> Result<Self, StorageError> {
        let mut bytes = [0u8; HEADER_LEN];

        let found = read_up_to(&mut input, &mut bytes[..PREAMBLE_LEN])?;
        if found < PREAMBLE_LEN {
            return Err(StorageError::Truncated {
                expected: HEADER_LEN as u64,
                found: found as u64,
            });
        }
        let mut preamble = [0u8; PREAMBLE_LEN];
        preamble.copy_from_slice(&bytes[..PREAMBLE_LEN]);
        ContainerHeader::check_preamble(&preamble, expected_magic, expected_version)?;

        let rest = read_up_to(&mut input, &mut bytes[PREAMBLE_LEN..])?;
        if PREAMBLE_LEN + rest < HEADER_LEN {
            return Err(StorageError::Truncated {
                expected: HEADER_LEN as u64,
                found: (PREAMBLE_LEN + rest) as u64,
            });
        }
        let header = ContainerHeader::decode(&bytes)?;

        let limited = input.take(header.payload_len);
        let source = match header.compression {
            Compression::None => PayloadSource::Plain(limited),
            Compression::Zstd => {
                let decoder = zstd::stream::read::Decoder::new(limited)
                    .map_err(|e| StorageError::Decompression(e.to_string()))?
                    .single_frame();
                PayloadSource::Zstd(decoder)
            }
        };

        tracing::trace!(
            target = "objcache.storage",
            version = header.version,
            compression = header.compression.as_str(),
            payload_len = header.payload_len,
            uncompressed_len = header.uncompressed_len,
            "opened container"
        );

        Ok(Self {
            header,
            source,
            hasher: blake3::Hasher::new(),
            consumed: 0,
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Payload bytes left according to the header.
    pub fn remaining(&self) -> u64 {
        self.header.uncompressed_len - self.consumed
    }

    pub fn read_u8(&mut self) -> Result<u8, StorageError> {
        ReadBytesExt::read_u8(self).map_err(|err| self.payload_error(err, 1))
    }

    pub fn read_u32(&mut self) -> Result<u32, StorageError> {
        ReadBytesExt::read_u32::<LittleEndian>(self).map_err(|err| self.payload_error(err, 4))
    }

    pub fn read_u64(&mut self) -> Result<u64, StorageError> {
        ReadBytesExt::read_u64::<LittleEndian>(self).map_err(|err| self.payload_error(err, 8))
    }

    /// Fills `buf` completely from the payload.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), StorageError> {
        let wanted = buf.len() as u64;
        self.read_exact(buf)
            .map_err(|err| self.payload_error(err, wanted))
    }

    /// Reads a string written by `ContainerWriter::write_str`, rejecting
    /// length prefixes above `limit`.
    pub fn read_str(&mut self, limit: u32) -> Result<String, StorageError> {
        let len = self.read_u32()?;
        if len > limit {
            return Err(StorageError::OversizedString {
                len: len as u64,
                limit: limit as u64,
            });
        }
        let mut bytes = vec![0u8; len as usize];
        self.read_bytes(&mut bytes)?;
        String::from_utf8(bytes).map_err(|_| StorageError::InvalidUtf8)
    }

    /// Verifies that the payload was consumed exactly and that its hash
    /// matches the header.
    pub fn finish(mut self) -> Result<ContainerHeader, StorageError> {
        if self.consumed < self.header.uncompressed_len {
            return Err(StorageError::TrailingData {
                unread: self.remaining(),
            });
        }

        let mut probe = [0u8; 1];
        let extra = self
            .source
            .read(&mut probe)
            .map_err(|err| self.payload_error(err, 1))?;
        if extra != 0 {
            return Err(StorageError::LengthMismatch {
                expected: self.header.uncompressed_len,
                found: self.consumed + extra as u64,
            });
        }

        let found = crate::hash_prefix(&self.hasher.finalize());
        if found != self.header.content_hash {
            tracing::debug!(
                target = "objcache.storage",
                expected = self.header.content_hash,
                found,
                "container payload hash mismatch"
            );
            return Err(StorageError::HashMismatch {
                expected: self.header.content_hash,
                found,
            });
        }

        Ok(self.header)
    }

    fn payload_error(&self, err: io::Error, wanted: u64) -> StorageError {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            return StorageError::Truncated {
                expected: self.header.uncompressed_len.max(self.consumed + wanted),
                found: self.consumed,
            };
        }
        match self.header.compression {
            Compression::Zstd if err.kind() != io::ErrorKind::Interrupted => {
                StorageError::Decompression(err.to_string())
            }
            _ => StorageError::Io(err),
        }
    }
}

impl<R: Read> Read for ContainerReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let cap = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let n = self.source.read(&mut buf[..cap])?;
        self.hasher.update(&buf[..n]);
        self.consumed += n as u64;
        Ok(n)
    }
}

fn read_up_to(input: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
