use byteorder::{ByteOrder, LittleEndian};

use crate::error::StorageError;

/// Size of the fixed container header in bytes.
pub const HEADER_LEN: usize = 32;

/// Number of leading header bytes that identify the container (magic + version).
pub const PREAMBLE_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    None = 0,
    Zstd = 1,
}

impl Compression {
    pub fn from_tag(tag: u8) -> Result<Self, StorageError> {
        match tag {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Zstd),
            other => Err(StorageError::UnsupportedCompression(other)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Zstd => "zstd",
        }
    }
}

/// Fixed-size header at the start of every container file.
///
/// The header is written last (over a zeroed placeholder), so a file whose
/// writer never finished carries an all-zero magic and is rejected on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub compression: Compression,
    pub compression_level: i8,
    /// Bytes of payload on disk following the header.
    pub payload_len: u64,
    /// Bytes of payload after decompression.
    pub uncompressed_len: u64,
    /// First 8 bytes (little-endian) of the blake3 hash of the uncompressed payload.
    pub content_hash: u64,
}

impl ContainerHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..4].copy_from_slice(&self.magic);
        out[4] = self.version;
        out[5] = self.compression as u8;
        out[6] = self.compression_level as u8;
        // out[7] is reserved and stays zero.
        LittleEndian::write_u64(&mut out[8..16], self.payload_len);
        LittleEndian::write_u64(&mut out[16..24], self.uncompressed_len);
        LittleEndian::write_u64(&mut out[24..32], self.content_hash);
        out
    }

    /// Decodes the header without checking magic or version; see
    /// [`ContainerHeader::check_preamble`].
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Result<Self, StorageError> {
        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        let version = bytes[4];
        let compression = Compression::from_tag(bytes[5])?;
        let compression_level = bytes[6] as i8;
        if bytes[7] != 0 {
            return Err(StorageError::InvalidHeader("reserved byte is not zero"));
        }
        let payload_len = LittleEndian::read_u64(&bytes[8..16]);
        let uncompressed_len = LittleEndian::read_u64(&bytes[16..24]);
        let content_hash = LittleEndian::read_u64(&bytes[24..32]);

        if compression == Compression::None && payload_len != uncompressed_len {
            return Err(StorageError::InvalidHeader(
                "uncompressed payload length does not match stored length",
            ));
        }

        Ok(Self {
            magic,
            version,
            compression,
            compression_level,
            payload_len,
            uncompressed_len,
            content_hash,
        })
    }

    /// Validates the magic and version bytes before anything else in the
    /// header is interpreted.
    pub fn check_preamble(
        preamble: &[u8; PREAMBLE_LEN],
        expected_magic: [u8; 4],
        expected_version: u8,
    ) -> Result<(), StorageError> {
        let found_magic = [preamble[0], preamble[1], preamble[2], preamble[3]];
        if found_magic != expected_magic {
            return Err(StorageError::BadMagic {
                expected: expected_magic,
                found: found_magic,
            });
        }
        if preamble[4] != expected_version {
            return Err(StorageError::UnsupportedVersion {
                expected: expected_version,
                found: preamble[4],
            });
        }
        Ok(())
    }
}
