// src/reader/mod.rs
// Version-dispatched decoders for signature, record, sidecar and balance files

pub mod balance;
pub mod proto;
pub mod record;
pub mod sidecar;
pub mod signature;

use crate::domain::{FileHash, StreamFile, StreamFilename, StreamType, HASH_LENGTH};
use crate::error::{ImporterError, Result};
use bytes::Bytes;

pub use balance::read_balance_file;
pub use record::read_record_file;
pub use sidecar::read_sidecar_file;
pub use signature::read_signature_file;

pub const HASH_OBJECT_CLASS_ID: i64 = 0xf422da83a251741e_u64 as i64;
pub const HASH_OBJECT_CLASS_VERSION: i32 = 1;
pub const SIGNATURE_OBJECT_CLASS_ID: i64 = 0x13dc4b399b245c69_u64 as i64;
pub const SIGNATURE_OBJECT_CLASS_VERSION: i32 = 1;
pub const RECORD_STREAM_OBJECT_CLASS_ID: i64 = 0xe370929ba5429d8b_u64 as i64;
pub const RECORD_STREAM_OBJECT_CLASS_VERSION: i32 = 1;
/// Digest type id of SHA-384 in binary hash objects.
pub const SHA_384_DIGEST_TYPE: i32 = 0x58ff811b;
/// Protobuf `HashAlgorithm` value of SHA-384.
pub const SHA_384_PROTO_ALGORITHM: i32 = 1;
pub const HASH_OBJECT_LENGTH: usize = 8 + 4 + 4 + 4 + HASH_LENGTH;

/// Bounds-checked big-endian cursor. Every failed read names the file, version
/// and field it was reading.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    file: &'a str,
    version: Option<u32>,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8], file: &'a str) -> Self {
        Self {
            data,
            pos: 0,
            file,
            version: None,
        }
    }

    pub fn set_version(&mut self, version: u32) {
        self.version = Some(version);
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn error(&self, reason: impl Into<String>) -> ImporterError {
        ImporterError::decode(self.file, self.version, reason)
    }

    pub fn read_bytes(&mut self, len: usize, field: &str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(self.error(format!(
                "truncated {}: need {} bytes at offset {}, {} left",
                field,
                len,
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn read_u8(&mut self, field: &str) -> Result<u8> {
        Ok(self.read_bytes(1, field)?[0])
    }

    pub fn read_i32(&mut self, field: &str) -> Result<i32> {
        let b = self.read_bytes(4, field)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i64(&mut self, field: &str) -> Result<i64> {
        let b = self.read_bytes(8, field)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(i64::from_be_bytes(arr))
    }

    pub fn peek_i64(&self) -> Option<i64> {
        let b = self.data.get(self.pos..self.pos + 8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Some(i64::from_be_bytes(arr))
    }

    pub fn expect_u8(&mut self, expected: u8, field: &str) -> Result<()> {
        let actual = self.read_u8(field)?;
        if actual != expected {
            return Err(self.error(format!(
                "invalid {}: expected {}, got {}",
                field, expected, actual
            )));
        }
        Ok(())
    }

    pub fn expect_i32(&mut self, expected: i32, field: &str) -> Result<()> {
        let actual = self.read_i32(field)?;
        if actual != expected {
            return Err(self.error(format!(
                "invalid {}: expected {}, got {}",
                field, expected, actual
            )));
        }
        Ok(())
    }

    pub fn read_hash(&mut self, field: &str) -> Result<FileHash> {
        let bytes = self.read_bytes(HASH_LENGTH, field)?;
        // length already checked by read_bytes
        FileHash::from_slice(bytes).ok_or_else(|| self.error(format!("invalid {}", field)))
    }

    /// `i32` length followed by that many bytes, with `1..=max` enforced.
    pub fn read_length_prefixed(&mut self, max: usize, field: &str) -> Result<&'a [u8]> {
        let len = self.read_i32(field)?;
        if len <= 0 || len as usize > max {
            return Err(self.error(format!(
                "invalid {} length {}, expected 1..={}",
                field, len, max
            )));
        }
        self.read_bytes(len as usize, field)
    }

    /// Reads a binary hash object (class id, class version, digest type, length, hash).
    pub fn read_hash_object(&mut self, field: &str) -> Result<FileHash> {
        let class_id = self.read_i64(field)?;
        if class_id != HASH_OBJECT_CLASS_ID {
            return Err(self.error(format!("invalid {} class id {:#x}", field, class_id)));
        }
        self.expect_i32(HASH_OBJECT_CLASS_VERSION, field)?;
        self.expect_i32(SHA_384_DIGEST_TYPE, field)?;
        self.expect_i32(HASH_LENGTH as i32, field)?;
        self.read_hash(field)
    }

    pub fn expect_end(&self) -> Result<()> {
        if !self.is_empty() {
            return Err(self.error(format!(
                "{} unexpected trailing byte(s) at offset {}",
                self.remaining(),
                self.pos
            )));
        }
        Ok(())
    }
}

/// Decode a data file of any stream type.
pub fn read_stream_file(filename: &StreamFilename, data: Bytes) -> Result<StreamFile> {
    match filename.stream_type() {
        StreamType::Record => read_record_file(filename, data),
        StreamType::Balance => read_balance_file(filename, data),
    }
}

/// Hash carried by a protobuf hash object.
pub(crate) fn proto_hash(
    object: Option<&proto::HashObject>,
    file: &str,
    version: u32,
    field: &str,
) -> Result<FileHash> {
    let object =
        object.ok_or_else(|| ImporterError::decode(file, Some(version), format!("missing {}", field)))?;
    if object.algorithm != SHA_384_PROTO_ALGORITHM {
        return Err(ImporterError::decode(
            file,
            Some(version),
            format!("unsupported {} algorithm {}", field, object.algorithm),
        ));
    }
    if object.length as usize != object.hash.len() {
        return Err(ImporterError::decode(
            file,
            Some(version),
            format!(
                "{} declares length {} but carries {} bytes",
                field,
                object.length,
                object.hash.len()
            ),
        ));
    }
    FileHash::from_slice(&object.hash).ok_or_else(|| {
        ImporterError::decode(
            file,
            Some(version),
            format!("{} must be {} bytes, got {}", field, HASH_LENGTH, object.hash.len()),
        )
    })
}
