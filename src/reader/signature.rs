// src/reader/signature.rs
// Signature file codec: V2 (flat), V5 (hash/signature objects), V6 (protobuf)

use super::{proto, proto_hash, ByteReader, SIGNATURE_OBJECT_CLASS_ID, SIGNATURE_OBJECT_CLASS_VERSION};
use crate::domain::{
    FileHash, SignatureRecord, SignatureStatus, SignatureType, StreamFilename,
};
use crate::error::{ImporterError, Result};
use prost::Message;

pub const MAX_SIGNATURE_LENGTH: usize = 6144;

const V2_TYPE_FILE_HASH: u8 = 4;
const V2_TYPE_SIGNATURE: u8 = 3;
const V5_MARKER: u8 = 5;
const V6_MARKER: u8 = 6;
const V5_OBJECT_STREAM_SIGNATURE_VERSION: i32 = 1;

/// Signature file layouts, selected by the leading byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureFileFormat {
    V2,
    V5,
    V6,
}

impl SignatureFileFormat {
    pub fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            V2_TYPE_FILE_HASH => Some(SignatureFileFormat::V2),
            V5_MARKER => Some(SignatureFileFormat::V5),
            V6_MARKER => Some(SignatureFileFormat::V6),
            _ => None,
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            SignatureFileFormat::V2 => 2,
            SignatureFileFormat::V5 => 5,
            SignatureFileFormat::V6 => 6,
        }
    }
}

struct HashSignature {
    signature_type: SignatureType,
    hash: FileHash,
    signature: Vec<u8>,
}

/// Decode the signature file `filename` fetched from node `node_id`.
/// The result is always `Unverified`.
pub fn read_signature_file(
    filename: &StreamFilename,
    node_id: u64,
    data: &[u8],
) -> Result<SignatureRecord> {
    let name = filename.as_str();
    let marker = *data
        .first()
        .ok_or_else(|| ImporterError::decode(name, None, "empty signature file"))?;
    let format = SignatureFileFormat::from_marker(marker).ok_or_else(|| {
        ImporterError::decode(name, None, format!("unknown signature file version marker {}", marker))
    })?;

    let (file, metadata) = match format {
        SignatureFileFormat::V2 => (read_v2(name, data)?, None),
        SignatureFileFormat::V5 => {
            let (file, metadata) = read_v5(name, data)?;
            (file, Some(metadata))
        }
        SignatureFileFormat::V6 => {
            let (file, metadata) = read_v6(name, data)?;
            (file, Some(metadata))
        }
    };

    // one key signs both hashes
    if let Some(metadata) = &metadata {
        if metadata.signature_type != file.signature_type {
            return Err(ImporterError::decode(
                name,
                Some(format.version()),
                format!(
                    "metadata signature type {:?} differs from file signature type {:?}",
                    metadata.signature_type, file.signature_type
                ),
            ));
        }
    }

    Ok(SignatureRecord {
        filename: filename.clone(),
        version: format.version(),
        signature_type: file.signature_type,
        file_hash: file.hash,
        file_hash_signature: file.signature,
        metadata_hash: metadata.as_ref().map(|m| m.hash),
        metadata_hash_signature: metadata.map(|m| m.signature),
        node_id,
        status: SignatureStatus::Unverified,
    })
}

fn read_v2(name: &str, data: &[u8]) -> Result<HashSignature> {
    let mut reader = ByteReader::new(data, name);
    reader.set_version(2);
    reader.expect_u8(V2_TYPE_FILE_HASH, "file hash delimiter")?;
    let hash = reader.read_hash("file hash")?;
    reader.expect_u8(V2_TYPE_SIGNATURE, "signature delimiter")?;
    let signature = reader
        .read_length_prefixed(MAX_SIGNATURE_LENGTH, "file signature")?
        .to_vec();
    reader.expect_end()?;
    Ok(HashSignature {
        signature_type: SignatureType::Sha384WithRsa,
        hash,
        signature,
    })
}

fn read_v5(name: &str, data: &[u8]) -> Result<(HashSignature, HashSignature)> {
    let mut reader = ByteReader::new(data, name);
    reader.set_version(5);
    reader.expect_u8(V5_MARKER, "version")?;
    reader.expect_i32(V5_OBJECT_STREAM_SIGNATURE_VERSION, "object stream signature version")?;

    let file_hash = reader.read_hash_object("file hash object")?;
    let (file_type, file_signature) = read_signature_object(&mut reader, "file signature object")?;
    let metadata_hash = reader.read_hash_object("metadata hash object")?;
    let (metadata_type, metadata_signature) =
        read_signature_object(&mut reader, "metadata signature object")?;
    reader.expect_end()?;

    Ok((
        HashSignature {
            signature_type: file_type,
            hash: file_hash,
            signature: file_signature,
        },
        HashSignature {
            signature_type: metadata_type,
            hash: metadata_hash,
            signature: metadata_signature,
        },
    ))
}

fn read_signature_object(reader: &mut ByteReader<'_>, field: &str) -> Result<(SignatureType, Vec<u8>)> {
    let class_id = reader.read_i64(field)?;
    if class_id != SIGNATURE_OBJECT_CLASS_ID {
        return Err(reader.error(format!("invalid {} class id {:#x}", field, class_id)));
    }
    reader.expect_i32(SIGNATURE_OBJECT_CLASS_VERSION, field)?;
    let type_id = reader.read_i32(field)?;
    let signature_type = SignatureType::from_id(type_id)
        .ok_or_else(|| reader.error(format!("unknown {} signature type {}", field, type_id)))?;
    let length = reader.read_i32(field)?;
    if length <= 0 || length as usize > MAX_SIGNATURE_LENGTH {
        return Err(reader.error(format!("invalid {} length {}", field, length)));
    }
    let checksum = reader.read_i32(field)?;
    if checksum != 101 - length {
        return Err(reader.error(format!(
            "invalid {} checksum {}, expected {}",
            field,
            checksum,
            101 - length
        )));
    }
    let signature = reader.read_bytes(length as usize, field)?.to_vec();
    Ok((signature_type, signature))
}

fn read_v6(name: &str, data: &[u8]) -> Result<(HashSignature, HashSignature)> {
    let message = proto::SignatureFile::decode(&data[1..])
        .map_err(|e| ImporterError::decode(name, Some(6), format!("invalid signature message: {}", e)))?;

    let file = message
        .file_signature
        .as_ref()
        .ok_or_else(|| ImporterError::decode(name, Some(6), "missing file signature"))?;
    let metadata = message
        .metadata_signature
        .as_ref()
        .ok_or_else(|| ImporterError::decode(name, Some(6), "missing metadata signature"))?;

    Ok((
        proto_signature(name, file, "file signature")?,
        proto_signature(name, metadata, "metadata signature")?,
    ))
}

fn proto_signature(name: &str, object: &proto::SignatureObject, field: &str) -> Result<HashSignature> {
    let signature_type = match object.r#type {
        0 => SignatureType::Sha384WithRsa,
        1 => SignatureType::Ed25519,
        other => {
            return Err(ImporterError::decode(
                name,
                Some(6),
                format!("unknown {} type {}", field, other),
            ))
        }
    };
    let length = object.signature.len();
    if length == 0 || length > MAX_SIGNATURE_LENGTH || object.length as usize != length {
        return Err(ImporterError::decode(
            name,
            Some(6),
            format!(
                "{} declares length {} but carries {} bytes",
                field, object.length, length
            ),
        ));
    }
    if object.checksum != 101 - object.length {
        return Err(ImporterError::decode(
            name,
            Some(6),
            format!("invalid {} checksum {}", field, object.checksum),
        ));
    }
    let hash = proto_hash(object.hash_object.as_ref(), name, 6, &format!("{} hash", field))?;
    Ok(HashSignature {
        signature_type,
        hash,
        signature: object.signature.clone(),
    })
}
