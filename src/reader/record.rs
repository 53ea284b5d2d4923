// src/reader/record.rs
// Record stream file codec: V2 (concatenated records), V5 (object stream), V6 (protobuf)

use super::{
    proto, proto_hash, ByteReader, HASH_OBJECT_LENGTH, RECORD_STREAM_OBJECT_CLASS_ID,
    RECORD_STREAM_OBJECT_CLASS_VERSION,
};
use crate::crypto::{next_running_hash, sha384, sha384_parts};
use crate::domain::{
    FileHash, RecordItem, SidecarRef, StreamFile, StreamFilename, StreamItems, StreamType,
    TransactionRecord,
};
use crate::error::{ImporterError, Result};
use bytes::Bytes;
use prost::Message;

/// Largest single transaction or record accepted inside a record file.
pub const MAX_ITEM_LENGTH: usize = 6 * 1024 * 1024;

const V2_PREV_HASH_MARKER: u8 = 1;
const V2_RECORD_MARKER: u8 = 2;
const V5_OBJECT_STREAM_VERSION: i32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordFileFormat {
    V2,
    V5,
    V6,
}

impl RecordFileFormat {
    pub fn from_version(version: i32) -> Option<Self> {
        match version {
            2 => Some(RecordFileFormat::V2),
            5 => Some(RecordFileFormat::V5),
            6 => Some(RecordFileFormat::V6),
            _ => None,
        }
    }
}

/// Decode a record stream file. Versions outside the known set are rejected.
pub fn read_record_file(filename: &StreamFilename, data: Bytes) -> Result<StreamFile> {
    let name = filename.as_str();
    let version = {
        let mut reader = ByteReader::new(&data, name);
        reader.read_i32("version")?
    };
    let format = RecordFileFormat::from_version(version).ok_or_else(|| {
        ImporterError::decode(name, None, format!("unsupported record file version {}", version))
    })?;

    let decoded = match format {
        RecordFileFormat::V2 => read_v2(name, &data)?,
        RecordFileFormat::V5 => read_v5(name, &data)?,
        RecordFileFormat::V6 => read_v6(name, &data)?,
    };

    let (consensus_start, consensus_end) = consensus_range(name, version as u32, filename, &decoded.items)?;

    Ok(StreamFile {
        stream_type: StreamType::Record,
        name: filename.clone(),
        version: version as u32,
        consensus_start,
        consensus_end,
        count: decoded.items.len() as u64,
        file_hash: decoded.file_hash,
        hash: decoded.hash,
        previous_hash: Some(decoded.previous_hash),
        metadata_hash: decoded.metadata_hash,
        index: decoded.index,
        node_id: None,
        size: data.len(),
        bytes: Some(data),
        items: StreamItems::Records(decoded.items),
        sidecar_refs: decoded.sidecar_refs,
        sidecars: Vec::new(),
    })
}

struct DecodedRecordFile {
    file_hash: FileHash,
    hash: FileHash,
    previous_hash: FileHash,
    metadata_hash: Option<FileHash>,
    index: Option<i64>,
    items: Vec<RecordItem>,
    sidecar_refs: Vec<SidecarRef>,
}

fn consensus_range(
    name: &str,
    version: u32,
    filename: &StreamFilename,
    items: &[RecordItem],
) -> Result<(i64, i64)> {
    let mut previous: Option<i64> = None;
    for item in items {
        let ts = item.consensus_timestamp();
        if let Some(prev) = previous {
            if ts <= prev {
                return Err(ImporterError::decode(
                    name,
                    Some(version),
                    format!("consensus timestamp {} does not follow {}", ts, prev),
                ));
            }
        }
        previous = Some(ts);
    }
    match (items.first(), items.last()) {
        (Some(first), Some(last)) => Ok((first.consensus_timestamp(), last.consensus_timestamp())),
        _ => Ok((filename.instant(), filename.instant())),
    }
}

fn decode_record(name: &str, version: u32, bytes: &[u8]) -> Result<TransactionRecord> {
    TransactionRecord::decode(bytes).map_err(|e| {
        ImporterError::decode(name, Some(version), format!("invalid transaction record: {}", e))
    })
}

fn read_v2(name: &str, data: &[u8]) -> Result<DecodedRecordFile> {
    let mut reader = ByteReader::new(data, name);
    reader.set_version(2);
    reader.expect_i32(2, "version")?;
    let _hapi_version = reader.read_i32("hapi version")?;
    reader.expect_u8(V2_PREV_HASH_MARKER, "previous hash marker")?;
    let previous_hash = reader.read_hash("previous hash")?;
    let header_len = reader.position();

    let mut items = Vec::new();
    while !reader.is_empty() {
        reader.expect_u8(V2_RECORD_MARKER, "record marker")?;
        let transaction = reader.read_length_prefixed(MAX_ITEM_LENGTH, "transaction")?.to_vec();
        let record_bytes = reader.read_length_prefixed(MAX_ITEM_LENGTH, "record")?;
        let record = decode_record(name, 2, record_bytes)?;
        items.push(RecordItem { transaction, record });
    }

    let body_hash = sha384(&data[header_len..]);
    let file_hash = sha384_parts(&[&data[..header_len], body_hash.as_bytes()]);

    Ok(DecodedRecordFile {
        file_hash,
        hash: file_hash,
        previous_hash,
        metadata_hash: None,
        index: None,
        items,
        sidecar_refs: Vec::new(),
    })
}

fn read_v5(name: &str, data: &[u8]) -> Result<DecodedRecordFile> {
    let mut reader = ByteReader::new(data, name);
    reader.set_version(5);
    reader.expect_i32(5, "version")?;
    let _major = reader.read_i32("hapi major version")?;
    let _minor = reader.read_i32("hapi minor version")?;
    let _patch = reader.read_i32("hapi patch version")?;
    reader.expect_i32(V5_OBJECT_STREAM_VERSION, "object stream version")?;
    let header_len = reader.position();

    let start_offset = reader.position();
    let start_hash = reader.read_hash_object("start running hash object")?;
    let start_object = &data[start_offset..reader.position()];

    let mut running = start_hash;
    let mut items = Vec::new();
    while reader.peek_i64() == Some(RECORD_STREAM_OBJECT_CLASS_ID) {
        let item_offset = reader.position();
        reader.read_i64("record stream object class id")?;
        reader.expect_i32(RECORD_STREAM_OBJECT_CLASS_VERSION, "record stream object class version")?;
        let record_bytes = reader.read_length_prefixed(MAX_ITEM_LENGTH, "record")?;
        let transaction = reader.read_length_prefixed(MAX_ITEM_LENGTH, "transaction")?.to_vec();
        running = next_running_hash(&running, &data[item_offset..reader.position()]);
        let record = decode_record(name, 5, record_bytes)?;
        items.push(RecordItem { transaction, record });
    }

    let end_offset = reader.position();
    let end_hash = reader.read_hash_object("end running hash object")?;
    let end_object = &data[end_offset..reader.position()];
    reader.expect_end()?;
    debug_assert_eq!(end_object.len(), HASH_OBJECT_LENGTH);

    if running != end_hash {
        return Err(reader.error(format!(
            "end running hash {} does not match computed {}",
            end_hash, running
        )));
    }

    let metadata_hash = sha384_parts(&[&data[..header_len], start_object, end_object]);

    Ok(DecodedRecordFile {
        file_hash: sha384(data),
        hash: end_hash,
        previous_hash: start_hash,
        metadata_hash: Some(metadata_hash),
        index: None,
        items,
        sidecar_refs: Vec::new(),
    })
}

fn read_v6(name: &str, data: &[u8]) -> Result<DecodedRecordFile> {
    let message = proto::RecordStreamFile::decode(&data[4..])
        .map_err(|e| ImporterError::decode(name, Some(6), format!("invalid record stream message: {}", e)))?;

    let start_hash = proto_hash(
        message.start_object_running_hash.as_ref(),
        name,
        6,
        "start running hash",
    )?;
    let end_hash = proto_hash(
        message.end_object_running_hash.as_ref(),
        name,
        6,
        "end running hash",
    )?;

    let mut running = start_hash;
    let mut items = Vec::with_capacity(message.record_stream_items.len());
    for item in &message.record_stream_items {
        running = next_running_hash(&running, &item.encode_to_vec());
        let record = item
            .record
            .clone()
            .ok_or_else(|| ImporterError::decode(name, Some(6), "record stream item without record"))?;
        items.push(RecordItem {
            transaction: item.transaction.clone(),
            record,
        });
    }
    if running != end_hash {
        return Err(ImporterError::decode(
            name,
            Some(6),
            format!("end running hash {} does not match computed {}", end_hash, running),
        ));
    }

    let hapi = message.hapi_proto_version.clone().unwrap_or_default();
    let metadata_hash = sha384_parts(&[
        &6i32.to_be_bytes(),
        &hapi.major.to_be_bytes(),
        &hapi.minor.to_be_bytes(),
        &hapi.patch.to_be_bytes(),
        start_hash.as_bytes(),
        end_hash.as_bytes(),
        &message.block_number.to_be_bytes(),
    ]);

    let mut sidecar_refs = Vec::with_capacity(message.sidecars.len());
    for sidecar in &message.sidecars {
        if sidecar.id <= 0 {
            return Err(ImporterError::decode(
                name,
                Some(6),
                format!("invalid sidecar id {}", sidecar.id),
            ));
        }
        let hash = proto_hash(sidecar.hash.as_ref(), name, 6, "sidecar hash")?;
        sidecar_refs.push(SidecarRef {
            id: sidecar.id as u32,
            hash,
            types: sidecar.types.clone(),
        });
    }

    Ok(DecodedRecordFile {
        file_hash: sha384(data),
        hash: end_hash,
        previous_hash: start_hash,
        metadata_hash: Some(metadata_hash),
        index: Some(message.block_number),
        items,
        sidecar_refs,
    })
}
