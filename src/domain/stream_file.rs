// src/domain/stream_file.rs
use crate::domain::{FileHash, StreamFilename, StreamType, Timestamp};
use bytes::Bytes;

/// Outcome of one transaction as written by consensus nodes.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TransactionRecord {
    #[prost(int64, tag = "1")]
    pub consensus_timestamp: i64,
    #[prost(bytes = "vec", tag = "2")]
    pub transaction_hash: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub payer_account_id: u64,
    #[prost(int32, tag = "4")]
    pub status: i32,
    #[prost(uint64, tag = "5")]
    pub transaction_fee: u64,
}

/// Auxiliary per-transaction data shipped in sidecar files.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TransactionSidecarRecord {
    #[prost(int64, tag = "1")]
    pub consensus_timestamp: i64,
    #[prost(bool, tag = "2")]
    pub migration: bool,
    #[prost(int32, tag = "3")]
    pub kind: i32,
    #[prost(bytes = "vec", tag = "4")]
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordItem {
    pub transaction: Vec<u8>,
    pub record: TransactionRecord,
}

impl RecordItem {
    pub fn consensus_timestamp(&self) -> Timestamp {
        self.record.consensus_timestamp
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountBalance {
    pub account_num: u64,
    pub balance: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StreamItems {
    Records(Vec<RecordItem>),
    Balances(Vec<AccountBalance>),
}

impl StreamItems {
    pub fn len(&self) -> usize {
        match self {
            StreamItems::Records(r) => r.len(),
            StreamItems::Balances(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn empty_like(&self) -> StreamItems {
        match self {
            StreamItems::Records(_) => StreamItems::Records(Vec::new()),
            StreamItems::Balances(_) => StreamItems::Balances(Vec::new()),
        }
    }
}

/// Sidecar declared by a record file: id plus the digest its bytes must hash to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SidecarRef {
    pub id: u32,
    pub hash: FileHash,
    pub types: Vec<i32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SidecarFile {
    pub id: u32,
    pub name: StreamFilename,
    pub hash: FileHash,
    pub size: usize,
    pub records: Vec<TransactionSidecarRecord>,
}

/// A decoded data file for one slot.
///
/// `file_hash` is the digest nodes sign; `hash` is the value the next file must
/// declare as its previous hash (the file hash for V2, the end running hash for
/// V5 and later).
#[derive(Clone, Debug, PartialEq)]
pub struct StreamFile {
    pub stream_type: StreamType,
    pub name: StreamFilename,
    pub version: u32,
    pub consensus_start: Timestamp,
    pub consensus_end: Timestamp,
    pub count: u64,
    pub file_hash: FileHash,
    pub hash: FileHash,
    pub previous_hash: Option<FileHash>,
    pub metadata_hash: Option<FileHash>,
    pub index: Option<i64>,
    pub node_id: Option<u64>,
    pub size: usize,
    pub bytes: Option<Bytes>,
    pub items: StreamItems,
    pub sidecar_refs: Vec<SidecarRef>,
    pub sidecars: Vec<SidecarFile>,
}

impl StreamFile {
    /// Drops payload bytes and items once persisted, keeping the metadata.
    pub fn clear(&mut self) {
        self.bytes = None;
        self.items = self.items.empty_like();
        for sidecar in &mut self.sidecars {
            sidecar.records = Vec::new();
        }
    }

    /// Metadata-only copy, used as the continuity reference for the next slot.
    pub fn summary(&self) -> StreamFile {
        let mut copy = self.clone_metadata();
        copy.sidecars = self
            .sidecars
            .iter()
            .map(|s| SidecarFile {
                records: Vec::new(),
                ..s.clone()
            })
            .collect();
        copy
    }

    fn clone_metadata(&self) -> StreamFile {
        StreamFile {
            stream_type: self.stream_type,
            name: self.name.clone(),
            version: self.version,
            consensus_start: self.consensus_start,
            consensus_end: self.consensus_end,
            count: self.count,
            file_hash: self.file_hash,
            hash: self.hash,
            previous_hash: self.previous_hash,
            metadata_hash: self.metadata_hash,
            index: self.index,
            node_id: self.node_id,
            size: self.size,
            bytes: None,
            items: self.items.empty_like(),
            sidecar_refs: self.sidecar_refs.clone(),
            sidecars: Vec::new(),
        }
    }
}
