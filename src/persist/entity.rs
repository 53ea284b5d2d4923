// src/persist/entity.rs
// Row types written by the importer and their storage keys

use crate::domain::{FileHash, FileKind, StreamFile, StreamFilename, StreamItems, StreamType, Timestamp};
use crate::error::{ImporterError, Result};
use crate::storage::{CF_ACCOUNT_BALANCE, CF_NODE, CF_SIDECAR_RECORD, CF_STREAM_FILE, CF_TRANSACTION};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    /// Existing keys are left as they are.
    InsertOnly,
    Upsert,
}

/// A row with a fixed destination table and key.
pub trait Entity: Serialize + Clone + Send + Sync + 'static {
    const TABLE: &'static str;
    const MODE: WriteMode;

    fn key(&self) -> Vec<u8>;
}

/// A row spread over fixed shards by one byte of its key.
pub trait ShardedEntity: Entity {
    fn shard_byte(&self) -> u8;

    fn shard(&self, shard_count: usize) -> usize {
        self.shard_byte() as usize % shard_count
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub consensus_timestamp: Timestamp,
    pub payer_account_id: u64,
    pub status: i32,
    pub transaction_fee: u64,
    pub transaction_hash: String,
    pub transaction_bytes: String,
    pub index: i64,
    pub stream_file: String,
}

impl Entity for TransactionRow {
    const TABLE: &'static str = CF_TRANSACTION;
    const MODE: WriteMode = WriteMode::InsertOnly;

    fn key(&self) -> Vec<u8> {
        self.consensus_timestamp.to_be_bytes().to_vec()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHashRow {
    #[serde(with = "hex_vec")]
    pub hash: Vec<u8>,
    pub consensus_timestamp: Timestamp,
    pub payer_account_id: u64,
}

impl Entity for TransactionHashRow {
    /// Sharded rows are routed to `transaction_hash_NN`; this name is the family prefix.
    const TABLE: &'static str = "transaction_hash";
    const MODE: WriteMode = WriteMode::InsertOnly;

    fn key(&self) -> Vec<u8> {
        let mut key = self.hash.clone();
        key.extend_from_slice(&self.consensus_timestamp.to_be_bytes());
        key
    }
}

impl ShardedEntity for TransactionHashRow {
    fn shard_byte(&self) -> u8 {
        self.hash.first().copied().unwrap_or(0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarRow {
    pub consensus_timestamp: Timestamp,
    /// Position of the record within its sidecar file.
    pub position: u32,
    pub sidecar_id: u32,
    pub kind: i32,
    pub migration: bool,
    #[serde(with = "hex_vec")]
    pub payload: Vec<u8>,
}

impl Entity for SidecarRow {
    const TABLE: &'static str = CF_SIDECAR_RECORD;
    const MODE: WriteMode = WriteMode::InsertOnly;

    fn key(&self) -> Vec<u8> {
        let mut key = self.consensus_timestamp.to_be_bytes().to_vec();
        key.extend_from_slice(&self.sidecar_id.to_be_bytes());
        key.extend_from_slice(&self.position.to_be_bytes());
        key
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalanceRow {
    pub consensus_timestamp: Timestamp,
    pub account_num: u64,
    pub balance: i64,
}

impl Entity for AccountBalanceRow {
    const TABLE: &'static str = CF_ACCOUNT_BALANCE;
    const MODE: WriteMode = WriteMode::InsertOnly;

    fn key(&self) -> Vec<u8> {
        let mut key = self.consensus_timestamp.to_be_bytes().to_vec();
        key.extend_from_slice(&self.account_num.to_be_bytes());
        key
    }
}

/// Metadata of one committed stream file. Written after all of the file's data
/// rows, so its presence marks the file as durably committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFileRow {
    pub stream_type: StreamType,
    pub name: String,
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
    pub sidecar_count: usize,
}

impl StreamFileRow {
    pub fn from_file(file: &StreamFile) -> Self {
        Self {
            stream_type: file.stream_type,
            name: file.name.to_string(),
            version: file.version,
            consensus_start: file.consensus_start,
            consensus_end: file.consensus_end,
            count: file.count,
            file_hash: file.file_hash,
            hash: file.hash,
            previous_hash: file.previous_hash,
            metadata_hash: file.metadata_hash,
            index: file.index,
            node_id: file.node_id,
            size: file.size,
            sidecar_count: file.sidecars.len(),
        }
    }

    /// Metadata-only `StreamFile` rebuilt from the row.
    pub fn to_summary(&self) -> Result<StreamFile> {
        let name = StreamFilename::parse(&self.name).map_err(ImporterError::Storage)?;
        if name.kind() != FileKind::Data {
            return Err(ImporterError::Storage(format!(
                "stream file row '{}' does not name a data file",
                self.name
            )));
        }
        let items = match self.stream_type {
            StreamType::Record => StreamItems::Records(Vec::new()),
            StreamType::Balance => StreamItems::Balances(Vec::new()),
        };
        Ok(StreamFile {
            stream_type: self.stream_type,
            name,
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
            items,
            sidecar_refs: Vec::new(),
            sidecars: Vec::new(),
        })
    }
}

impl Entity for StreamFileRow {
    const TABLE: &'static str = CF_STREAM_FILE;
    const MODE: WriteMode = WriteMode::Upsert;

    fn key(&self) -> Vec<u8> {
        let mut key = vec![self.stream_type.tag()];
        key.extend_from_slice(&self.consensus_end.to_be_bytes());
        key
    }
}

/// Address book entry as stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRow(pub crate::domain::ConsensusNode);

impl Entity for NodeRow {
    const TABLE: &'static str = CF_NODE;
    const MODE: WriteMode = WriteMode::Upsert;

    fn key(&self) -> Vec<u8> {
        self.0.node_id.to_be_bytes().to_vec()
    }
}

mod hex_vec {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(de::Error::custom)
    }
}
