// src/reader/proto.rs
// Protobuf messages of the structured (V6) stream formats

use crate::domain::{TransactionRecord, TransactionSidecarRecord};

#[derive(Clone, PartialEq, prost::Message)]
pub struct HashObject {
    #[prost(int32, tag = "1")]
    pub algorithm: i32,
    #[prost(int32, tag = "2")]
    pub length: i32,
    #[prost(bytes = "vec", tag = "3")]
    pub hash: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SignatureObject {
    /// 0 = SHA384withRSA, 1 = Ed25519
    #[prost(int32, tag = "1")]
    pub r#type: i32,
    #[prost(int32, tag = "2")]
    pub length: i32,
    #[prost(int32, tag = "3")]
    pub checksum: i32,
    #[prost(bytes = "vec", tag = "4")]
    pub signature: Vec<u8>,
    #[prost(message, optional, tag = "5")]
    pub hash_object: Option<HashObject>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SignatureFile {
    #[prost(message, optional, tag = "1")]
    pub file_signature: Option<SignatureObject>,
    #[prost(message, optional, tag = "2")]
    pub metadata_signature: Option<SignatureObject>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SemanticVersion {
    #[prost(int32, tag = "1")]
    pub major: i32,
    #[prost(int32, tag = "2")]
    pub minor: i32,
    #[prost(int32, tag = "3")]
    pub patch: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RecordStreamItem {
    #[prost(bytes = "vec", tag = "1")]
    pub transaction: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub record: Option<TransactionRecord>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SidecarMetadata {
    #[prost(message, optional, tag = "1")]
    pub hash: Option<HashObject>,
    #[prost(int32, tag = "2")]
    pub id: i32,
    #[prost(int32, repeated, tag = "3")]
    pub types: Vec<i32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RecordStreamFile {
    #[prost(message, optional, tag = "1")]
    pub hapi_proto_version: Option<SemanticVersion>,
    #[prost(message, optional, tag = "2")]
    pub start_object_running_hash: Option<HashObject>,
    #[prost(message, repeated, tag = "3")]
    pub record_stream_items: Vec<RecordStreamItem>,
    #[prost(message, optional, tag = "4")]
    pub end_object_running_hash: Option<HashObject>,
    #[prost(int64, tag = "5")]
    pub block_number: i64,
    #[prost(message, repeated, tag = "6")]
    pub sidecars: Vec<SidecarMetadata>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SidecarFile {
    #[prost(message, repeated, tag = "1")]
    pub sidecar_records: Vec<TransactionSidecarRecord>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SingleAccountBalances {
    #[prost(uint64, tag = "1")]
    pub account_id: u64,
    #[prost(int64, tag = "2")]
    pub hbar_balance: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AllAccountBalances {
    #[prost(int64, tag = "1")]
    pub consensus_timestamp: i64,
    #[prost(message, repeated, tag = "2")]
    pub all_accounts: Vec<SingleAccountBalances>,
}
