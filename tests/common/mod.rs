// tests/common/mod.rs
// Shared builders: node keys, stream file encoders and an in-memory node source
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use mirror_importer::crypto::{keys, next_running_hash, sha384};
use mirror_importer::domain::{
    ConsensusNode, FileHash, FileKind, NodePublicKey, StreamFilename, StreamType, TransactionRecord,
    TransactionSidecarRecord,
};
use mirror_importer::error::{ImporterError, Result};
use mirror_importer::reader::{proto, read_stream_file};
use mirror_importer::{AddressBook, StreamFileProvider};
use parking_lot::Mutex;
use prost::Message;
use ring::rand::SystemRandom;
use ring::signature::{KeyPair, RsaKeyPair, RSA_PKCS1_SHA384};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const HASH_OBJECT_CLASS_ID: u64 = 0xf422da83a251741e;
pub const SIGNATURE_OBJECT_CLASS_ID: u64 = 0x13dc4b399b245c69;
pub const RECORD_STREAM_OBJECT_CLASS_ID: u64 = 0xe370929ba5429d8b;
pub const SHA_384_DIGEST_TYPE: i32 = 0x58ff811b;

/// Base instant of generated files: 2022-07-13T08:46:11Z.
pub const BASE_INSTANT: i64 = 1_657_701_971_000_000_000;
pub const SLOT_NANOS: i64 = 2_000_000_000;

pub fn instant(slot: i64) -> i64 {
    BASE_INSTANT + slot * SLOT_NANOS
}

pub enum Signer {
    Ed25519([u8; 32]),
    Rsa(Arc<RsaKeyPair>),
}

/// A consensus node together with the key it signs with.
pub struct TestNode {
    pub node: ConsensusNode,
    signer: Signer,
}

impl TestNode {
    pub fn ed25519(node_id: u64, stake: u64, total_stake: u64) -> Self {
        let seed = [node_id as u8 + 1; 32];
        let public = keys::public_from_seed(&seed).expect("derive key");
        Self {
            node: ConsensusNode {
                node_id,
                account_num: node_id + 3,
                public_key: Some(NodePublicKey::Ed25519(public)),
                stake,
                total_stake,
            },
            signer: Signer::Ed25519(seed),
        }
    }

    pub fn rsa(node_id: u64, stake: u64, total_stake: u64) -> Self {
        let pkcs8 = include_bytes!("../fixtures/node0_rsa.pk8");
        let pair = RsaKeyPair::from_pkcs8(pkcs8).expect("parse rsa fixture");
        Self {
            node: ConsensusNode {
                node_id,
                account_num: node_id + 3,
                public_key: Some(NodePublicKey::Rsa(pair.public_key().as_ref().to_vec())),
                stake,
                total_stake,
            },
            signer: Signer::Rsa(Arc::new(pair)),
        }
    }

    pub fn id(&self) -> u64 {
        self.node.node_id
    }

    pub fn signature_type_id(&self) -> i32 {
        match self.signer {
            Signer::Rsa(_) => 1,
            Signer::Ed25519(_) => 2,
        }
    }

    pub fn sign(&self, hash: &FileHash) -> Vec<u8> {
        match &self.signer {
            Signer::Ed25519(seed) => keys::sign_ed25519(seed, hash.as_bytes()).expect("sign"),
            Signer::Rsa(pair) => {
                let mut sig = vec![0u8; pair.public().modulus_len()];
                pair.sign(&RSA_PKCS1_SHA384, &SystemRandom::new(), hash.as_bytes(), &mut sig)
                    .expect("rsa sign");
                sig
            }
        }
    }

    /// Signature file of the same layout version as `data_version` for the given hashes.
    pub fn signature_file(&self, version: u32, file_hash: &FileHash, metadata_hash: Option<&FileHash>) -> Vec<u8> {
        let file_sig = self.sign(file_hash);
        match version {
            2 => signature_v2(file_hash, &file_sig),
            5 => {
                let meta = metadata_hash.expect("metadata hash");
                signature_v5(self.signature_type_id(), file_hash, &file_sig, meta, &self.sign(meta))
            }
            _ => {
                let meta = metadata_hash.expect("metadata hash");
                signature_v6(self.signature_type_id() - 1, file_hash, &file_sig, meta, &self.sign(meta))
            }
        }
    }
}

pub fn address_book(nodes: &[TestNode]) -> AddressBook {
    let book = AddressBook::new();
    for node in nodes {
        book.register(node.node.clone()).expect("register");
    }
    book
}

pub fn record(ts: i64) -> TransactionRecord {
    TransactionRecord {
        consensus_timestamp: ts,
        transaction_hash: sha384(&ts.to_be_bytes()).as_bytes().to_vec(),
        payer_account_id: 1001,
        status: 22,
        transaction_fee: 85_000,
    }
}

pub fn transaction(ts: i64) -> Vec<u8> {
    format!("tx-{}", ts).into_bytes()
}

fn hash_object(hash: &FileHash) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&HASH_OBJECT_CLASS_ID.to_be_bytes());
    out.extend_from_slice(&1i32.to_be_bytes());
    out.extend_from_slice(&SHA_384_DIGEST_TYPE.to_be_bytes());
    out.extend_from_slice(&48i32.to_be_bytes());
    out.extend_from_slice(hash.as_bytes());
    out
}

fn signature_object(type_id: i32, signature: &[u8]) -> Vec<u8> {
    let len = signature.len() as i32;
    let mut out = Vec::new();
    out.extend_from_slice(&SIGNATURE_OBJECT_CLASS_ID.to_be_bytes());
    out.extend_from_slice(&1i32.to_be_bytes());
    out.extend_from_slice(&type_id.to_be_bytes());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&(101 - len).to_be_bytes());
    out.extend_from_slice(signature);
    out
}

fn proto_hash(hash: &FileHash) -> proto::HashObject {
    proto::HashObject {
        algorithm: 1,
        length: 48,
        hash: hash.as_bytes().to_vec(),
    }
}

fn proto_signature(type_id: i32, hash: &FileHash, signature: &[u8]) -> proto::SignatureObject {
    proto::SignatureObject {
        r#type: type_id,
        length: signature.len() as i32,
        checksum: 101 - signature.len() as i32,
        signature: signature.to_vec(),
        hash_object: Some(proto_hash(hash)),
    }
}

pub fn signature_v2(hash: &FileHash, signature: &[u8]) -> Vec<u8> {
    let mut out = vec![4u8];
    out.extend_from_slice(hash.as_bytes());
    out.push(3);
    out.extend_from_slice(&(signature.len() as i32).to_be_bytes());
    out.extend_from_slice(signature);
    out
}

pub fn signature_v5(
    type_id: i32,
    file_hash: &FileHash,
    file_sig: &[u8],
    metadata_hash: &FileHash,
    metadata_sig: &[u8],
) -> Vec<u8> {
    signature_v5_typed(type_id, type_id, file_hash, file_sig, metadata_hash, metadata_sig)
}

/// V5 signature file whose two signature objects may declare different types.
pub fn signature_v5_typed(
    file_type: i32,
    metadata_type: i32,
    file_hash: &FileHash,
    file_sig: &[u8],
    metadata_hash: &FileHash,
    metadata_sig: &[u8],
) -> Vec<u8> {
    let mut out = vec![5u8];
    out.extend_from_slice(&1i32.to_be_bytes());
    out.extend_from_slice(&hash_object(file_hash));
    out.extend_from_slice(&signature_object(file_type, file_sig));
    out.extend_from_slice(&hash_object(metadata_hash));
    out.extend_from_slice(&signature_object(metadata_type, metadata_sig));
    out
}

/// `type_id` uses the protobuf numbering: 0 = RSA, 1 = Ed25519.
pub fn signature_v6(
    type_id: i32,
    file_hash: &FileHash,
    file_sig: &[u8],
    metadata_hash: &FileHash,
    metadata_sig: &[u8],
) -> Vec<u8> {
    let message = proto::SignatureFile {
        file_signature: Some(proto_signature(type_id, file_hash, file_sig)),
        metadata_signature: Some(proto_signature(type_id, metadata_hash, metadata_sig)),
    };
    let mut out = vec![6u8];
    out.extend_from_slice(&message.encode_to_vec());
    out
}

pub fn record_v2(previous: &FileHash, timestamps: &[i64]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&2i32.to_be_bytes());
    out.extend_from_slice(&3i32.to_be_bytes());
    out.push(1);
    out.extend_from_slice(previous.as_bytes());
    for ts in timestamps {
        let tx = transaction(*ts);
        let rec = record(*ts).encode_to_vec();
        out.push(2);
        out.extend_from_slice(&(tx.len() as i32).to_be_bytes());
        out.extend_from_slice(&tx);
        out.extend_from_slice(&(rec.len() as i32).to_be_bytes());
        out.extend_from_slice(&rec);
    }
    out
}

/// V5 record file and its end running hash.
pub fn record_v5(start: &FileHash, timestamps: &[i64]) -> (Vec<u8>, FileHash) {
    let mut out = Vec::new();
    for v in [5i32, 0, 27, 0, 1] {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out.extend_from_slice(&hash_object(start));
    let mut running = *start;
    for ts in timestamps {
        let rec = record(*ts).encode_to_vec();
        let tx = transaction(*ts);
        let mut object = Vec::new();
        object.extend_from_slice(&RECORD_STREAM_OBJECT_CLASS_ID.to_be_bytes());
        object.extend_from_slice(&1i32.to_be_bytes());
        object.extend_from_slice(&(rec.len() as i32).to_be_bytes());
        object.extend_from_slice(&rec);
        object.extend_from_slice(&(tx.len() as i32).to_be_bytes());
        object.extend_from_slice(&tx);
        running = next_running_hash(&running, &object);
        out.extend_from_slice(&object);
    }
    out.extend_from_slice(&hash_object(&running));
    (out, running)
}

pub fn sidecar(timestamps: &[i64]) -> Vec<u8> {
    proto::SidecarFile {
        sidecar_records: timestamps
            .iter()
            .map(|ts| TransactionSidecarRecord {
                consensus_timestamp: *ts,
                migration: false,
                kind: 1,
                payload: vec![7u8; 16],
            })
            .collect(),
    }
    .encode_to_vec()
}

/// V6 record file and its end running hash. `sidecars` are (id, bytes) pairs.
pub fn record_v6(start: &FileHash, timestamps: &[i64], block: i64, sidecars: &[(i32, Vec<u8>)]) -> (Vec<u8>, FileHash) {
    let items: Vec<proto::RecordStreamItem> = timestamps
        .iter()
        .map(|ts| proto::RecordStreamItem {
            transaction: transaction(*ts),
            record: Some(record(*ts)),
        })
        .collect();
    let mut running = *start;
    for item in &items {
        running = next_running_hash(&running, &item.encode_to_vec());
    }
    let message = proto::RecordStreamFile {
        hapi_proto_version: Some(proto::SemanticVersion {
            major: 0,
            minor: 30,
            patch: 0,
        }),
        start_object_running_hash: Some(proto_hash(start)),
        record_stream_items: items,
        end_object_running_hash: Some(proto_hash(&running)),
        block_number: block,
        sidecars: sidecars
            .iter()
            .map(|(id, bytes)| proto::SidecarMetadata {
                hash: Some(proto_hash(&sha384(bytes))),
                id: *id,
                types: vec![1],
            })
            .collect(),
    };
    let mut out = 6i32.to_be_bytes().to_vec();
    out.extend_from_slice(&message.encode_to_vec());
    (out, running)
}

pub fn balance_csv(timestamp: &str, rows: &[(u64, i64)]) -> Vec<u8> {
    let mut out = format!(
        "# version:2\n# TimeStamp:{}\nshardNum,realmNum,accountNum,balance\n",
        timestamp
    );
    for (account, balance) in rows {
        out.push_str(&format!("0,0,{},{}\n", account, balance));
    }
    out.into_bytes()
}

/// Signed hashes of a data file, as the importer itself would compute them.
pub fn hashes_of(name: &StreamFilename, data: &[u8]) -> (FileHash, Option<FileHash>) {
    let file = read_stream_file(name, Bytes::copy_from_slice(data)).expect("fixture decodes");
    (file.file_hash, file.metadata_hash)
}

/// In-memory bucket: per-node files plus nodes that fail or never answer.
#[derive(Default)]
pub struct MemoryProvider {
    files: Mutex<BTreeMap<(u64, String), Bytes>>,
    failing: Mutex<HashSet<u64>>,
    hanging: Mutex<HashSet<u64>>,
    delay: Mutex<Duration>,
    listing: AtomicUsize,
    pub max_concurrent_lists: AtomicUsize,
    pub gets: Mutex<Vec<(u64, String)>>,
}

impl MemoryProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(&self, node: u64, name: &StreamFilename, data: impl Into<Bytes>) {
        self.files.lock().insert((node, name.as_str().to_string()), data.into());
    }

    pub fn remove(&self, node: u64, name: &StreamFilename) {
        self.files.lock().remove(&(node, name.as_str().to_string()));
    }

    pub fn fail_node(&self, node: u64) {
        self.failing.lock().insert(node);
    }

    /// Requests to `node` never complete.
    pub fn hang_node(&self, node: u64) {
        self.hanging.lock().insert(node);
    }

    /// Every request takes at least `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    async fn answer(&self, node: u64) -> Result<()> {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let hangs = self.hanging.lock().contains(&node);
        if hangs {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let fails = self.failing.lock().contains(&node);
        if fails {
            return Err(ImporterError::Transport {
                node,
                reason: "connection refused".into(),
            });
        }
        Ok(())
    }

    /// Publish `data` and each node's signature for it. Returns the data file name.
    pub fn publish(&self, nodes: &[&TestNode], stream_type: StreamType, slot: i64, ext: &str, version: u32, data: &[u8]) -> StreamFilename {
        let name = StreamFilename::with_extension(stream_type, instant(slot), FileKind::Data, ext);
        let (file_hash, metadata_hash) = hashes_of(&name, data);
        for node in nodes {
            self.put(node.id(), &name, Bytes::copy_from_slice(data));
            self.put(
                node.id(),
                &name.signature_filename(),
                node.signature_file(version, &file_hash, metadata_hash.as_ref()),
            );
        }
        name
    }
}

#[async_trait]
impl StreamFileProvider for MemoryProvider {
    async fn list(
        &self,
        node: &ConsensusNode,
        stream_type: StreamType,
        after: Option<&StreamFilename>,
        limit: usize,
    ) -> Result<Vec<StreamFilename>> {
        let in_flight = self.listing.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_lists.fetch_max(in_flight, Ordering::SeqCst);
        let answered = self.answer(node.node_id).await;
        self.listing.fetch_sub(1, Ordering::SeqCst);
        answered?;

        let mut names: Vec<StreamFilename> = self
            .files
            .lock()
            .keys()
            .filter(|(id, _)| *id == node.node_id)
            .filter_map(|(_, name)| StreamFilename::parse(name).ok())
            .filter(|n| n.stream_type() == stream_type && n.kind() == FileKind::Signature)
            .filter(|n| after.map_or(true, |a| n.instant() > a.instant()))
            .collect();
        names.sort();
        names.truncate(limit);
        Ok(names)
    }

    async fn get(&self, node: &ConsensusNode, filename: &StreamFilename) -> Result<Option<Bytes>> {
        self.answer(node.node_id).await?;
        self.gets.lock().push((node.node_id, filename.as_str().to_string()));
        Ok(self
            .files
            .lock()
            .get(&(node.node_id, filename.as_str().to_string()))
            .cloned())
    }
}
