// tests/consensus.rs
mod common;

use common::TestNode;
use mirror_importer::crypto::sha384;
use mirror_importer::domain::{
    FileHash, FileKind, SignatureRecord, SignatureStatus, SignatureType, StreamFilename, StreamType,
};
use mirror_importer::error::ImporterError;
use mirror_importer::reader::read_signature_file;
use mirror_importer::signature::{ConsensusEngine, NodeSignatureVerifier, StakeRatio, DEFAULT_CONSENSUS_RATIO};
use std::collections::HashMap;

fn slot() -> StreamFilename {
    StreamFilename::new(StreamType::Record, common::instant(1), FileKind::Signature)
}

fn verified(node_id: u64, hash: u8) -> SignatureRecord {
    SignatureRecord {
        filename: slot(),
        version: 6,
        signature_type: SignatureType::Ed25519,
        file_hash: FileHash([hash; 48]),
        file_hash_signature: vec![1; 64],
        metadata_hash: None,
        metadata_hash_signature: None,
        node_id,
        status: SignatureStatus::Verified,
    }
}

fn equal_stakes(n: u64, stake: u64) -> HashMap<u64, u64> {
    (0..n).map(|id| (id, stake)).collect()
}

#[test]
fn two_of_four_equal_nodes_reach_one_third() {
    let engine = ConsensusEngine::new(DEFAULT_CONSENSUS_RATIO);
    assert_eq!(engine.required_stake(100), 34);

    let records = vec![verified(0, 0xa), verified(1, 0xa), verified(2, 0xb), verified(3, 0xc)];
    let outcome = engine
        .reach_consensus(slot().as_str(), records, &equal_stakes(4, 25), 100)
        .expect("consensus on A");
    assert_eq!(outcome.file_hash, FileHash([0xa; 48]));
    assert_eq!(outcome.stake, 50);
    assert_eq!(outcome.required, 34);
    assert_eq!(outcome.winning_nodes(), vec![0, 1]);
    // losers stay verified
    assert_eq!(outcome.records[2].status, SignatureStatus::Verified);
}

#[test]
fn four_different_hashes_never_agree() {
    let engine = ConsensusEngine::default();
    let records = vec![verified(0, 0xa), verified(1, 0xb), verified(2, 0xc), verified(3, 0xd)];
    match engine.reach_consensus(slot().as_str(), records, &equal_stakes(4, 25), 100) {
        Err(e @ ImporterError::Consensus { .. }) => {
            assert!(e.is_recoverable());
            if let ImporterError::Consensus {
                best_stake,
                best_count,
                required,
                total_stake,
                ..
            } = e
            {
                assert_eq!((best_stake, best_count, required, total_stake), (25, 1, 34, 100));
            }
        }
        other => panic!("expected consensus error, got {:?}", other.map(|o| o.file_hash)),
    }
}

#[test]
fn stake_outweighs_node_count() {
    // six small nodes sign A, the 40-stake node signs B
    let mut nodes: Vec<TestNode> = (0..6).map(|id| TestNode::ed25519(id, 10, 100)).collect();
    nodes.push(TestNode::ed25519(6, 40, 100));
    let registry: Vec<_> = nodes.iter().map(|n| n.node.clone()).collect();

    let hash_a = sha384(b"file A");
    let hash_b = sha384(b"file B");
    let metadata = sha384(b"metadata");
    let records: Vec<SignatureRecord> = nodes
        .iter()
        .map(|n| {
            let hash = if n.id() == 6 { &hash_b } else { &hash_a };
            let data = n.signature_file(6, hash, Some(&metadata));
            read_signature_file(&slot(), n.id(), &data).expect("decode")
        })
        .collect();

    let verifier = NodeSignatureVerifier::new(ConsensusEngine::new(StakeRatio::new(1, 3).unwrap()));
    let outcome = verifier.verify(slot().as_str(), records, &registry).expect("consensus");
    assert_eq!(outcome.file_hash, hash_a);
    assert_eq!(outcome.stake, 60);
    assert_eq!(outcome.winning_nodes(), vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(outcome.metadata_hash, Some(metadata));
}

#[test]
fn rejected_signatures_do_not_vote() {
    let nodes: Vec<TestNode> = (0..3).map(|id| TestNode::ed25519(id, 1, 3)).collect();
    let registry: Vec<_> = nodes.iter().map(|n| n.node.clone()).collect();
    let hash = sha384(b"file");
    let metadata = sha384(b"metadata");

    let mut records: Vec<SignatureRecord> = nodes
        .iter()
        .map(|n| {
            let data = n.signature_file(6, &hash, Some(&metadata));
            read_signature_file(&slot(), n.id(), &data).expect("decode")
        })
        .collect();
    // two nodes' signatures are corrupted, leaving stake 1 of the required 2
    records[0].file_hash_signature[0] ^= 1;
    records[1].file_hash_signature[0] ^= 1;

    let verifier = NodeSignatureVerifier::new(ConsensusEngine::new(StakeRatio::new(1, 2).unwrap()));
    assert!(matches!(
        verifier.verify(slot().as_str(), records, &registry),
        Err(ImporterError::Consensus { best_stake: 1, .. })
    ));
}

#[test]
fn first_qualifying_group_wins_ties() {
    let engine = ConsensusEngine::new("0.25".parse().unwrap());
    let stakes = equal_stakes(4, 25);
    let forward = vec![verified(0, 0xb), verified(1, 0xa), verified(2, 0xa), verified(3, 0xb)];
    let outcome = engine
        .reach_consensus(slot().as_str(), forward.clone(), &stakes, 100)
        .unwrap();
    assert_eq!(outcome.file_hash, FileHash([0xb; 48]));

    // rerunning the same inputs is deterministic
    let again = engine.reach_consensus(slot().as_str(), forward, &stakes, 100).unwrap();
    assert_eq!(again.file_hash, outcome.file_hash);
    assert_eq!(again.winning_nodes(), outcome.winning_nodes());

    let reversed = vec![verified(1, 0xa), verified(0, 0xb), verified(2, 0xa), verified(3, 0xb)];
    let outcome = engine.reach_consensus(slot().as_str(), reversed, &stakes, 100).unwrap();
    assert_eq!(outcome.file_hash, FileHash([0xa; 48]));
}

#[test]
fn zero_total_stake_fails() {
    let engine = ConsensusEngine::default();
    let records = vec![verified(0, 0xa), verified(1, 0xa)];
    assert!(matches!(
        engine.reach_consensus(slot().as_str(), records, &equal_stakes(2, 0), 0),
        Err(ImporterError::Consensus { total_stake: 0, .. })
    ));
}

#[test]
fn zero_ratio_accepts_any_verified_signature() {
    let engine = ConsensusEngine::new(StakeRatio::new(0, 1).unwrap());
    let outcome = engine
        .reach_consensus(slot().as_str(), vec![verified(0, 0xe)], &HashMap::new(), 0)
        .expect("no stake check");
    assert_eq!(outcome.file_hash, FileHash([0xe; 48]));
    assert_eq!(outcome.winning_nodes(), vec![0]);

    // but an empty verified set still fails
    let mut rejected = verified(0, 0xe);
    rejected.status = SignatureStatus::Rejected;
    assert!(engine
        .reach_consensus(slot().as_str(), vec![rejected], &HashMap::new(), 0)
        .is_err());
}

#[test]
fn decimal_threshold_is_not_inflated() {
    // 0.55 * 100 lands just above 55 in floating point
    let engine = ConsensusEngine::new(StakeRatio::from_f64(0.55).unwrap());
    assert_eq!(engine.required_stake(100), 55);
    let stakes = equal_stakes(4, 25);
    let mut records = vec![verified(0, 0xa), verified(1, 0xa)];
    records.push(verified(2, 0xa));
    let outcome = engine.reach_consensus(slot().as_str(), records, &stakes, 100).unwrap();
    assert_eq!(outcome.required, 55);

    let seven = ConsensusEngine::new(StakeRatio::from_f64(0.07).unwrap());
    let small: HashMap<u64, u64> = [(0, 7), (1, 93)].into_iter().collect();
    let outcome = seven
        .reach_consensus(slot().as_str(), vec![verified(0, 0xc)], &small, 100)
        .expect("stake 7 meets 7% of 100");
    assert_eq!(outcome.stake, 7);
}
