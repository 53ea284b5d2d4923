// tests/signature_files.rs
mod common;

use common::{signature_v2, signature_v5, signature_v5_typed, signature_v6, TestNode};
use mirror_importer::crypto::sha384;
use mirror_importer::domain::{
    FileHash, FileKind, SignatureStatus, SignatureType, StreamFilename, StreamType,
};
use mirror_importer::error::ImporterError;
use mirror_importer::reader::read_signature_file;
use mirror_importer::signature::verify_signature;

fn sig_name() -> StreamFilename {
    StreamFilename::new(StreamType::Record, common::instant(0), FileKind::Signature)
}

const FILE_HASH: FileHash = FileHash([0xab; 48]);
const METADATA_HASH: FileHash = FileHash([0xcd; 48]);

#[test]
fn v2_fixture_decodes_to_fixed_hash() {
    let data = signature_v2(&FILE_HASH, &[0x5a; 384]);
    let record = read_signature_file(&sig_name(), 4, &data).expect("decode v2");
    assert_eq!(record.version, 2);
    assert_eq!(record.file_hash, FILE_HASH);
    assert_eq!(record.file_hash_signature.len(), 384);
    assert_eq!(record.signature_type, SignatureType::Sha384WithRsa);
    assert_eq!(record.metadata_hash, None);
    assert_eq!(record.node_id, 4);
    assert_eq!(record.status, SignatureStatus::Unverified);
}

#[test]
fn v5_fixture_decodes_to_fixed_hashes() {
    let data = signature_v5(2, &FILE_HASH, &[1u8; 64], &METADATA_HASH, &[2u8; 64]);
    let record = read_signature_file(&sig_name(), 0, &data).expect("decode v5");
    assert_eq!(record.version, 5);
    assert_eq!(record.signature_type, SignatureType::Ed25519);
    assert_eq!(record.file_hash, FILE_HASH);
    assert_eq!(record.file_hash_signature, vec![1u8; 64]);
    assert_eq!(record.metadata_hash, Some(METADATA_HASH));
    assert_eq!(record.metadata_hash_signature.map(|s| s.len()), Some(64));
}

#[test]
fn v6_fixture_decodes_to_fixed_hashes() {
    let data = signature_v6(0, &FILE_HASH, &[3u8; 384], &METADATA_HASH, &[4u8; 384]);
    let record = read_signature_file(&sig_name(), 1, &data).expect("decode v6");
    assert_eq!(record.version, 6);
    assert_eq!(record.signature_type, SignatureType::Sha384WithRsa);
    assert_eq!(record.file_hash, FILE_HASH);
    assert_eq!(record.file_hash_signature.len(), 384);
    assert_eq!(record.metadata_hash, Some(METADATA_HASH));
}

#[test]
fn v2_malformed_signature_delimiter_is_a_decode_error() {
    let mut data = signature_v2(&FILE_HASH, &[0x5a; 384]);
    // byte 0 is the hash delimiter, then 48 hash bytes, then the signature delimiter
    data[49] = 0x07;
    match read_signature_file(&sig_name(), 0, &data) {
        Err(ImporterError::Decode { file, version, reason }) => {
            assert_eq!(file, sig_name().as_str());
            assert_eq!(version, Some(2));
            assert!(reason.contains("signature delimiter"), "{}", reason);
        }
        other => panic!("expected decode error, got {:?}", other),
    }
}

#[test]
fn v2_truncated_signature_is_a_decode_error() {
    let mut data = signature_v2(&FILE_HASH, &[0x5a; 384]);
    data.truncate(data.len() - 1);
    assert!(matches!(
        read_signature_file(&sig_name(), 0, &data),
        Err(ImporterError::Decode { .. })
    ));
}

#[test]
fn v5_checksum_mismatch_is_a_decode_error() {
    let mut data = signature_v5(2, &FILE_HASH, &[1u8; 64], &METADATA_HASH, &[2u8; 64]);
    // marker + stream version + hash object + class id/version/type/length
    let checksum_at = 1 + 4 + 68 + 8 + 4 + 4 + 4;
    data[checksum_at + 3] ^= 0xff;
    let err = read_signature_file(&sig_name(), 0, &data).unwrap_err();
    assert!(err.to_string().contains("checksum"), "{}", err);
}

#[test]
fn v5_trailing_bytes_are_rejected() {
    let mut data = signature_v5(2, &FILE_HASH, &[1u8; 64], &METADATA_HASH, &[2u8; 64]);
    data.push(0);
    assert!(read_signature_file(&sig_name(), 0, &data).is_err());
}

#[test]
fn v5_signature_objects_must_share_a_type() {
    let data = signature_v5_typed(1, 2, &FILE_HASH, &[1u8; 64], &METADATA_HASH, &[2u8; 64]);
    let err = read_signature_file(&sig_name(), 0, &data).unwrap_err();
    assert!(matches!(err, ImporterError::Decode { version: Some(5), .. }), "{}", err);
    assert!(err.to_string().contains("differs"), "{}", err);

    let same = signature_v5_typed(2, 2, &FILE_HASH, &[1u8; 64], &METADATA_HASH, &[2u8; 64]);
    let record = read_signature_file(&sig_name(), 0, &same).expect("decode");
    assert_eq!(record.signature_type, SignatureType::Ed25519);
}

#[test]
fn v6_missing_file_signature_is_a_decode_error() {
    // a lone marker byte decodes to an empty message
    let err = read_signature_file(&sig_name(), 0, &[6u8]).unwrap_err();
    assert!(err.to_string().contains("missing file signature"), "{}", err);
}

#[test]
fn rsa_v2_signature_verifies_against_node_key() {
    let node = TestNode::rsa(0, 1, 1);
    let hash = sha384(b"record file");
    let data = node.signature_file(2, &hash, None);
    let record = read_signature_file(&sig_name(), 0, &data).expect("decode");
    assert_eq!(record.file_hash_signature.len(), 384);

    let verified = verify_signature(&record, Some(&node.node));
    assert_eq!(verified.status, SignatureStatus::Verified);
    // the input record is left untouched
    assert_eq!(record.status, SignatureStatus::Unverified);

    let other = TestNode::ed25519(0, 1, 1);
    assert_eq!(verify_signature(&record, Some(&other.node)).status, SignatureStatus::Rejected);
}

#[test]
fn ed25519_v6_signature_needs_both_hashes_signed() {
    let node = TestNode::ed25519(2, 1, 1);
    let file_hash = sha384(b"file");
    let metadata_hash = sha384(b"metadata");
    let good = node.signature_file(6, &file_hash, Some(&metadata_hash));
    let record = read_signature_file(&sig_name(), 2, &good).expect("decode");
    assert_eq!(verify_signature(&record, Some(&node.node)).status, SignatureStatus::Verified);

    // metadata signed over the wrong hash
    let forged = signature_v6(
        1,
        &file_hash,
        &node.sign(&file_hash),
        &metadata_hash,
        &node.sign(&file_hash),
    );
    let record = read_signature_file(&sig_name(), 2, &forged).expect("decode");
    assert_eq!(verify_signature(&record, Some(&node.node)).status, SignatureStatus::Rejected);
}
