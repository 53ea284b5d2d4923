// src/signature/verifier.rs
use crate::crypto::verify_hash_signature;
use crate::domain::{ConsensusNode, SignatureRecord, SignatureStatus};
use log::warn;

/// Check one node's signature record against that node's key.
///
/// Pure: returns a new record that is `Verified` only if the file hash signature
/// verifies and, when the record carries one, the metadata hash signature does too.
/// Every other outcome is `Rejected`.
pub fn verify_signature(record: &SignatureRecord, node: Option<&ConsensusNode>) -> SignatureRecord {
    match check(record, node) {
        Ok(()) => record.with_status(SignatureStatus::Verified),
        Err(reason) => {
            warn!(
                "Rejected signature of node {} for {}: {}",
                record.node_id, record.filename, reason
            );
            record.with_status(SignatureStatus::Rejected)
        }
    }
}

fn check(record: &SignatureRecord, node: Option<&ConsensusNode>) -> Result<(), &'static str> {
    if record.status != SignatureStatus::Unverified {
        return Err("record already processed");
    }
    let node = node.ok_or("unknown node")?;
    if node.node_id != record.node_id {
        return Err("node does not own the record");
    }
    let key = node.public_key.as_ref().ok_or("missing public key")?;
    if record.file_hash_signature.is_empty() {
        return Err("missing file hash signature");
    }
    if !verify_hash_signature(
        record.signature_type,
        key,
        &record.file_hash,
        &record.file_hash_signature,
    ) {
        return Err("file hash signature does not verify");
    }

    match (&record.metadata_hash, &record.metadata_hash_signature) {
        (None, None) => Ok(()),
        (Some(hash), Some(signature)) => {
            if verify_hash_signature(record.signature_type, key, hash, signature) {
                Ok(())
            } else {
                Err("metadata hash signature does not verify")
            }
        }
        _ => Err("metadata hash and signature must both be present"),
    }
}
