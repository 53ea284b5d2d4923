// src/domain/signature.rs
use crate::domain::{FileHash, StreamFilename};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureType {
    Sha384WithRsa,
    Ed25519,
}

impl SignatureType {
    /// Signature type id used by the binary signature object.
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(SignatureType::Sha384WithRsa),
            2 => Some(SignatureType::Ed25519),
            _ => None,
        }
    }
}

/// Verification progress of one node's attestation.
///
/// `Unverified -> Verified -> ConsensusReached`, or terminal `Rejected`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureStatus {
    Unverified,
    Verified,
    ConsensusReached,
    Rejected,
}

/// One node's signature file for one stream file.
///
/// Values are never mutated in place: a status change produces a new record via
/// [`SignatureRecord::with_status`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureRecord {
    pub filename: StreamFilename,
    pub version: u32,
    pub signature_type: SignatureType,
    pub file_hash: FileHash,
    pub file_hash_signature: Vec<u8>,
    pub metadata_hash: Option<FileHash>,
    pub metadata_hash_signature: Option<Vec<u8>>,
    pub node_id: u64,
    pub status: SignatureStatus,
}

impl SignatureRecord {
    pub fn with_status(&self, status: SignatureStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub fn is_verified(&self) -> bool {
        self.status == SignatureStatus::Verified
    }
}
