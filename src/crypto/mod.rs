// src/crypto/mod.rs
// Digests and node signature primitives

pub mod keys;

use crate::domain::{FileHash, NodePublicKey, SignatureType};
use ring::signature::{UnparsedPublicKey, RSA_PKCS1_2048_8192_SHA384};
use sha2::{Digest, Sha384};

/// SHA-384 of `data`.
pub fn sha384(data: &[u8]) -> FileHash {
    let digest = Sha384::digest(data);
    let mut out = [0u8; crate::domain::HASH_LENGTH];
    out.copy_from_slice(&digest);
    FileHash(out)
}

/// SHA-384 over several slices without concatenating them first.
pub fn sha384_parts(parts: &[&[u8]]) -> FileHash {
    let mut hasher = Sha384::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; crate::domain::HASH_LENGTH];
    out.copy_from_slice(&hasher.finalize());
    FileHash(out)
}

/// Next running hash: `SHA384(previous || SHA384(item))`.
pub fn next_running_hash(previous: &FileHash, item: &[u8]) -> FileHash {
    let item_hash = sha384(item);
    sha384_parts(&[previous.as_bytes(), item_hash.as_bytes()])
}

/// Verify `signature` over the raw `hash` bytes with the node's key.
/// The key type must match the signature type; anything else fails.
pub fn verify_hash_signature(
    signature_type: SignatureType,
    key: &NodePublicKey,
    hash: &FileHash,
    signature: &[u8],
) -> bool {
    if signature.is_empty() {
        return false;
    }
    match (signature_type, key) {
        (SignatureType::Sha384WithRsa, NodePublicKey::Rsa(der)) => {
            verify_rsa_sha384(der, hash.as_bytes(), signature)
        }
        (SignatureType::Ed25519, NodePublicKey::Ed25519(pk)) => {
            keys::verify_ed25519(pk, hash.as_bytes(), signature)
        }
        _ => false,
    }
}

/// SHA384withRSA (PKCS#1 v1.5) verification with a DER `RSAPublicKey`.
pub fn verify_rsa_sha384(public_key_der: &[u8], msg: &[u8], signature: &[u8]) -> bool {
    UnparsedPublicKey::new(&RSA_PKCS1_2048_8192_SHA384, public_key_der)
        .verify(msg, signature)
        .is_ok()
}
