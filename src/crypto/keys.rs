// src/crypto/keys.rs
use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use ed25519_dalek::{Signer, Verifier};

/// Verify an Ed25519 signature over `msg` using a 32-byte `pubkey`.
/// Returns `true` if the signature verifies.
pub fn verify_ed25519(pubkey: &[u8], msg: &[u8], sig_bytes: &[u8]) -> bool {
    let vk = match <&[u8; 32]>::try_from(pubkey) {
        Ok(pubkey_array) => match VerifyingKey::from_bytes(pubkey_array) {
            Ok(v) => v,
            Err(_) => return false,
        },
        Err(_) => return false,
    };

    let sig = match <&[u8; 64]>::try_from(sig_bytes) {
        Ok(sig_array) => Signature::from_bytes(sig_array),
        Err(_) => return false,
    };

    vk.verify(msg, &sig).is_ok()
}

/// Sign `msg` with a 32-byte Ed25519 secret seed. Returns None for invalid seed length.
pub fn sign_ed25519(secret_seed: &[u8], msg: &[u8]) -> Option<Vec<u8>> {
    let seed_array = <&[u8; 32]>::try_from(secret_seed).ok()?;
    let sk = SigningKey::from_bytes(seed_array);
    let sig: Signature = sk.sign(msg);
    Some(sig.to_bytes().to_vec())
}

/// Derive the Ed25519 verifying key bytes from a 32-byte seed.
pub fn public_from_seed(seed: &[u8]) -> Option<Vec<u8>> {
    let seed_array = <&[u8; 32]>::try_from(seed).ok()?;
    let sk = SigningKey::from_bytes(seed_array);
    Some(sk.verifying_key().to_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify() {
        let seed = [42u8; 32];
        let pubkey = public_from_seed(&seed).expect("derive pubkey");
        let msg = [9u8; 48];
        let sig = sign_ed25519(&seed, &msg).expect("sign");
        assert_eq!(sig.len(), 64);
        assert!(verify_ed25519(&pubkey, &msg, &sig));
        assert!(!verify_ed25519(&pubkey, &[8u8; 48], &sig));
        assert!(!verify_ed25519(&[1u8; 31], &msg, &sig));
        assert!(sign_ed25519(&[1u8; 31], &msg).is_none());
    }
}
