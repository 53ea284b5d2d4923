// src/domain/node.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Public key a consensus node signs stream files with.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "key", rename_all = "snake_case")]
pub enum NodePublicKey {
    /// DER encoded `RSAPublicKey` (PKCS#1), hex in JSON.
    Rsa(#[serde(with = "hex_bytes")] Vec<u8>),
    /// Raw 32-byte Ed25519 verifying key, hex in JSON.
    Ed25519(#[serde(with = "hex_bytes")] Vec<u8>),
}

impl fmt::Debug for NodePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodePublicKey::Rsa(k) => write!(f, "Rsa({} bytes)", k.len()),
            NodePublicKey::Ed25519(k) => write!(f, "Ed25519({})", hex::encode(k)),
        }
    }
}

/// Per-epoch view of one consensus node. Read-only to the importer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusNode {
    pub node_id: u64,
    /// Account number of the node, used in bucket paths (`0.0.<account>`).
    pub account_num: u64,
    pub public_key: Option<NodePublicKey>,
    pub stake: u64,
    /// Total network stake of the epoch this entry belongs to.
    pub total_stake: u64,
}

impl ConsensusNode {
    pub fn account_id(&self) -> String {
        format!("0.0.{}", self.account_num)
    }
}

mod hex_bytes {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(de::Error::custom)
    }
}
