// src/error.rs
// Importer error taxonomy

use crate::domain::StreamType;
use thiserror::Error;

/// Result type alias using the importer's error type.
pub type Result<T> = std::result::Result<T, ImporterError>;

#[derive(Error, Debug)]
pub enum ImporterError {
    /// Malformed signature or data bytes. Fatal to that file, never guessed past.
    #[error("failed to decode {file} (version {version:?}): {reason}")]
    Decode {
        file: String,
        version: Option<u32>,
        reason: String,
    },

    /// Not enough stake agreed on a single file hash. Retried on the next cycle.
    #[error(
        "consensus not reached for {filename}: best group has {best_count} signature(s) \
         with stake {best_stake}, {required} of {total_stake} required"
    )]
    Consensus {
        filename: String,
        best_stake: u64,
        best_count: usize,
        required: u64,
        total_stake: u64,
    },

    /// Declared previous hash does not continue the chain.
    #[error("{stream_type} hash mismatch for {filename}: expected previous hash {expected}, got {actual}")]
    HashMismatch {
        stream_type: StreamType,
        filename: String,
        expected: String,
        actual: String,
    },

    /// Declared index does not follow the last accepted index.
    #[error("{stream_type} index mismatch for {filename}: expected {expected}, got {actual}")]
    IndexMismatch {
        stream_type: StreamType,
        filename: String,
        expected: i64,
        actual: i64,
    },

    #[error("sidecar {filename} hash mismatch: declared {expected}, actual {actual}")]
    SidecarHashMismatch {
        filename: String,
        expected: String,
        actual: String,
    },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("persistence timed out after {waited_ms}ms with {pending_shards} shard(s) outstanding")]
    PersistenceTimeout { waited_ms: u64, pending_shards: usize },

    /// Retrieval failure for one node. Treated as "node unavailable for this slot".
    #[error("node {node} unavailable: {reason}")]
    Transport { node: u64, reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ImporterError {
    pub fn decode(file: impl Into<String>, version: Option<u32>, reason: impl Into<String>) -> Self {
        ImporterError::Decode {
            file: file.into(),
            version,
            reason: reason.into(),
        }
    }

    /// Data-integrity faults that must halt the stream type until an operator intervenes.
    /// Retrying them with unchanged inputs reproduces the same fault.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ImporterError::HashMismatch { .. } | ImporterError::IndexMismatch { .. }
        )
    }

    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }
}

impl From<rocksdb::Error> for ImporterError {
    fn from(e: rocksdb::Error) -> Self {
        ImporterError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ImporterError {
    fn from(e: serde_json::Error) -> Self {
        ImporterError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_chain_faults_are_fatal() {
        let mismatch = ImporterError::HashMismatch {
            stream_type: StreamType::Record,
            filename: "a.rcd".into(),
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert!(mismatch.is_fatal());

        let consensus = ImporterError::Consensus {
            filename: "a.rcd".into(),
            best_stake: 10,
            best_count: 1,
            required: 34,
            total_stake: 100,
        };
        assert!(consensus.is_recoverable());
        assert!(ImporterError::decode("a.rcd_sig", Some(5), "truncated").is_recoverable());
        assert!(ImporterError::Persistence("shard 3 failed".into()).is_recoverable());
    }
}
