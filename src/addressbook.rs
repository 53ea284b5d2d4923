// src/addressbook.rs
// Consensus node set with stake, optionally persisted

use crate::domain::ConsensusNode;
use crate::error::{ImporterError, Result};
use crate::persist::{Entity, NodeRow};
use crate::storage::EntityStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Source of the current consensus node set.
pub trait NodeRegistry: Send + Sync {
    /// Nodes of the current epoch, sorted by node id.
    fn nodes(&self) -> Vec<ConsensusNode>;
}

/// Thread-safe address book with stake tracking and persistence
#[derive(Clone, Default)]
pub struct AddressBook {
    inner: Arc<RwLock<HashMap<u64, ConsensusNode>>>,
    store: Option<Arc<EntityStore>>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an address book backed by the `node` column family and load
    /// whatever it already holds.
    pub fn with_store(store: Arc<EntityStore>) -> Result<Self> {
        let book = Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            store: Some(store),
        };
        book.load_from_store()?;
        Ok(book)
    }

    fn load_from_store(&self) -> Result<()> {
        if let Some(store) = &self.store {
            let rows: Vec<NodeRow> = store.values(NodeRow::TABLE)?;
            let mut inner = self.inner.write();
            for NodeRow(node) in rows {
                inner.insert(node.node_id, node);
            }
            log::info!("Loaded {} consensus node(s) from store", inner.len());
        }
        Ok(())
    }

    /// Register every node listed in a JSON array file.
    pub fn load_json_file(&self, path: &Path) -> Result<usize> {
        let json = std::fs::read_to_string(path)?;
        let nodes: Vec<ConsensusNode> = serde_json::from_str(&json).map_err(|e| {
            ImporterError::Config(format!("invalid address book {}: {}", path.display(), e))
        })?;
        let count = nodes.len();
        for node in nodes {
            self.register(node)?;
        }
        log::info!("Loaded {} consensus node(s) from {}", count, path.display());
        Ok(count)
    }

    /// Register or replace a node.
    pub fn register(&self, node: ConsensusNode) -> Result<()> {
        if let Some(store) = &self.store {
            let row = NodeRow(node.clone());
            store.put_json(NodeRow::TABLE, row.key(), &row)?;
        }
        self.inner.write().insert(node.node_id, node);
        Ok(())
    }

    pub fn remove(&self, node_id: u64) -> Result<()> {
        self.inner.write().remove(&node_id);
        if let Some(store) = &self.store {
            store.delete(NodeRow::TABLE, node_id.to_be_bytes())?;
        }
        Ok(())
    }

    pub fn get(&self, node_id: u64) -> Option<ConsensusNode> {
        self.inner.read().get(&node_id).cloned()
    }

    /// Sum of the stake of all registered nodes
    pub fn total_stake(&self) -> u64 {
        self.inner
            .read()
            .values()
            .fold(0u64, |sum, n| sum.saturating_add(n.stake))
    }

    pub fn count(&self) -> usize {
        self.inner.read().len()
    }
}

impl NodeRegistry for AddressBook {
    fn nodes(&self) -> Vec<ConsensusNode> {
        let mut nodes: Vec<ConsensusNode> = self.inner.read().values().cloned().collect();
        nodes.sort_by_key(|n| n.node_id);
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodePublicKey;
    use tempfile::TempDir;

    fn node(id: u64, stake: u64) -> ConsensusNode {
        ConsensusNode {
            node_id: id,
            account_num: id + 3,
            public_key: Some(NodePublicKey::Ed25519(vec![id as u8; 32])),
            stake,
            total_stake: 0,
        }
    }

    #[test]
    fn nodes_are_sorted_and_stake_summed() {
        let book = AddressBook::new();
        book.register(node(2, 10)).unwrap();
        book.register(node(0, 5)).unwrap();
        assert_eq!(book.nodes().iter().map(|n| n.node_id).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(book.total_stake(), 15);
        // re-registering replaces the entry
        book.register(node(0, 7)).unwrap();
        assert_eq!(book.total_stake(), 17);
        assert_eq!(book.count(), 2);
    }

    #[test]
    fn persisted_nodes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = EntityStore::open(dir.path(), 1).unwrap();
            let book = AddressBook::with_store(store).unwrap();
            book.register(node(1, 25)).unwrap();
            book.register(node(4, 25)).unwrap();
            book.remove(4).unwrap();
        }
        let store = EntityStore::open(dir.path(), 1).unwrap();
        let book = AddressBook::with_store(store).unwrap();
        assert_eq!(book.count(), 1);
        assert_eq!(book.get(1), Some(node(1, 25)));
    }

    #[test]
    fn json_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("book.json");
        std::fs::write(&path, serde_json::to_string(&vec![node(0, 1), node(1, 1)]).unwrap()).unwrap();
        let book = AddressBook::new();
        assert_eq!(book.load_json_file(&path).unwrap(), 2);
        assert_eq!(book.get(1).unwrap().account_id(), "0.0.4");
    }
}
