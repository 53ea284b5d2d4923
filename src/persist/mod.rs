// src/persist/mod.rs
// Bulk writers for decoded rows

pub mod entity;
pub mod sharded;

pub use entity::{
    AccountBalanceRow, Entity, NodeRow, ShardedEntity, SidecarRow, StreamFileRow, TransactionHashRow,
    TransactionRow, WriteMode,
};
pub use sharded::{RocksShardWriter, ShardWriter, ShardedBatchPersister};

use crate::error::{ImporterError, Result};
use crate::storage::EntityStore;
use log::debug;
use rocksdb::WriteBatch;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

/// Writes a homogeneous collection of rows in one call.
pub trait BatchPersister<T>: Send + Sync {
    fn persist(&self, items: &[T]) -> Result<()>;
}

/// Write `items` into `family` as one atomic RocksDB batch.
///
/// Insert-only rows whose key already exists (or repeats earlier in `items`)
/// are skipped, so replaying a batch after a failure does not duplicate rows.
/// Returns the number of rows written.
pub fn write_rows<T: Entity>(store: &EntityStore, family: &str, mode: WriteMode, items: &[T]) -> Result<usize> {
    if items.is_empty() {
        return Ok(0);
    }
    let cf = store.cf(family)?;
    let keys: Vec<Vec<u8>> = items.iter().map(Entity::key).collect();

    let existing: Vec<bool> = match mode {
        WriteMode::Upsert => vec![false; items.len()],
        WriteMode::InsertOnly => store
            .db()
            .multi_get_cf(keys.iter().map(|k| (cf, k.as_slice())))
            .into_iter()
            .map(|r| r.map(|v| v.is_some()))
            .collect::<std::result::Result<_, _>>()?,
    };

    let mut seen = HashSet::with_capacity(items.len());
    let mut batch = WriteBatch::default();
    let mut written = 0;
    for ((item, key), exists) in items.iter().zip(&keys).zip(existing) {
        if exists || (mode == WriteMode::InsertOnly && !seen.insert(key.as_slice())) {
            continue;
        }
        let value = serde_json::to_vec(item)?;
        batch.put_cf(cf, key, value);
        written += 1;
    }
    store
        .db()
        .write(batch)
        .map_err(|e| ImporterError::Persistence(format!("bulk write to {} failed: {}", family, e)))?;
    debug!("Wrote {} of {} row(s) to {}", written, items.len(), family);
    Ok(written)
}

/// Bulk persister over one column family, with the row type's write mode.
pub struct RocksBatchPersister<T> {
    store: Arc<EntityStore>,
    _rows: PhantomData<fn(&T)>,
}

impl<T: Entity> RocksBatchPersister<T> {
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self {
            store,
            _rows: PhantomData,
        }
    }
}

impl<T: Entity> BatchPersister<T> for RocksBatchPersister<T> {
    fn persist(&self, items: &[T]) -> Result<()> {
        write_rows(&self.store, T::TABLE, T::MODE, items).map(|_| ())
    }
}
