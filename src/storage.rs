// src/storage.rs
// RocksDB-backed entity store

use crate::domain::{StreamFile, StreamType};
use crate::error::{ImporterError, Result};
use crate::persist::entity::StreamFileRow;
use log::{info, warn};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

pub const CF_STREAM_FILE: &str = "stream_file";
pub const CF_TRANSACTION: &str = "transaction";
pub const CF_SIDECAR_RECORD: &str = "sidecar_record";
pub const CF_ACCOUNT_BALANCE: &str = "account_balance";
pub const CF_NODE: &str = "node";

const FIXED_FAMILIES: [&str; 5] = [
    CF_STREAM_FILE,
    CF_TRANSACTION,
    CF_SIDECAR_RECORD,
    CF_ACCOUNT_BALANCE,
    CF_NODE,
];

/// Column family of transaction hash shard `shard`.
pub fn transaction_hash_family(shard: usize) -> String {
    format!("transaction_hash_{:02}", shard)
}

/// Handle to the importer database with every column family the importer writes.
pub struct EntityStore {
    db: DB,
    shard_count: usize,
}

impl EntityStore {
    /// Open (or create) the store, retrying with backoff while another process
    /// still holds the lock.
    pub fn open(path: &Path, shard_count: usize) -> Result<Arc<Self>> {
        let mut attempt = 0u32;
        let max_attempts = 8u32;
        let mut wait = 250u64;

        loop {
            match open_internal(path, shard_count) {
                Ok(db) => {
                    info!("Opened entity store at {} ({} hash shards)", path.display(), shard_count);
                    return Ok(Arc::new(Self { db, shard_count }));
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        return Err(ImporterError::Storage(format!(
                            "failed to open RocksDB at '{}' after {} attempts: {}",
                            path.display(),
                            attempt,
                            e
                        )));
                    }
                    warn!(
                        "open attempt {}/{} failed: {}, retrying in {}ms",
                        attempt, max_attempts, e, wait
                    );
                    sleep(Duration::from_millis(wait));
                    wait = std::cmp::min(wait * 2, 2000);
                }
            }
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    pub fn db(&self) -> &DB {
        &self.db
    }

    pub fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| ImporterError::Storage(format!("column family '{}' not found", name)))
    }

    pub fn put_json<K: AsRef<[u8]>, V: Serialize>(&self, family: &str, key: K, val: &V) -> Result<()> {
        let bytes = serde_json::to_vec(val)?;
        self.db.put_cf(self.cf(family)?, key, bytes)?;
        Ok(())
    }

    pub fn delete<K: AsRef<[u8]>>(&self, family: &str, key: K) -> Result<()> {
        self.db.delete_cf(self.cf(family)?, key)?;
        Ok(())
    }

    /// Every value of a column family, in key order.
    pub fn values<T: DeserializeOwned>(&self, family: &str) -> Result<Vec<T>> {
        let mut out = Vec::new();
        for item in self.db.iterator_cf(self.cf(family)?, IteratorMode::Start) {
            let (_, v) = item?;
            out.push(serde_json::from_slice(&v)?);
        }
        Ok(out)
    }

    /// Number of keys in a column family.
    pub fn count(&self, family: &str) -> Result<usize> {
        let mut count = 0;
        for item in self.db.iterator_cf(self.cf(family)?, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

fn open_internal(path: &Path, shard_count: usize) -> std::result::Result<DB, rocksdb::Error> {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.create_missing_column_families(true);
    opts.increase_parallelism(num_cpus::get() as i32);
    opts.set_max_background_jobs(4);
    opts.set_write_buffer_size(64 * 1024 * 1024);
    opts.set_max_open_files(512);

    // keep families created by an earlier run with a larger shard count
    let mut families: BTreeSet<String> = DB::list_cf(&opts, path)
        .unwrap_or_default()
        .into_iter()
        .filter(|name| name != "default")
        .collect();
    families.extend(FIXED_FAMILIES.iter().map(|s| s.to_string()));
    families.extend((0..shard_count).map(transaction_hash_family));

    let descriptors = families
        .into_iter()
        .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
    DB::open_cf_descriptors(&opts, path, descriptors)
}

/// Durable record of accepted stream files, the restart point of each stream type.
pub struct StreamFileRepository {
    store: Arc<EntityStore>,
}

impl StreamFileRepository {
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self { store }
    }

    /// Most recent committed file of `stream_type`, if any.
    pub fn find_latest(&self, stream_type: StreamType) -> Result<Option<StreamFileRow>> {
        let cf = self.store.cf(CF_STREAM_FILE)?;
        let upper = [stream_type.tag() + 1];
        let iter = self
            .store
            .db()
            .iterator_cf(cf, IteratorMode::From(&upper, Direction::Reverse));
        for item in iter {
            let (k, v) = item?;
            if k.first() == Some(&(stream_type.tag() + 1)) {
                continue;
            }
            if k.first() != Some(&stream_type.tag()) {
                break;
            }
            return Ok(Some(serde_json::from_slice(&v)?));
        }
        Ok(None)
    }

    /// Summary of the latest committed file, usable as a continuity reference.
    pub fn latest_summary(&self, stream_type: StreamType) -> Result<Option<StreamFile>> {
        match self.find_latest(stream_type)? {
            Some(row) => row.to_summary().map(Some),
            None => Ok(None),
        }
    }

    pub fn find_all(&self, stream_type: StreamType) -> Result<Vec<StreamFileRow>> {
        let cf = self.store.cf(CF_STREAM_FILE)?;
        let prefix = [stream_type.tag()];
        let mut out = Vec::new();
        for item in self
            .store
            .db()
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (k, v) = item?;
            if k.first() != Some(&stream_type.tag()) {
                break;
            }
            out.push(serde_json::from_slice(&v)?);
        }
        Ok(out)
    }
}
