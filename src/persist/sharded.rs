// src/persist/sharded.rs
// Parallel persistence of high-volume rows partitioned into fixed shards

use super::{write_rows, BatchPersister, ShardedEntity};
use crate::error::{ImporterError, Result};
use crate::storage::{transaction_hash_family, EntityStore};
use log::{debug, error};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::marker::PhantomData;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Destination of one shard's rows.
pub trait ShardWriter<T>: Send + Sync + 'static {
    fn write_shard(&self, shard: usize, items: &[T]) -> Result<()>;
}

/// Writes shard `i` into the `transaction_hash_{i:02}` column family.
pub struct RocksShardWriter<T> {
    store: Arc<EntityStore>,
    _rows: PhantomData<fn(&T)>,
}

impl<T> RocksShardWriter<T> {
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self {
            store,
            _rows: PhantomData,
        }
    }
}

impl<T: ShardedEntity> ShardWriter<T> for RocksShardWriter<T> {
    fn write_shard(&self, shard: usize, items: &[T]) -> Result<()> {
        write_rows(&self.store, &transaction_hash_family(shard), T::MODE, items).map(|_| ())
    }
}

/// Partitions rows by `shard_byte() % shard_count` and writes every non-empty
/// shard concurrently on a dedicated pool.
///
/// The call waits for all shards under one deadline. A failed shard does not
/// cancel the others: shards already running complete and stay written, and the
/// first failure is returned for the whole call. Each shard's buffer is owned by
/// its task and released only once that shard's write has returned.
pub struct ShardedBatchPersister<T> {
    writer: Arc<dyn ShardWriter<T>>,
    shard_count: usize,
    wait_timeout: Duration,
    pool: ThreadPool,
}

impl<T: ShardedEntity> ShardedBatchPersister<T> {
    pub fn new(
        writer: Arc<dyn ShardWriter<T>>,
        shard_count: usize,
        workers: usize,
        wait_timeout: Duration,
    ) -> Result<Self> {
        if shard_count == 0 {
            return Err(ImporterError::Config("shard count must be at least 1".into()));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("shard-persist-{}", i))
            .build()
            .map_err(|e| ImporterError::Persistence(format!("failed to start shard pool: {}", e)))?;
        Ok(Self {
            writer,
            shard_count,
            wait_timeout,
            pool,
        })
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    fn partition(&self, items: &[T]) -> Vec<Vec<T>> {
        let mut shards: Vec<Vec<T>> = (0..self.shard_count).map(|_| Vec::new()).collect();
        for item in items {
            shards[item.shard(self.shard_count)].push(item.clone());
        }
        shards
    }
}

impl<T: ShardedEntity> BatchPersister<T> for ShardedBatchPersister<T> {
    fn persist(&self, items: &[T]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let started = Instant::now();
        let deadline = started + self.wait_timeout;
        let (tx, rx) = mpsc::channel::<(usize, Result<()>)>();

        let mut pending = 0usize;
        for (shard, buffer) in self.partition(items).into_iter().enumerate() {
            if buffer.is_empty() {
                continue;
            }
            pending += 1;
            let writer = Arc::clone(&self.writer);
            let tx = tx.clone();
            self.pool.spawn(move || {
                let result = writer.write_shard(shard, &buffer);
                drop(buffer);
                // receiver gone means the caller already timed out
                let _ = tx.send((shard, result));
            });
        }
        drop(tx);

        let mut first_error: Option<ImporterError> = None;
        while pending > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((shard, Ok(()))) => {
                    pending -= 1;
                    debug!("Shard {} persisted", shard);
                }
                Ok((shard, Err(e))) => {
                    pending -= 1;
                    error!("Shard {} failed to persist: {}", shard, e);
                    if first_error.is_none() {
                        first_error = Some(ImporterError::Persistence(format!("shard {} failed: {}", shard, e)));
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    return Err(ImporterError::PersistenceTimeout {
                        waited_ms: started.elapsed().as_millis() as u64,
                        pending_shards: pending,
                    });
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(ImporterError::Persistence(format!(
                        "{} shard task(s) ended without reporting",
                        pending
                    )));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
