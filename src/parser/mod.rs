// src/parser/mod.rs
// Ordered consumption of accepted stream files into persisted batches

pub mod batch;

pub use batch::RowBatch;

use crate::config::{ParserConfig, PersistConfig};
use crate::domain::{StreamFile, StreamType};
use crate::downloader::check_continuity;
use crate::error::{ImporterError, Result};
use crate::listener::{BatchEndListener, StreamFileListener};
use crate::persist::{
    AccountBalanceRow, BatchPersister, RocksBatchPersister, RocksShardWriter, ShardedBatchPersister,
    SidecarRow, StreamFileRow, TransactionHashRow, TransactionRow,
};
use crate::storage::EntityStore;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Flush thresholds; whichever is reached first ends the batch.
#[derive(Clone, Debug)]
pub struct ParserProperties {
    pub max_batch_items: usize,
    pub max_batch_files: usize,
    pub max_batch_bytes: usize,
    pub max_batch_window: Duration,
}

impl From<&ParserConfig> for ParserProperties {
    fn from(config: &ParserConfig) -> Self {
        Self {
            max_batch_items: config.max_batch_items,
            max_batch_files: config.max_batch_files,
            max_batch_bytes: config.max_batch_bytes,
            max_batch_window: config.max_batch_window(),
        }
    }
}

/// Durable destination of a whole batch.
pub trait BatchSink: Send + Sync {
    fn write_batch(&self, batch: &RowBatch) -> Result<()>;
}

/// Writes a batch into the entity store: data rows first, stream file rows last.
pub struct EntityWriter {
    transactions: RocksBatchPersister<TransactionRow>,
    transaction_hashes: ShardedBatchPersister<TransactionHashRow>,
    sidecars: RocksBatchPersister<SidecarRow>,
    balances: RocksBatchPersister<AccountBalanceRow>,
    stream_files: RocksBatchPersister<StreamFileRow>,
}

impl EntityWriter {
    pub fn new(store: Arc<EntityStore>, persist: &PersistConfig) -> Result<Self> {
        let shard_writer = Arc::new(RocksShardWriter::<TransactionHashRow>::new(store.clone()));
        Ok(Self {
            transactions: RocksBatchPersister::new(store.clone()),
            transaction_hashes: ShardedBatchPersister::new(
                shard_writer,
                store.shard_count(),
                persist.shard_workers,
                persist.shard_wait_timeout(),
            )?,
            sidecars: RocksBatchPersister::new(store.clone()),
            balances: RocksBatchPersister::new(store.clone()),
            stream_files: RocksBatchPersister::new(store),
        })
    }
}

impl BatchSink for EntityWriter {
    fn write_batch(&self, batch: &RowBatch) -> Result<()> {
        self.transactions.persist(&batch.transactions)?;
        self.transaction_hashes.persist(&batch.transaction_hashes)?;
        self.sidecars.persist(&batch.sidecars)?;
        self.balances.persist(&batch.balances)?;
        self.stream_files.persist(&batch.stream_files)
    }
}

struct ParserState {
    batch: RowBatch,
    last_seen: Option<StreamFile>,
    last_committed: Option<StreamFile>,
}

/// Consumes accepted files of one stream type strictly in order.
pub struct StreamParser {
    stream_type: StreamType,
    props: ParserProperties,
    sink: Arc<dyn BatchSink>,
    listeners: Vec<Arc<dyn BatchEndListener>>,
    state: Mutex<ParserState>,
}

impl StreamParser {
    pub fn new(stream_type: StreamType, props: ParserProperties, sink: Arc<dyn BatchSink>) -> Self {
        Self {
            stream_type,
            props,
            sink,
            listeners: Vec::new(),
            state: Mutex::new(ParserState {
                batch: RowBatch::new(),
                last_seen: None,
                last_committed: None,
            }),
        }
    }

    pub fn add_batch_end_listener(&mut self, listener: Arc<dyn BatchEndListener>) {
        self.listeners.push(listener);
    }

    /// Start over from `last`, the last durably committed file. Any pending
    /// batch is discarded.
    pub fn reset(&self, last: Option<&StreamFile>) {
        let mut state = self.state.lock();
        state.batch = RowBatch::new();
        state.last_seen = last.map(StreamFile::summary);
        state.last_committed = state.last_seen.clone();
    }

    pub fn last_seen(&self) -> Option<StreamFile> {
        self.state.lock().last_seen.clone()
    }

    pub fn last_committed(&self) -> Option<StreamFile> {
        self.state.lock().last_committed.clone()
    }

    pub fn pending_files(&self) -> usize {
        self.state.lock().batch.file_count()
    }

    /// Add one accepted file to the current batch, flushing when a threshold is hit.
    pub fn parse(&self, file: &StreamFile) -> Result<()> {
        if file.stream_type != self.stream_type {
            return Err(ImporterError::decode(
                file.name.as_str(),
                Some(file.version),
                format!("{} parser received a {} file", self.stream_type, file.stream_type),
            ));
        }

        let mut state = self.state.lock();
        if let Some(last) = &state.last_seen {
            if file.name <= last.name {
                warn!("Skipping {}: already processed up to {}", file.name, last.name);
                return Ok(());
            }
        }
        if let Err(e) = check_continuity(state.last_seen.as_ref(), file) {
            self.abandon(&mut state);
            return Err(e);
        }

        state.batch.add(file);
        state.last_seen = Some(file.summary());
        debug!(
            "Queued {} ({} item(s)); batch holds {} file(s), {} item(s), {} byte(s)",
            file.name,
            file.count,
            state.batch.file_count(),
            state.batch.item_count(),
            state.batch.byte_count()
        );

        if self.is_full(&state.batch) {
            self.flush_locked(&mut state)?;
        }
        Ok(())
    }

    /// Flush a non-empty batch whose time window has elapsed.
    pub fn flush_if_due(&self) -> Result<bool> {
        let mut state = self.state.lock();
        if state.batch.is_empty() || state.batch.age() < self.props.max_batch_window {
            return Ok(false);
        }
        self.flush_locked(&mut state).map(|_| true)
    }

    /// Flush whatever is pending.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.batch.is_empty() {
            return Ok(());
        }
        self.flush_locked(&mut state)
    }

    fn is_full(&self, batch: &RowBatch) -> bool {
        batch.item_count() >= self.props.max_batch_items
            || batch.file_count() >= self.props.max_batch_files
            || batch.byte_count() >= self.props.max_batch_bytes
            || batch.age() >= self.props.max_batch_window
    }

    fn flush_locked(&self, state: &mut ParserState) -> Result<()> {
        let batch = std::mem::take(&mut state.batch);
        if let Err(e) = self.sink.write_batch(&batch) {
            warn!(
                "Abandoning {} batch of {} file(s): {}",
                self.stream_type,
                batch.file_count(),
                e
            );
            self.abandon(state);
            return Err(e);
        }

        let Some(last) = batch.last_file() else {
            return Ok(());
        };
        info!(
            "Committed {} batch: {} file(s), {} item(s), up to {}",
            self.stream_type,
            batch.file_count(),
            batch.item_count(),
            last.name
        );
        state.last_committed = Some(last.clone());
        for listener in &self.listeners {
            listener.on_batch_end(last);
        }
        Ok(())
    }

    fn abandon(&self, state: &mut ParserState) {
        state.batch = RowBatch::new();
        state.last_seen = state.last_committed.clone();
    }
}

impl StreamFileListener for StreamParser {
    fn on_accepted(&self, file: &StreamFile) -> Result<()> {
        self.parse(file)
    }
}
