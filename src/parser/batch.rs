// src/parser/batch.rs
// Rows accumulated across stream files until the next flush

use crate::crypto::sha384;
use crate::domain::{StreamFile, StreamItems};
use crate::persist::{AccountBalanceRow, SidecarRow, StreamFileRow, TransactionHashRow, TransactionRow};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct RowBatch {
    pub transactions: Vec<TransactionRow>,
    pub transaction_hashes: Vec<TransactionHashRow>,
    pub sidecars: Vec<SidecarRow>,
    pub balances: Vec<AccountBalanceRow>,
    /// One row per file; written after every data row of the batch.
    pub stream_files: Vec<StreamFileRow>,
    files: Vec<StreamFile>,
    items: usize,
    bytes: usize,
    started: Option<Instant>,
}

impl RowBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert `file` into rows and append them.
    pub fn add(&mut self, file: &StreamFile) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
        let stream_file = file.name.to_string();

        match &file.items {
            StreamItems::Records(records) => {
                for item in records {
                    let record = &item.record;
                    let hash = if record.transaction_hash.is_empty() {
                        sha384(&item.transaction).as_bytes().to_vec()
                    } else {
                        record.transaction_hash.clone()
                    };
                    self.transactions.push(TransactionRow {
                        consensus_timestamp: record.consensus_timestamp,
                        payer_account_id: record.payer_account_id,
                        status: record.status,
                        transaction_fee: record.transaction_fee,
                        transaction_hash: hex::encode(&hash),
                        transaction_bytes: hex::encode(&item.transaction),
                        index: file.index.unwrap_or_default(),
                        stream_file: stream_file.clone(),
                    });
                    self.transaction_hashes.push(TransactionHashRow {
                        hash,
                        consensus_timestamp: record.consensus_timestamp,
                        payer_account_id: record.payer_account_id,
                    });
                }
            }
            StreamItems::Balances(balances) => {
                self.balances.extend(balances.iter().map(|b| AccountBalanceRow {
                    consensus_timestamp: file.consensus_end,
                    account_num: b.account_num,
                    balance: b.balance,
                }));
            }
        }

        for sidecar in &file.sidecars {
            for (position, record) in sidecar.records.iter().enumerate() {
                self.sidecars.push(SidecarRow {
                    consensus_timestamp: record.consensus_timestamp,
                    position: position as u32,
                    sidecar_id: sidecar.id,
                    kind: record.kind,
                    migration: record.migration,
                    payload: record.payload.clone(),
                });
            }
            self.bytes += sidecar.size;
        }

        self.stream_files.push(StreamFileRow::from_file(file));
        self.items += file.items.len();
        self.bytes += file.size;
        self.files.push(file.summary());
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn item_count(&self) -> usize {
        self.items
    }

    pub fn byte_count(&self) -> usize {
        self.bytes
    }

    pub fn age(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    pub fn files(&self) -> &[StreamFile] {
        &self.files
    }

    pub fn last_file(&self) -> Option<&StreamFile> {
        self.files.last()
    }
}
