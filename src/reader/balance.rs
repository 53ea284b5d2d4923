// src/reader/balance.rs
// Account balance snapshots: CSV (version 2) and protobuf

use super::proto;
use crate::crypto::sha384;
use crate::domain::{AccountBalance, StreamFile, StreamFilename, StreamItems, StreamType, Timestamp};
use crate::error::{ImporterError, Result};
use bytes::Bytes;
use chrono::DateTime;
use prost::Message;

const CSV_VERSION_PREFIX: &str = "# version:";
const CSV_TIMESTAMP_PREFIX: &str = "# timestamp:";
const CSV_HEADER: &str = "shardnum,realmnum,accountnum,balance";
const CSV_SUPPORTED_VERSION: u32 = 2;
const PROTO_VERSION: u32 = 1;

/// Decode a balance file, dispatching on its extension.
pub fn read_balance_file(filename: &StreamFilename, data: Bytes) -> Result<StreamFile> {
    let (version, timestamp, balances) = match filename.extension() {
        "csv" => {
            let (ts, balances) = read_csv(filename.as_str(), &data)?;
            (CSV_SUPPORTED_VERSION, ts, balances)
        }
        "pb" => {
            let (ts, balances) = read_proto(filename.as_str(), &data)?;
            (PROTO_VERSION, ts, balances)
        }
        other => {
            return Err(ImporterError::decode(
                filename.as_str(),
                None,
                format!("unsupported balance file extension '{}'", other),
            ))
        }
    };
    let timestamp = timestamp.unwrap_or_else(|| filename.instant());
    let hash = sha384(&data);

    Ok(StreamFile {
        stream_type: StreamType::Balance,
        name: filename.clone(),
        version,
        consensus_start: timestamp,
        consensus_end: timestamp,
        count: balances.len() as u64,
        file_hash: hash,
        hash,
        previous_hash: None,
        metadata_hash: None,
        index: None,
        node_id: None,
        size: data.len(),
        bytes: Some(data),
        items: StreamItems::Balances(balances),
        sidecar_refs: Vec::new(),
        sidecars: Vec::new(),
    })
}

fn read_csv(name: &str, data: &[u8]) -> Result<(Option<Timestamp>, Vec<AccountBalance>)> {
    let text = std::str::from_utf8(data)
        .map_err(|e| ImporterError::decode(name, None, format!("balance file is not UTF-8: {}", e)))?;
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    let version_line = lines
        .next()
        .ok_or_else(|| ImporterError::decode(name, None, "empty balance file"))?;
    let version = version_line
        .to_lowercase()
        .strip_prefix(CSV_VERSION_PREFIX)
        .and_then(|v| v.trim().parse::<u32>().ok())
        .ok_or_else(|| ImporterError::decode(name, None, format!("invalid version line '{}'", version_line)))?;
    if version != CSV_SUPPORTED_VERSION {
        return Err(ImporterError::decode(
            name,
            Some(version),
            format!("unsupported balance file version {}", version),
        ));
    }

    let err = |reason: String| ImporterError::decode(name, Some(version), reason);

    let ts_line = lines.next().ok_or_else(|| err("missing timestamp line".into()))?;
    let ts_value = ts_line
        .get(..CSV_TIMESTAMP_PREFIX.len())
        .filter(|p| p.eq_ignore_ascii_case(CSV_TIMESTAMP_PREFIX))
        .map(|_| ts_line[CSV_TIMESTAMP_PREFIX.len()..].trim())
        .ok_or_else(|| err(format!("invalid timestamp line '{}'", ts_line)))?;
    let timestamp = DateTime::parse_from_rfc3339(ts_value)
        .ok()
        .and_then(|dt| dt.timestamp_nanos_opt())
        .ok_or_else(|| err(format!("invalid timestamp '{}'", ts_value)))?;

    let header = lines.next().ok_or_else(|| err("missing header row".into()))?;
    if header.replace(' ', "").to_lowercase() != CSV_HEADER {
        return Err(err(format!("unexpected header row '{}'", header)));
    }

    let mut balances = Vec::new();
    for (row, line) in lines.enumerate() {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(err(format!("row {} has {} fields, expected 4", row + 1, fields.len())));
        }
        let account_num = fields[2]
            .parse::<u64>()
            .map_err(|e| err(format!("row {} invalid account number: {}", row + 1, e)))?;
        let balance = fields[3]
            .parse::<i64>()
            .map_err(|e| err(format!("row {} invalid balance: {}", row + 1, e)))?;
        balances.push(AccountBalance { account_num, balance });
    }
    Ok((Some(timestamp), balances))
}

fn read_proto(name: &str, data: &[u8]) -> Result<(Option<Timestamp>, Vec<AccountBalance>)> {
    let message = proto::AllAccountBalances::decode(data).map_err(|e| {
        ImporterError::decode(name, Some(PROTO_VERSION), format!("invalid balance message: {}", e))
    })?;
    let timestamp = (message.consensus_timestamp > 0).then_some(message.consensus_timestamp);
    let balances = message
        .all_accounts
        .into_iter()
        .map(|a| AccountBalance {
            account_num: a.account_id,
            balance: a.hbar_balance,
        })
        .collect();
    Ok((timestamp, balances))
}
