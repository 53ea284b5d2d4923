// src/downloader/provider.rs
// Retrieval of stream files from per-node sources

use crate::domain::{ConsensusNode, FileKind, StreamFilename, StreamType};
use crate::error::{ImporterError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Where consensus nodes publish their stream files.
///
/// Any error is read as "node unavailable for this slot" by the downloader.
#[async_trait]
pub trait StreamFileProvider: Send + Sync {
    /// Signature file names of `stream_type` published by `node`, strictly after
    /// `after`, ordered by instant, at most `limit` of them.
    async fn list(
        &self,
        node: &ConsensusNode,
        stream_type: StreamType,
        after: Option<&StreamFilename>,
        limit: usize,
    ) -> Result<Vec<StreamFilename>>;

    /// Contents of `filename` as published by `node`; `None` if it does not exist.
    async fn get(&self, node: &ConsensusNode, filename: &StreamFilename) -> Result<Option<Bytes>>;
}

/// Serves files from `<root>/<stream dir>/<prefix>0.0.<account>/`.
#[derive(Clone, Debug)]
pub struct LocalStreamFileProvider {
    root: PathBuf,
}

impl LocalStreamFileProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn node_dir(&self, node: &ConsensusNode, stream_type: StreamType) -> PathBuf {
        self.root.join(stream_type.path()).join(format!(
            "{}{}",
            stream_type.node_prefix(),
            node.account_id()
        ))
    }
}

fn transport(node: &ConsensusNode, e: std::io::Error) -> ImporterError {
    ImporterError::Transport {
        node: node.node_id,
        reason: e.to_string(),
    }
}

#[async_trait]
impl StreamFileProvider for LocalStreamFileProvider {
    async fn list(
        &self,
        node: &ConsensusNode,
        stream_type: StreamType,
        after: Option<&StreamFilename>,
        limit: usize,
    ) -> Result<Vec<StreamFilename>> {
        let dir = self.node_dir(node, stream_type);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No directory {} for node {}", dir.display(), node.node_id);
                return Ok(Vec::new());
            }
            Err(e) => return Err(transport(node, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| transport(node, e))? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Ok(name) = StreamFilename::parse(file_name) else {
                continue;
            };
            if name.stream_type() != stream_type || name.kind() != FileKind::Signature {
                continue;
            }
            if after.map_or(true, |a| name.instant() > a.instant()) {
                names.push(name);
            }
        }
        names.sort();
        names.truncate(limit);
        Ok(names)
    }

    async fn get(&self, node: &ConsensusNode, filename: &StreamFilename) -> Result<Option<Bytes>> {
        let path = self
            .node_dir(node, filename.stream_type())
            .join(filename.as_str());
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(transport(node, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn node() -> ConsensusNode {
        ConsensusNode {
            node_id: 0,
            account_num: 3,
            public_key: None,
            stake: 1,
            total_stake: 1,
        }
    }

    #[tokio::test]
    async fn lists_signatures_after_a_name() {
        let dir = TempDir::new().unwrap();
        let provider = LocalStreamFileProvider::new(dir.path());
        let node_dir = provider.node_dir(&node(), StreamType::Record);
        std::fs::create_dir_all(&node_dir).unwrap();
        for instant in [3_000_000_000i64, 1_000_000_000, 2_000_000_000] {
            let sig = StreamFilename::new(StreamType::Record, instant, FileKind::Signature);
            std::fs::write(node_dir.join(sig.as_str()), b"x").unwrap();
            let data = sig.data_filename();
            std::fs::write(node_dir.join(data.as_str()), b"y").unwrap();
        }
        assert!(node_dir.ends_with("recordstreams/record0.0.3"));

        let after = StreamFilename::new(StreamType::Record, 1_000_000_000, FileKind::Data);
        let listed = provider
            .list(&node(), StreamType::Record, Some(&after), 10)
            .await
            .unwrap();
        let instants: Vec<i64> = listed.iter().map(|n| n.instant()).collect();
        assert_eq!(instants, vec![2_000_000_000, 3_000_000_000]);

        let got = provider.get(&node(), &listed[0].data_filename()).await.unwrap();
        assert_eq!(got.as_deref(), Some(&b"y"[..]));
    }

    #[tokio::test]
    async fn missing_node_directory_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let provider = LocalStreamFileProvider::new(dir.path());
        let listed = provider.list(&node(), StreamType::Balance, None, 10).await.unwrap();
        assert!(listed.is_empty());
        let missing = StreamFilename::new(StreamType::Balance, 1, FileKind::Data);
        assert!(provider.get(&node(), &missing).await.unwrap().is_none());
    }
}
