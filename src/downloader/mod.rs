// src/downloader/mod.rs
// Per-slot retrieval, verification, selection and continuity of stream files

pub mod provider;

pub use provider::{LocalStreamFileProvider, StreamFileProvider};

use crate::addressbook::NodeRegistry;
use crate::config::DownloaderConfig;
use crate::domain::{ConsensusNode, SidecarFile, StreamFile, StreamFilename, StreamType};
use crate::error::{ImporterError, Result};
use crate::listener::StreamFileListener;
use crate::reader::{read_sidecar_file, read_signature_file, read_stream_file};
use crate::signature::{ConsensusOutcome, NodeSignatureVerifier};
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Progress of the slot currently being resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Awaiting,
    Fetching,
    Verifying,
    ContinuityCheck,
    Accepted,
    Failed,
}

#[derive(Clone, Debug)]
pub struct DownloaderProperties {
    pub stream_type: StreamType,
    pub max_concurrency: usize,
    pub timeout: Duration,
    pub max_slots_per_cycle: usize,
    pub max_slot_candidates: usize,
}

impl DownloaderProperties {
    pub fn new(stream_type: StreamType, config: &DownloaderConfig) -> Self {
        Self {
            stream_type,
            max_concurrency: config.max_concurrency.max(1),
            timeout: config.timeout(),
            max_slots_per_cycle: config.max_slots_per_cycle.max(1),
            max_slot_candidates: config.max_slot_candidates.max(1),
        }
    }
}

/// What one node returned for a slot.
struct NodeFetch {
    node: ConsensusNode,
    signature: Option<Bytes>,
    data: Option<Bytes>,
}

/// Check that `file` continues the stream after `last`.
///
/// Chained stream types must declare `last.hash` as their previous hash, and when
/// both files carry an index the new one must be exactly one higher.
pub fn check_continuity(last: Option<&StreamFile>, file: &StreamFile) -> Result<()> {
    let Some(last) = last else {
        return Ok(());
    };

    if file.stream_type.is_chained() && file.previous_hash != Some(last.hash) {
        return Err(ImporterError::HashMismatch {
            stream_type: file.stream_type,
            filename: file.name.to_string(),
            expected: last.hash.to_hex(),
            actual: file
                .previous_hash
                .map(|h| h.to_hex())
                .unwrap_or_else(|| "none".to_string()),
        });
    }

    if let (Some(prev), Some(index)) = (last.index, file.index) {
        if index != prev + 1 {
            return Err(ImporterError::IndexMismatch {
                stream_type: file.stream_type,
                filename: file.name.to_string(),
                expected: prev + 1,
                actual: index,
            });
        }
    }
    Ok(())
}

/// Drains `stream` until it ends or `deadline` passes, keeping whatever arrived.
async fn collect_until<S, T>(stream: S, deadline: Instant, what: &str) -> Vec<T>
where
    S: Stream<Item = T>,
{
    tokio::pin!(stream);
    let mut out = Vec::new();
    loop {
        match tokio::time::timeout_at(deadline, stream.next()).await {
            Ok(Some(item)) => out.push(item),
            Ok(None) => break,
            Err(_) => {
                warn!("Timed out waiting for {}; continuing with {} response(s)", what, out.len());
                break;
            }
        }
    }
    out
}

/// Resolves one slot at a time for a single stream type.
///
/// Owns the last accepted file of its stream type; it is the only writer.
pub struct Downloader {
    props: DownloaderProperties,
    registry: Arc<dyn NodeRegistry>,
    provider: Arc<dyn StreamFileProvider>,
    verifier: NodeSignatureVerifier,
    listeners: Vec<Arc<dyn StreamFileListener>>,
    last: Option<StreamFile>,
    state: SlotState,
}

impl Downloader {
    pub fn new(
        props: DownloaderProperties,
        registry: Arc<dyn NodeRegistry>,
        provider: Arc<dyn StreamFileProvider>,
        verifier: NodeSignatureVerifier,
    ) -> Self {
        Self {
            props,
            registry,
            provider,
            verifier,
            listeners: Vec::new(),
            last: None,
            state: SlotState::Awaiting,
        }
    }

    pub fn add_listener(&mut self, listener: Arc<dyn StreamFileListener>) {
        self.listeners.push(listener);
    }

    pub fn stream_type(&self) -> StreamType {
        self.props.stream_type
    }

    pub fn last_accepted(&self) -> Option<&StreamFile> {
        self.last.as_ref()
    }

    pub fn last_slot_state(&self) -> SlotState {
        self.state
    }

    /// Replace the continuity reference, e.g. with the last durably committed
    /// file after a restart or a failed batch.
    pub fn reset_last(&mut self, last: Option<StreamFile>) {
        match &last {
            Some(f) => info!("{} downloader resumes after {}", self.props.stream_type, f.name),
            None => info!("{} downloader starts from the beginning", self.props.stream_type),
        }
        self.last = last.map(|f| f.summary());
    }

    fn transition(&mut self, slot: &StreamFilename, state: SlotState) {
        debug!("{} slot {}: {:?} -> {:?}", self.props.stream_type, slot, self.state, state);
        self.state = state;
    }

    fn fail<T>(&mut self, slot: &StreamFilename, err: ImporterError) -> Result<T> {
        self.transition(slot, SlotState::Failed);
        if err.is_fatal() {
            error!("{} slot {} halted: {}", self.props.stream_type, slot, err);
        } else {
            warn!("{} slot {} failed: {}", self.props.stream_type, slot, err);
        }
        Err(err)
    }

    /// Resolve up to `max_slots_per_cycle` slots. Stops at the first slot with
    /// nothing new and returns how many files were accepted.
    pub async fn download_available(&mut self) -> Result<usize> {
        let mut accepted = 0;
        while accepted < self.props.max_slots_per_cycle {
            match self.download_next().await? {
                Some(_) => accepted += 1,
                None => break,
            }
        }
        Ok(accepted)
    }

    /// Resolve the next slot. `Ok(None)` means no node has published anything new.
    ///
    /// Candidate slots are tried in name order. A slot that fails consensus is
    /// passed over for the next candidate, so a name listed by too little stake
    /// cannot hold the stream back; any other failure ends the call.
    pub async fn download_next(&mut self) -> Result<Option<StreamFile>> {
        self.state = SlotState::Awaiting;
        let nodes = self.registry.nodes();
        if nodes.is_empty() {
            warn!("No consensus nodes known for {} stream", self.props.stream_type);
            return Ok(None);
        }

        let candidates = self.discover_slots(&nodes).await;
        let mut no_consensus = None;
        for slot in candidates {
            match self.resolve_slot(&nodes, &slot).await {
                Ok(file) => return Ok(Some(file)),
                Err(e @ ImporterError::Consensus { .. }) => {
                    info!("Trying next signature file after {}", slot);
                    no_consensus.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }
        match no_consensus {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    async fn resolve_slot(&mut self, nodes: &[ConsensusNode], slot: &StreamFilename) -> Result<StreamFile> {
        self.transition(slot, SlotState::Fetching);
        let mut fetched = self.fetch_slot(nodes, slot, self.phase_deadline()).await;
        fetched.sort_by_key(|f| f.node.node_id);

        self.transition(slot, SlotState::Verifying);
        let outcome = match self.verify_slot(slot, &fetched, nodes) {
            Ok(outcome) => outcome,
            Err(e) => return self.fail(slot, e),
        };

        self.transition(slot, SlotState::ContinuityCheck);
        let mut file = match self.select_candidate(slot, &outcome, &fetched) {
            Ok(file) => file,
            Err(e) => return self.fail(slot, e),
        };
        if let Err(e) = check_continuity(self.last.as_ref(), &file) {
            return self.fail(slot, e);
        }
        if !file.sidecar_refs.is_empty() {
            match self.fetch_sidecars(&file, &outcome, nodes, self.phase_deadline()).await {
                Ok(sidecars) => file.sidecars = sidecars,
                Err(e) => return self.fail(slot, e),
            }
        }
        if file.index.is_none() {
            file.index = Some(self.last.as_ref().and_then(|l| l.index).map_or(0, |i| i + 1));
        }

        let mut file = match self.notify(file).await {
            Ok(file) => file,
            Err(e) => return self.fail(slot, e),
        };

        info!(
            "Accepted {} {} from node {:?}: {} item(s), index {:?}, hash {}",
            self.props.stream_type,
            file.name,
            file.node_id,
            file.count,
            file.index,
            file.hash
        );
        file.clear();
        self.last = Some(file.clone());
        self.transition(slot, SlotState::Accepted);
        Ok(file)
    }

    /// Each retrieval phase gets the full timeout, so a node that hangs in one
    /// phase cannot use up the next phase's budget.
    fn phase_deadline(&self) -> Instant {
        Instant::now() + self.props.timeout
    }

    /// Listeners persist data synchronously, so they run on the blocking pool.
    async fn notify(&self, file: StreamFile) -> Result<StreamFile> {
        if self.listeners.is_empty() {
            return Ok(file);
        }
        let listeners = self.listeners.clone();
        let (file, notified) = tokio::task::spawn_blocking(move || {
            let notified = listeners
                .iter()
                .try_for_each(|listener| listener.on_accepted(&file));
            (file, notified)
        })
        .await
        .map_err(|e| ImporterError::Persistence(format!("listener task failed: {}", e)))?;
        notified.map(|_| file)
    }

    /// Signature files published after the last accepted file, merged across
    /// nodes and ordered by name.
    async fn discover_slots(&self, nodes: &[ConsensusNode]) -> Vec<StreamFilename> {
        let stream_type = self.props.stream_type;
        let limit = self.props.max_slot_candidates;
        let after = self.last.as_ref().map(|f| f.name.clone());
        let listings = stream::iter(nodes.iter().cloned().map(|node| {
            let provider = Arc::clone(&self.provider);
            let after = after.clone();
            async move {
                match provider.list(&node, stream_type, after.as_ref(), limit).await {
                    Ok(names) => names,
                    Err(e) => {
                        warn!("Listing {} files from node {} failed: {}", stream_type, node.node_id, e);
                        Vec::new()
                    }
                }
            }
        }))
        .buffer_unordered(self.props.max_concurrency);

        let names: BTreeSet<StreamFilename> = collect_until(listings, self.phase_deadline(), "file listings")
            .await
            .into_iter()
            .flatten()
            .collect();
        if names.len() > 1 {
            debug!("{} candidate {} slot(s)", names.len(), stream_type);
        }
        names.into_iter().collect()
    }

    async fn fetch_slot(&self, nodes: &[ConsensusNode], slot: &StreamFilename, deadline: Instant) -> Vec<NodeFetch> {
        let data_name = slot.data_filename();
        let fetches = stream::iter(nodes.iter().cloned().map(|node| {
            let provider = Arc::clone(&self.provider);
            let signature_name = slot.clone();
            let data_name = data_name.clone();
            async move {
                let (signature, data) = tokio::join!(
                    provider.get(&node, &signature_name),
                    provider.get(&node, &data_name)
                );
                let signature = signature.unwrap_or_else(|e| {
                    warn!("Fetching {} from node {} failed: {}", signature_name, node.node_id, e);
                    None
                });
                let data = data.unwrap_or_else(|e| {
                    warn!("Fetching {} from node {} failed: {}", data_name, node.node_id, e);
                    None
                });
                NodeFetch { node, signature, data }
            }
        }))
        .buffer_unordered(self.props.max_concurrency);

        collect_until(fetches, deadline, "signature and data files").await
    }

    fn verify_slot(
        &self,
        slot: &StreamFilename,
        fetched: &[NodeFetch],
        nodes: &[ConsensusNode],
    ) -> Result<ConsensusOutcome> {
        let mut records = Vec::with_capacity(fetched.len());
        for fetch in fetched {
            let Some(bytes) = &fetch.signature else {
                continue;
            };
            match read_signature_file(slot, fetch.node.node_id, bytes) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Dropping signature of node {}: {}", fetch.node.node_id, e),
            }
        }
        self.verifier.verify(slot.as_str(), records, nodes)
    }

    /// First consensus node, in node order, whose data file decodes and matches
    /// the agreed hashes.
    fn select_candidate(
        &self,
        slot: &StreamFilename,
        outcome: &ConsensusOutcome,
        fetched: &[NodeFetch],
    ) -> Result<StreamFile> {
        let data_name = slot.data_filename();
        for node_id in outcome.winning_nodes() {
            let Some(bytes) = fetched
                .iter()
                .find(|f| f.node.node_id == node_id)
                .and_then(|f| f.data.clone())
            else {
                continue;
            };
            let mut file = match read_stream_file(&data_name, bytes) {
                Ok(file) => file,
                Err(e) => {
                    warn!("Skipping candidate from node {}: {}", node_id, e);
                    continue;
                }
            };
            if file.file_hash != outcome.file_hash {
                warn!(
                    "Skipping candidate from node {}: hash {} differs from consensus {}",
                    node_id, file.file_hash, outcome.file_hash
                );
                continue;
            }
            if let Some(expected) = outcome.metadata_hash {
                if file.metadata_hash != Some(expected) {
                    warn!(
                        "Skipping candidate from node {}: metadata hash {:?} differs from consensus {}",
                        node_id, file.metadata_hash, expected
                    );
                    continue;
                }
            }
            file.node_id = Some(node_id);
            return Ok(file);
        }
        Err(ImporterError::decode(
            data_name.as_str(),
            None,
            format!("no consensus node supplied a data file with hash {}", outcome.file_hash),
        ))
    }

    /// Fetch and verify every sidecar, asking the accepting node first and then
    /// the other consensus nodes. A digest mismatch fails the slot.
    async fn fetch_sidecars(
        &self,
        file: &StreamFile,
        outcome: &ConsensusOutcome,
        nodes: &[ConsensusNode],
        deadline: Instant,
    ) -> Result<Vec<SidecarFile>> {
        let mut order: Vec<&ConsensusNode> = Vec::new();
        let winners = outcome.winning_nodes();
        let first = file.node_id;
        order.extend(nodes.iter().filter(|n| Some(n.node_id) == first));
        order.extend(
            nodes
                .iter()
                .filter(|n| Some(n.node_id) != first && winners.contains(&n.node_id)),
        );

        let mut sidecars = Vec::with_capacity(file.sidecar_refs.len());
        for declared in &file.sidecar_refs {
            let name = file.name.sidecar_filename(declared.id);
            let mut found = None;
            for node in &order {
                let fetched = tokio::time::timeout_at(deadline, self.provider.get(node, &name)).await;
                match fetched {
                    Ok(Ok(Some(bytes))) => {
                        found = Some(read_sidecar_file(&name, declared, &bytes)?);
                        break;
                    }
                    Ok(Ok(None)) => debug!("Node {} has no sidecar {}", node.node_id, name),
                    Ok(Err(e)) => warn!("Fetching {} from node {} failed: {}", name, node.node_id, e),
                    Err(_) => {
                        return Err(ImporterError::Transport {
                            node: node.node_id,
                            reason: format!("timed out fetching sidecar {}", name),
                        })
                    }
                }
            }
            match found {
                Some(sidecar) => sidecars.push(sidecar),
                None => {
                    return Err(ImporterError::decode(
                        name.as_str(),
                        None,
                        "sidecar not available from any consensus node",
                    ))
                }
            }
        }
        Ok(sidecars)
    }
}
