// src/signature/mod.rs
// Verify-then-agree over every node's signature for one slot

pub mod consensus;
pub mod verifier;

pub use consensus::{ConsensusEngine, ConsensusOutcome, StakeRatio, DEFAULT_CONSENSUS_RATIO};
pub use verifier::verify_signature;

use crate::domain::{ConsensusNode, SignatureRecord};
use crate::error::Result;
use rayon::prelude::*;
use std::collections::HashMap;

/// Total stake of the epoch the node set belongs to. Falls back to the sum of
/// node stakes when the entries carry no epoch total.
pub fn epoch_total_stake(nodes: &[ConsensusNode]) -> u64 {
    let declared = nodes.iter().map(|n| n.total_stake).max().unwrap_or(0);
    if declared > 0 {
        declared
    } else {
        nodes.iter().fold(0u64, |sum, n| sum.saturating_add(n.stake))
    }
}

#[derive(Clone, Debug, Default)]
pub struct NodeSignatureVerifier {
    engine: ConsensusEngine,
}

impl NodeSignatureVerifier {
    pub fn new(engine: ConsensusEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &ConsensusEngine {
        &self.engine
    }

    /// Verify every record against its node's key in parallel, then run
    /// consensus over the verified set.
    pub fn verify(
        &self,
        filename: &str,
        records: Vec<SignatureRecord>,
        nodes: &[ConsensusNode],
    ) -> Result<ConsensusOutcome> {
        let by_id: HashMap<u64, &ConsensusNode> = nodes.iter().map(|n| (n.node_id, n)).collect();
        let verified: Vec<SignatureRecord> = records
            .par_iter()
            .map(|r| verify_signature(r, by_id.get(&r.node_id).copied()))
            .collect();

        let stakes: HashMap<u64, u64> = nodes.iter().map(|n| (n.node_id, n.stake)).collect();
        self.engine
            .reach_consensus(filename, verified, &stakes, epoch_total_stake(nodes))
    }
}
