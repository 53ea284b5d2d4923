// src/signature/consensus.rs
// Stake-weighted agreement on a single file hash

use crate::domain::{FileHash, SignatureRecord, SignatureStatus};
use crate::error::{ImporterError, Result};
use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Most fractional digits accepted in a decimal ratio; keeps the denominator in a `u64`.
const MAX_DECIMAL_DIGITS: u32 = 18;

pub const DEFAULT_CONSENSUS_RATIO: StakeRatio = StakeRatio {
    numerator: 1,
    denominator: 3,
};

/// Exact fraction of the total stake that must agree on a hash.
///
/// Parsed from `"n/d"` or a decimal such as `"0.55"`; JSON numbers are read
/// through their shortest decimal form, so `0.55` is exactly 55/100.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StakeRatio {
    numerator: u64,
    denominator: u64,
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

impl StakeRatio {
    pub fn new(numerator: u64, denominator: u64) -> Result<Self> {
        if denominator == 0 {
            return Err(ImporterError::Config("stake ratio denominator must not be 0".into()));
        }
        let d = gcd(numerator, denominator);
        Ok(Self {
            numerator: numerator / d,
            denominator: denominator / d,
        })
    }

    pub fn from_f64(ratio: f64) -> Result<Self> {
        if !ratio.is_finite() || ratio < 0.0 {
            return Err(ImporterError::Config(format!("invalid stake ratio {}", ratio)));
        }
        // f64 Display is the shortest decimal that round-trips, never exponent form
        ratio.to_string().parse()
    }

    pub fn numerator(&self) -> u64 {
        self.numerator
    }

    pub fn denominator(&self) -> u64 {
        self.denominator
    }

    pub fn is_zero(&self) -> bool {
        self.numerator == 0
    }

    /// True when the ratio lies in `[0, 1]`.
    pub fn is_fraction(&self) -> bool {
        self.numerator <= self.denominator
    }

    /// Strictly more than half.
    pub fn is_majority(&self) -> bool {
        self.numerator as u128 * 2 > self.denominator as u128
    }

    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// `ceil(total * n / d)` in integer arithmetic.
    pub fn apply_ceil(&self, total: u64) -> u64 {
        let n = self.numerator as u128;
        let d = self.denominator as u128;
        let required = (total as u128 * n + d - 1) / d;
        u64::try_from(required).unwrap_or(u64::MAX)
    }
}

impl Default for StakeRatio {
    fn default() -> Self {
        DEFAULT_CONSENSUS_RATIO
    }
}

impl fmt::Display for StakeRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

impl FromStr for StakeRatio {
    type Err = ImporterError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || ImporterError::Config(format!("invalid stake ratio '{}'", s));

        if let Some((n, d)) = s.split_once('/') {
            let n = n.trim().parse::<u64>().map_err(|_| invalid())?;
            let d = d.trim().parse::<u64>().map_err(|_| invalid())?;
            return Self::new(n, d);
        }

        let (whole, fraction) = s.split_once('.').unwrap_or((s, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let fraction = fraction.trim_end_matches('0');
        let digits = u32::try_from(fraction.len()).map_err(|_| invalid())?;
        if digits > MAX_DECIMAL_DIGITS {
            return Err(ImporterError::Config(format!(
                "stake ratio '{}' has more than {} decimal places",
                s, MAX_DECIMAL_DIGITS
            )));
        }
        let denominator = 10u64.pow(digits);
        let whole = if whole.is_empty() { 0 } else { whole.parse::<u64>().map_err(|_| invalid())? };
        let fraction = if fraction.is_empty() { 0 } else { fraction.parse::<u64>().map_err(|_| invalid())? };
        let numerator = whole
            .checked_mul(denominator)
            .and_then(|w| w.checked_add(fraction))
            .ok_or_else(invalid)?;
        Self::new(numerator, denominator)
    }
}

impl Serialize for StakeRatio {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StakeRatio {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }
        let parsed = match Raw::deserialize(deserializer)? {
            Raw::Number(n) => StakeRatio::from_f64(n),
            Raw::Text(s) => s.parse(),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}

/// Result of a successful consensus round.
#[derive(Clone, Debug)]
pub struct ConsensusOutcome {
    pub file_hash: FileHash,
    /// Metadata hash claimed by the first record of the winning group.
    pub metadata_hash: Option<FileHash>,
    pub stake: u64,
    pub required: u64,
    /// Every input record with its final status.
    pub records: Vec<SignatureRecord>,
}

impl ConsensusOutcome {
    /// Records of the winning group, in input order.
    pub fn winners(&self) -> impl Iterator<Item = &SignatureRecord> {
        self.records
            .iter()
            .filter(|r| r.status == SignatureStatus::ConsensusReached)
    }

    pub fn winning_nodes(&self) -> Vec<u64> {
        self.winners().map(|r| r.node_id).collect()
    }
}

struct Group {
    hash: FileHash,
    stake: u64,
    nodes: HashSet<u64>,
}

#[derive(Clone, Debug)]
pub struct ConsensusEngine {
    ratio: StakeRatio,
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CONSENSUS_RATIO)
    }
}

impl ConsensusEngine {
    pub fn new(ratio: StakeRatio) -> Self {
        Self { ratio }
    }

    pub fn ratio(&self) -> StakeRatio {
        self.ratio
    }

    /// `ceil(total_stake * ratio)`
    pub fn required_stake(&self, total_stake: u64) -> u64 {
        self.ratio.apply_ceil(total_stake)
    }

    /// Decide whether enough stake agrees on one file hash.
    ///
    /// Only `Verified` records vote. Groups are formed in input order and the
    /// first group meeting the threshold wins, so two groups that both qualify
    /// resolve to the one seen first. A node's stake counts once per group.
    pub fn reach_consensus(
        &self,
        filename: &str,
        records: Vec<SignatureRecord>,
        stakes: &HashMap<u64, u64>,
        total_stake: u64,
    ) -> Result<ConsensusOutcome> {
        let mut groups: Vec<Group> = Vec::new();
        for record in records.iter().filter(|r| r.is_verified()) {
            let idx = match groups.iter().position(|g| g.hash == record.file_hash) {
                Some(i) => i,
                None => {
                    groups.push(Group {
                        hash: record.file_hash,
                        stake: 0,
                        nodes: HashSet::new(),
                    });
                    groups.len() - 1
                }
            };
            let group = &mut groups[idx];
            if group.nodes.insert(record.node_id) {
                let stake = stakes.get(&record.node_id).copied().unwrap_or(0);
                group.stake = group.stake.saturating_add(stake);
            }
        }

        let winner = if self.ratio.is_zero() {
            // No stake check: any verified signature settles the slot.
            groups.first().map(|g| (g.hash, g.stake, 0))
        } else {
            let required = self.required_stake(total_stake);
            if total_stake == 0 {
                None
            } else {
                groups
                    .iter()
                    .find(|g| g.stake >= required)
                    .map(|g| (g.hash, g.stake, required))
            }
        };

        let (hash, stake, required) = match winner {
            Some(w) => w,
            None => {
                let best = groups.iter().max_by_key(|g| g.stake);
                let err = ImporterError::Consensus {
                    filename: filename.to_string(),
                    best_stake: best.map(|g| g.stake).unwrap_or(0),
                    best_count: best.map(|g| g.nodes.len()).unwrap_or(0),
                    required: self.required_stake(total_stake),
                    total_stake,
                };
                warn!("{}", err);
                return Err(err);
            }
        };

        debug!(
            "Consensus on {} for {}: stake {} of {} (required {})",
            hash, filename, stake, total_stake, required
        );

        let metadata_hash = records
            .iter()
            .find(|r| r.is_verified() && r.file_hash == hash)
            .and_then(|r| r.metadata_hash);

        let records = records
            .into_iter()
            .map(|r| {
                if r.is_verified() && r.file_hash == hash {
                    r.with_status(SignatureStatus::ConsensusReached)
                } else {
                    r
                }
            })
            .collect();

        Ok(ConsensusOutcome {
            file_hash: hash,
            metadata_hash,
            stake,
            required,
            records,
        })
    }
}
