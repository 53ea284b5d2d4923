// src/config.rs
// Importer configuration: JSON file, environment overrides and startup validation

use crate::domain::StreamType;
use crate::error::{ImporterError, Result};
use crate::signature::{StakeRatio, DEFAULT_CONSENSUS_RATIO};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Validation result for configuration checks
pub struct ConfigValidation {
    pub valid: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ConfigValidation {
    fn new() -> Self {
        Self {
            valid: true,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn add_warning(&mut self, msg: String) {
        self.warnings.push(msg);
    }

    fn add_error(&mut self, msg: String) {
        self.errors.push(msg);
        self.valid = false;
    }

    pub fn print_summary(&self) {
        if !self.warnings.is_empty() {
            warn!("Configuration warnings:");
            for w in &self.warnings {
                warn!(" - {}", w);
            }
        }

        if !self.errors.is_empty() {
            error!("Configuration errors:");
            for e in &self.errors {
                error!(" - {}", e);
            }
        }

        if self.valid && self.warnings.is_empty() {
            info!("Configuration validation passed");
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct ImporterConfig {
    pub storage: StorageConfig,
    pub source: SourceConfig,
    pub consensus: ConsensusConfig,
    pub downloader: DownloaderConfig,
    pub parser: ParserConfig,
    pub persist: PersistConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SourceConfig {
    pub stream_root: PathBuf,
    pub address_book: PathBuf,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Fraction of total stake that must agree on one file hash, as a number
    /// (`0.55`) or a string fraction (`"1/3"`).
    pub ratio: StakeRatio,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct DownloaderConfig {
    pub max_concurrency: usize,
    /// Budget of each retrieval phase: listing, fetching and sidecars.
    pub timeout_ms: u64,
    pub max_slots_per_cycle: usize,
    /// Signature file names taken from each node's listing per slot.
    pub max_slot_candidates: usize,
    pub poll_interval_ms: u64,
    pub enabled_streams: Vec<StreamType>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ParserConfig {
    pub max_batch_items: usize,
    pub max_batch_files: usize,
    pub max_batch_bytes: usize,
    pub max_batch_window_ms: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PersistConfig {
    pub shard_count: usize,
    pub shard_workers: usize,
    pub shard_wait_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/importer"),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            stream_root: PathBuf::from("./data/streams"),
            address_book: PathBuf::from("./data/address_book.json"),
        }
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            ratio: DEFAULT_CONSENSUS_RATIO,
        }
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            timeout_ms: 30_000,
            max_slots_per_cycle: 100,
            max_slot_candidates: 8,
            poll_interval_ms: 1_000,
            enabled_streams: StreamType::ALL.to_vec(),
        }
    }
}

impl DownloaderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_batch_items: 50_000,
            max_batch_files: 10,
            max_batch_bytes: 64 * 1024 * 1024,
            max_batch_window_ms: 5_000,
        }
    }
}

impl ParserConfig {
    pub fn max_batch_window(&self) -> Duration {
        Duration::from_millis(self.max_batch_window_ms)
    }
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            shard_count: 32,
            shard_workers: num_cpus::get(),
            shard_wait_timeout_ms: 60_000,
        }
    }
}

impl PersistConfig {
    pub fn shard_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.shard_wait_timeout_ms)
    }
}

impl ImporterConfig {
    /// Read a JSON config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| ImporterError::Config(format!("invalid config {}: {}", path.display(), e)))
    }

    /// `load` followed by `.env` and process environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::load(path)?;
        config.apply_env()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = env::var("MIRROR_DB_PATH") {
            self.storage.db_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("MIRROR_STREAM_ROOT") {
            self.source.stream_root = PathBuf::from(path);
        }
        if let Ok(path) = env::var("MIRROR_ADDRESS_BOOK") {
            self.source.address_book = PathBuf::from(path);
        }
        if let Ok(ratio) = env::var("MIRROR_CONSENSUS_RATIO") {
            self.consensus.ratio = ratio.parse().map_err(|_| {
                ImporterError::Config(format!("MIRROR_CONSENSUS_RATIO is not a ratio: '{}'", ratio))
            })?;
        }
        Ok(())
    }

    /// Validate all settings before any component is built.
    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::new();

        let ratio = self.consensus.ratio;
        if !ratio.is_fraction() {
            validation.add_error(format!("consensus.ratio must be within [0, 1], got {}", ratio));
        } else if ratio.is_zero() {
            validation.add_warning(
                "consensus.ratio is 0: any single verified signature is accepted without a stake check"
                    .into(),
            );
        } else if ratio.is_majority() {
            validation.add_warning(format!(
                "consensus.ratio {} requires a stake majority; a minority of offline nodes will stall ingestion",
                ratio
            ));
        }

        let d = &self.downloader;
        if d.max_concurrency == 0 {
            validation.add_error("downloader.max_concurrency must be at least 1".into());
        }
        if d.timeout_ms == 0 {
            validation.add_error("downloader.timeout_ms must be greater than 0".into());
        }
        if d.max_slots_per_cycle == 0 {
            validation.add_error("downloader.max_slots_per_cycle must be at least 1".into());
        }
        if d.max_slot_candidates == 0 {
            validation.add_error("downloader.max_slot_candidates must be at least 1".into());
        }
        if d.enabled_streams.is_empty() {
            validation.add_warning("downloader.enabled_streams is empty: nothing will be ingested".into());
        }

        let p = &self.parser;
        if p.max_batch_items == 0 || p.max_batch_files == 0 || p.max_batch_bytes == 0 {
            validation.add_error("parser batch thresholds must all be greater than 0".into());
        }

        let s = &self.persist;
        if s.shard_count == 0 || s.shard_count > 256 {
            validation.add_error(format!(
                "persist.shard_count must be within 1..=256, got {}",
                s.shard_count
            ));
        }
        if s.shard_workers == 0 {
            validation.add_error("persist.shard_workers must be at least 1".into());
        }
        if s.shard_wait_timeout_ms == 0 {
            validation.add_error("persist.shard_wait_timeout_ms must be greater than 0".into());
        }

        if !self.source.stream_root.exists() {
            validation.add_warning(format!(
                "source.stream_root {} does not exist yet",
                self.source.stream_root.display()
            ));
        }

        validation
    }
}
