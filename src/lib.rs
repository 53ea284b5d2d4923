// src/lib.rs
// Mirror node importer: verified ingestion of consensus node stream files

pub mod addressbook;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod downloader;
pub mod error;
pub mod importer;
pub mod listener;
pub mod parser;
pub mod persist;
pub mod reader;
pub mod signature;
pub mod storage;

pub use addressbook::{AddressBook, NodeRegistry};
pub use config::{ConfigValidation, ImporterConfig};
pub use domain::{
    ConsensusNode, FileHash, FileKind, NodePublicKey, SignatureRecord, SignatureStatus, SignatureType,
    StreamFile, StreamFilename, StreamType,
};
pub use downloader::{Downloader, DownloaderProperties, LocalStreamFileProvider, SlotState, StreamFileProvider};
pub use error::{ImporterError, Result};
pub use importer::StreamImporter;
pub use listener::{BatchEndListener, StreamFileListener};
pub use parser::{BatchSink, EntityWriter, ParserProperties, RowBatch, StreamParser};
pub use signature::{ConsensusEngine, ConsensusOutcome, NodeSignatureVerifier, StakeRatio};
pub use storage::{EntityStore, StreamFileRepository};
