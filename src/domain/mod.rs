// src/domain/mod.rs
// Core value types shared by the ingestion pipeline

pub mod node;
pub mod signature;
pub mod stream_file;

pub use node::{ConsensusNode, NodePublicKey};
pub use signature::{SignatureRecord, SignatureStatus, SignatureType};
pub use stream_file::{
    AccountBalance, RecordItem, SidecarFile, SidecarRef, StreamFile, StreamItems,
    TransactionRecord, TransactionSidecarRecord,
};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Nanoseconds since the Unix epoch.
pub type Timestamp = i64;

pub const HASH_LENGTH: usize = 48;

/// A SHA-384 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHash(pub [u8; HASH_LENGTH]);

impl FileHash {
    pub const ZERO: FileHash = FileHash([0u8; HASH_LENGTH]);

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; HASH_LENGTH] = bytes.try_into().ok()?;
        Some(FileHash(arr))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // first 8 bytes are enough to tell hashes apart in logs
        write!(f, "FileHash({}..)", &self.to_hex()[..16])
    }
}

impl FromStr for FileHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| e.to_string())?;
        FileHash::from_slice(&bytes)
            .ok_or_else(|| format!("expected {} hash bytes, got {}", HASH_LENGTH, bytes.len()))
    }
}

impl Serialize for FileHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FileHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Independent streams ingested by their own downloader/parser pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Record,
    Balance,
}

impl StreamType {
    pub const ALL: [StreamType; 2] = [StreamType::Record, StreamType::Balance];

    /// Top-level directory of the stream inside a bucket.
    pub fn path(&self) -> &'static str {
        match self {
            StreamType::Record => "recordstreams",
            StreamType::Balance => "accountBalances",
        }
    }

    /// Prefix of each node's directory, followed by the node account id.
    pub fn node_prefix(&self) -> &'static str {
        match self {
            StreamType::Record => "record",
            StreamType::Balance => "balance",
        }
    }

    /// Whether every file declares the hash of its predecessor.
    pub fn is_chained(&self) -> bool {
        matches!(self, StreamType::Record)
    }

    /// Stable one-byte tag used as a storage key prefix.
    pub fn tag(&self) -> u8 {
        match self {
            StreamType::Record => 1,
            StreamType::Balance => 2,
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            StreamType::Record => "",
            StreamType::Balance => "_Balances",
        }
    }

    fn data_extensions(&self) -> &'static [&'static str] {
        match self {
            StreamType::Record => &["rcd"],
            StreamType::Balance => &["pb", "csv"],
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamType::Record => f.write_str("record"),
            StreamType::Balance => f.write_str("balance"),
        }
    }
}

impl FromStr for StreamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "record" => Ok(StreamType::Record),
            "balance" => Ok(StreamType::Balance),
            other => Err(format!("unknown stream type '{}'", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileKind {
    Data,
    Signature,
    Sidecar(u32),
}

const INSTANT_FORMAT: &str = "%Y-%m-%dT%H_%M_%S%.9fZ";
const SIGNATURE_SUFFIX: &str = "_sig";

/// Parsed stream file name, e.g. `2022-07-13T08_46_11.304284003Z.rcd_sig`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StreamFilename {
    stream_type: StreamType,
    instant: Timestamp,
    kind: FileKind,
    extension: String,
    name: String,
}

impl StreamFilename {
    pub fn parse(name: &str) -> Result<Self, String> {
        let (stem, ext) = name
            .rsplit_once('.')
            .ok_or_else(|| format!("'{}' has no extension", name))?;
        let (extension, signature) = match ext.strip_suffix(SIGNATURE_SUFFIX) {
            Some(base) => (base, true),
            None => (ext, false),
        };

        let stream_type = StreamType::ALL
            .into_iter()
            .find(|t| t.data_extensions().contains(&extension))
            .ok_or_else(|| format!("'{}' has unknown extension '{}'", name, ext))?;

        let stem = stem
            .strip_suffix(stream_type.suffix())
            .ok_or_else(|| format!("'{}' is missing the {} suffix", name, stream_type.suffix()))?;

        let z = stem
            .find('Z')
            .ok_or_else(|| format!("'{}' has no instant", name))?;
        let (instant_part, rest) = stem.split_at(z + 1);

        let kind = match (rest.strip_prefix('_'), signature) {
            (None, true) if rest.is_empty() => FileKind::Signature,
            (None, false) if rest.is_empty() => FileKind::Data,
            (Some(id), false) if stream_type == StreamType::Record => FileKind::Sidecar(
                id.parse()
                    .map_err(|_| format!("'{}' has invalid sidecar id '{}'", name, id))?,
            ),
            _ => return Err(format!("'{}' is not a valid stream file name", name)),
        };

        let instant = parse_instant(instant_part)
            .ok_or_else(|| format!("'{}' has invalid instant '{}'", name, instant_part))?;

        Ok(Self {
            stream_type,
            instant,
            kind,
            extension: extension.to_string(),
            name: name.to_string(),
        })
    }

    pub fn new(stream_type: StreamType, instant: Timestamp, kind: FileKind) -> Self {
        let extension = stream_type.data_extensions()[0];
        Self::with_extension(stream_type, instant, kind, extension)
    }

    pub fn with_extension(
        stream_type: StreamType,
        instant: Timestamp,
        kind: FileKind,
        extension: &str,
    ) -> Self {
        let base = format!("{}{}", format_instant(instant), stream_type.suffix());
        let name = match kind {
            FileKind::Data => format!("{}.{}", base, extension),
            FileKind::Signature => format!("{}.{}{}", base, extension, SIGNATURE_SUFFIX),
            FileKind::Sidecar(id) => format!("{}_{:02}.{}", base, id, extension),
        };
        Self {
            stream_type,
            instant,
            kind,
            extension: extension.to_string(),
            name,
        }
    }

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    pub fn instant(&self) -> Timestamp {
        self.instant
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The data file a signature or sidecar file belongs to.
    pub fn data_filename(&self) -> StreamFilename {
        Self::with_extension(self.stream_type, self.instant, FileKind::Data, &self.extension)
    }

    pub fn signature_filename(&self) -> StreamFilename {
        Self::with_extension(
            self.stream_type,
            self.instant,
            FileKind::Signature,
            &self.extension,
        )
    }

    pub fn sidecar_filename(&self, id: u32) -> StreamFilename {
        Self::with_extension(self.stream_type, self.instant, FileKind::Sidecar(id), &self.extension)
    }
}

impl fmt::Display for StreamFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Ord for StreamFilename {
    fn cmp(&self, other: &Self) -> Ordering {
        self.instant
            .cmp(&other.instant)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for StreamFilename {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub fn format_instant(nanos: Timestamp) -> String {
    to_datetime(nanos).format(INSTANT_FORMAT).to_string()
}

pub fn parse_instant(s: &str) -> Option<Timestamp> {
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H_%M_%S%.fZ").ok()?;
    naive.and_utc().timestamp_nanos_opt()
}

pub fn to_datetime(nanos: Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(nanos.div_euclid(1_000_000_000), nanos.rem_euclid(1_000_000_000) as u32)
        .unwrap_or_default()
}
