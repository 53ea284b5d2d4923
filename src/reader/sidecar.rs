// src/reader/sidecar.rs
use super::proto;
use crate::crypto::sha384;
use crate::domain::{SidecarFile, SidecarRef, StreamFilename};
use crate::error::{ImporterError, Result};
use prost::Message;

/// Decode sidecar `filename` and check its bytes against the digest the record
/// file declared for it.
pub fn read_sidecar_file(
    filename: &StreamFilename,
    declared: &SidecarRef,
    data: &[u8],
) -> Result<SidecarFile> {
    let actual = sha384(data);
    if actual != declared.hash {
        return Err(ImporterError::SidecarHashMismatch {
            filename: filename.to_string(),
            expected: declared.hash.to_hex(),
            actual: actual.to_hex(),
        });
    }

    let message = proto::SidecarFile::decode(data).map_err(|e| {
        ImporterError::decode(filename.as_str(), Some(6), format!("invalid sidecar message: {}", e))
    })?;

    Ok(SidecarFile {
        id: declared.id,
        name: filename.clone(),
        hash: actual,
        size: data.len(),
        records: message.sidecar_records,
    })
}
