// src/listener.rs
// Hooks for collaborators that react to new data

use crate::domain::StreamFile;
use crate::error::Result;

/// Called by the downloader for every accepted file, in slot order.
/// An error fails the slot; the file is not recorded as accepted.
pub trait StreamFileListener: Send + Sync {
    fn on_accepted(&self, file: &StreamFile) -> Result<()>;
}

/// Called once per committed batch with the last file of the batch.
pub trait BatchEndListener: Send + Sync {
    fn on_batch_end(&self, last: &StreamFile);
}
