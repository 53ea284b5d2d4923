// src/importer.rs
// Polling loop that drives one downloader/parser pair

use crate::downloader::Downloader;
use crate::error::{ImporterError, Result};
use crate::parser::StreamParser;
use crate::storage::StreamFileRepository;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct StreamImporter {
    downloader: Downloader,
    parser: Arc<StreamParser>,
    repository: Arc<StreamFileRepository>,
    poll_interval: Duration,
}

impl StreamImporter {
    /// The parser must already be registered as a listener of the downloader.
    pub fn new(
        downloader: Downloader,
        parser: Arc<StreamParser>,
        repository: Arc<StreamFileRepository>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            downloader,
            parser,
            repository,
            poll_interval,
        }
    }

    pub fn downloader(&self) -> &Downloader {
        &self.downloader
    }

    /// Point the downloader and parser at the last committed file.
    pub fn recover(&mut self) -> Result<()> {
        let last = self.repository.latest_summary(self.downloader.stream_type())?;
        self.parser.reset(last.as_ref());
        self.downloader.reset_last(last);
        Ok(())
    }

    /// One polling cycle: resolve available slots, then flush a due batch.
    pub async fn run_once(&mut self) -> Result<usize> {
        let downloaded = self.downloader.download_available().await;
        let parser = Arc::clone(&self.parser);
        let flushed = tokio::task::spawn_blocking(move || parser.flush_if_due())
            .await
            .map_err(|e| ImporterError::Persistence(format!("flush task failed: {}", e)))
            .and_then(|flushed| flushed);
        match (downloaded, flushed) {
            (Ok(count), Ok(_)) => Ok(count),
            (Err(e), _) | (_, Err(e)) => Err(e),
        }
    }

    /// Poll until `shutdown` flips to true or a fatal error occurs.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let stream_type = self.downloader.stream_type();
        self.recover()?;
        info!("{} importer started", stream_type);

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(0) => {}
                        Ok(count) => info!("{} importer accepted {} file(s)", stream_type, count),
                        Err(e) if e.is_fatal() => {
                            error!("{} importer halted: {}", stream_type, e);
                            self.finish().await;
                            return Err(e);
                        }
                        Err(e) => {
                            warn!("{} importer cycle failed, retrying: {}", stream_type, e);
                            if self.diverged() {
                                self.recover()?;
                            }
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("{} importer shutting down", stream_type);
                        self.finish().await;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// True when the parser abandoned a batch the downloader already moved past.
    fn diverged(&self) -> bool {
        let seen = self.parser.last_seen().map(|f| f.name);
        let accepted = self.downloader.last_accepted().map(|f| f.name.clone());
        seen != accepted
    }

    async fn finish(&self) {
        let parser = Arc::clone(&self.parser);
        let flushed = tokio::task::spawn_blocking(move || parser.flush()).await;
        match flushed {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Final flush of {} batch failed: {}", self.downloader.stream_type(), e),
            Err(e) => warn!("Final flush task of {} stream failed: {}", self.downloader.stream_type(), e),
        }
    }
}
