// src/main.rs
// mirror-importer: runs one importer per enabled stream type until Ctrl-C

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{error, info};
use mirror_importer::{
    AddressBook, ConsensusEngine, Downloader, DownloaderProperties, EntityStore, EntityWriter,
    ImporterConfig, LocalStreamFileProvider, NodeRegistry, NodeSignatureVerifier, ParserProperties,
    StreamFileListener, StreamFileRepository, StreamImporter, StreamParser,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "mirror-importer")]
#[command(about = "Download, verify and persist consensus node stream files", long_about = None)]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, default_value = "importer.json")]
    config: PathBuf,
    /// Override storage.db_path
    #[arg(long)]
    db_path: Option<PathBuf>,
    /// Override source.stream_root
    #[arg(long)]
    stream_root: Option<PathBuf>,
    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = ImporterConfig::load_with_env(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    if let Some(path) = cli.db_path {
        config.storage.db_path = path;
    }
    if let Some(path) = cli.stream_root {
        config.source.stream_root = path;
    }

    let validation = config.validate();
    validation.print_summary();
    if !validation.valid {
        bail!("invalid configuration ({} error(s))", validation.errors.len());
    }
    if cli.check {
        return Ok(());
    }

    let store = EntityStore::open(&config.storage.db_path, config.persist.shard_count)
        .context("opening entity store")?;
    let book = AddressBook::with_store(store.clone()).context("loading address book")?;
    if config.source.address_book.exists() {
        book.load_json_file(&config.source.address_book)
            .context("importing address book")?;
    }
    if book.count() == 0 {
        bail!("no consensus nodes configured");
    }
    info!(
        "{} consensus node(s), total stake {}",
        book.count(),
        book.total_stake()
    );

    let registry: Arc<dyn NodeRegistry> = Arc::new(book);
    let provider = Arc::new(LocalStreamFileProvider::new(&config.source.stream_root));
    let repository = Arc::new(StreamFileRepository::new(store.clone()));
    let sink = Arc::new(EntityWriter::new(store.clone(), &config.persist)?);
    let verifier = NodeSignatureVerifier::new(ConsensusEngine::new(config.consensus.ratio));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();
    for stream_type in config.downloader.enabled_streams.iter().copied() {
        let parser = Arc::new(StreamParser::new(
            stream_type,
            ParserProperties::from(&config.parser),
            sink.clone(),
        ));
        let mut downloader = Downloader::new(
            DownloaderProperties::new(stream_type, &config.downloader),
            registry.clone(),
            provider.clone(),
            verifier.clone(),
        );
        downloader.add_listener(parser.clone() as Arc<dyn StreamFileListener>);
        let importer = StreamImporter::new(
            downloader,
            parser,
            repository.clone(),
            config.downloader.poll_interval(),
        );
        let rx = shutdown_rx.clone();
        tasks.push((stream_type, tokio::spawn(importer.run(rx))));
    }

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("Ctrl-C received, stopping importers");
    shutdown_tx.send(true).ok();

    let mut failed = false;
    for (stream_type, task) in tasks {
        match task.await {
            Ok(Ok(())) => info!("{} importer stopped", stream_type),
            Ok(Err(e)) => {
                error!("{} importer stopped with error: {}", stream_type, e);
                failed = true;
            }
            Err(e) => {
                error!("{} importer task panicked: {}", stream_type, e);
                failed = true;
            }
        }
    }
    if failed {
        bail!("one or more importers failed");
    }
    Ok(())
}
