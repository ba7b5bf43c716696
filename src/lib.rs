// src/lib.rs

pub mod cli;
pub mod compose;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod graph;
pub mod handlers;
pub mod logging;
pub mod rules;
pub mod services;
pub mod store;
pub mod transport;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::cli::CliArgs;
use crate::compose::ComposePoller;
use crate::config::ConfigFile;
use crate::config::loader::load_and_validate;
use crate::engine::{Consumer, ConsumerEvent, Runtime};
use crate::events::parsers::{ParserSettings, build_registry};
use crate::graph::DependencyGraphBuilder;
use crate::handlers::{HandlerContext, build_handlers};
use crate::services::Services;
use crate::services::memory::{InventorySnapshot, MemoryServices};
use crate::store::{BuildStore, FileBuildStore, MemoryBuildStore};
use crate::types::StoreMode;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - external services (in-memory inventory snapshot)
/// - build store
/// - parser / handler registries and the consumer runtime
/// - the NDJSON message reader (file or stdin)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg)?;
        return Ok(());
    }

    let mut snapshot = match &args.inventory {
        Some(path) => InventorySnapshot::from_json_path(path)?,
        None => InventorySnapshot::default(),
    };
    snapshot.compose.server_url = cfg.compose.server_url.clone();
    let services = Services::from_memory(Arc::new(MemoryServices::new(snapshot)));

    let store = open_store(&cfg)?;

    // Shutdown is signalled twice: the watch flag interrupts a handler that
    // is waiting on a compose, the channel event stops the loop.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = build_consumer(&cfg, services, store, shutdown_rx)?;

    let (tx, rx) = mpsc::channel::<ConsumerEvent>(cfg.messaging.queue_length);

    match &args.messages {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            spawn_reader(file, tx.clone());
        }
        None => spawn_reader(tokio::io::stdin(), tx.clone()),
    }

    // Ctrl-C → graceful shutdown.
    {
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = shutdown_tx.send(true);
            let _ = tx.send(ConsumerEvent::ShutdownRequested).await;
        });
    }
    drop(tx);

    let stats = Runtime::new(consumer, rx).run().await?;
    debug!(?stats, "rebuildd finished");
    Ok(())
}

/// Open the configured build store.
pub fn open_store(cfg: &ConfigFile) -> crate::errors::Result<Arc<dyn BuildStore>> {
    match (cfg.store.mode, &cfg.store.path) {
        (StoreMode::File, Some(path)) => {
            info!(path = %path.display(), "using file build store");
            Ok(Arc::new(FileBuildStore::open(path)?))
        }
        (StoreMode::File, None) => Err(errors::RebuildError::ConfigError(
            "[store].path is required when [store].mode = \"file\"".to_string(),
        )),
        (StoreMode::Memory, _) => {
            info!("using in-memory build store");
            Ok(Arc::new(MemoryBuildStore::new()))
        }
    }
}

/// Build the parser and handler registries and the consumer around them.
pub fn build_consumer(
    cfg: &ConfigFile,
    services: Services,
    store: Arc<dyn BuildStore>,
    shutdown: watch::Receiver<bool>,
) -> crate::errors::Result<Consumer> {
    let settings = ParserSettings {
        git_base_url: cfg.source.git_base_url.clone(),
    };
    let parsers = build_registry(cfg.messaging.topic_prefixes.clone(), &cfg.parsers, &settings)?;

    let rules = Arc::new(cfg.rule_matcher());
    let ctx = HandlerContext {
        store: store.clone(),
        rules: rules.clone(),
        graph: DependencyGraphBuilder::new(services.clone(), rules),
        poller: ComposePoller::new(
            services.compose.clone(),
            cfg.compose.poll_interval,
            cfg.compose.timeout,
        ),
        services,
        git_base_url: cfg.source.git_base_url.clone(),
        shutdown,
    };
    let handlers = build_handlers(&cfg.handlers, &ctx)?;

    Ok(Consumer::new(parsers, handlers, store))
}

fn spawn_reader<R>(reader: R, tx: mpsc::Sender<ConsumerEvent>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = transport::forward_messages(reader, tx.clone()).await {
            error!(error = %err, "message input failed");
            let _ = tx.send(ConsumerEvent::InputClosed).await;
        }
    });
}

/// Dry-run output: subscriptions, registrations and rule tables.
fn print_dry_run(cfg: &ConfigFile) -> Result<()> {
    let settings = ParserSettings {
        git_base_url: cfg.source.git_base_url.clone(),
    };
    let parsers = build_registry(cfg.messaging.topic_prefixes.clone(), &cfg.parsers, &settings)?;

    println!("rebuildd dry-run");
    println!("  messaging.queue_length = {}", cfg.messaging.queue_length);
    println!("  source.git_base_url = {}", cfg.source.git_base_url);
    println!(
        "  compose = {} (poll every {:?}, timeout {:?})",
        cfg.compose.server_url, cfg.compose.poll_interval, cfg.compose.timeout
    );
    println!("  store.mode = {:?}", cfg.store.mode);
    if let Some(path) = &cfg.store.path {
        println!("  store.path = {}", path.display());
    }
    println!();

    println!("topics ({}):", parsers.topics().len());
    for topic in parsers.topics() {
        println!("  - {topic}");
    }

    println!("parsers: {}", parsers.names().join(", "));
    println!("handlers: {}", cfg.handlers.join(", "));

    for (label, table) in [("whitelist", &cfg.whitelist), ("blacklist", &cfg.blacklist)] {
        if table.is_empty() {
            continue;
        }
        println!("{label}:");
        for (handler, by_type) in table {
            for (ty, rule) in by_type {
                println!("  {handler}.{ty}: {}", serde_json::to_string(rule)?);
            }
        }
    }

    debug!("dry-run complete (nothing consumed)");
    Ok(())
}
