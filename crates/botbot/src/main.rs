//! `run_plugins`: the local plugin runner.
//!
//! Loads configuration, seeds in-memory backends from it and runs the
//! bundled plugins until Ctrl+C. With `--stdin`, JSON packets are read from
//! standard input, one per line, and pushed onto the queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use botbot_core::{EventQueue, LogSink, MemoryQueue, MemoryStore};
use botbot_framework::{ExecutionMode, PluginRegistry};
use botbot_runtime::{ConfigLoader, PluginRunner, logging, shutdown_on_signal};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DRAIN_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Parser)]
#[command(name = "run_plugins", version, about = "Run BotBot plugins against the inbound queue")]
struct Cli {
    /// Configuration file (default: botbot.toml in the current or user config directory).
    #[arg(long, env = "BOTBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Run each plugin handler as its own task (overrides config value).
    #[arg(long, default_value_t = false)]
    with_tasks: bool,

    /// Read JSON packets from standard input, one per line.
    #[arg(long, default_value_t = false)]
    stdin: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build the async runtime")?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut loader = ConfigLoader::new().with_current_dir().with_user_config_dir();
    if let Some(path) = &cli.config {
        loader = loader.file(path);
    }
    if cli.with_tasks {
        loader = loader.set("runner.execution", ExecutionMode::Task);
    }
    let config = loader
        .load_validated()
        .context("failed to load configuration")?;
    logging::init_from_config(&config.logging);

    let mut registry = PluginRegistry::new();
    for plugin in botbot_plugins::bundled() {
        registry.register(plugin)?;
    }
    info!(
        plugins = registry.plugin_count(),
        networks = config.networks.len(),
        "Starting plugin runner"
    );

    let queue = Arc::new(MemoryQueue::new());
    let runner = PluginRunner::from_config(
        &config.runner,
        queue.clone(),
        Arc::new(config.identity_store()),
        Arc::new(registry),
        Arc::new(MemoryStore::new()),
        Arc::new(LogSink),
    );

    let shutdown = shutdown_on_signal();
    if cli.stdin {
        tokio::spawn(feed_stdin(
            queue,
            config.runner.queue_key.clone(),
            shutdown.clone(),
        ));
    }

    runner.run(shutdown).await;
    Ok(())
}

/// Pushes stdin lines onto `key`. Once stdin closes and the queue has been
/// emptied, requests shutdown.
async fn feed_stdin(queue: Arc<MemoryQueue>, key: String, shutdown: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => {
                if let Err(e) = queue.push(&key, line).await {
                    warn!("Failed to enqueue packet: {e}");
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read stdin: {e}");
                break;
            }
        }
    }

    info!("stdin closed, stopping once the queue is empty");
    while matches!(queue.len(&key).await, Ok(n) if n > 0) {
        if shutdown.is_cancelled() {
            return;
        }
        tokio::time::sleep(DRAIN_POLL).await;
    }
    shutdown.cancel();
}
