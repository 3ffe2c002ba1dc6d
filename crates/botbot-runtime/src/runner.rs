//! The ingestion loop.
//!
//! ```text
//!   ┌─────────┐  pop (bounded wait)  ┌────────────┐
//!   │ waiting │ ───────────────────▶ │ processing │
//!   └─────────┘ ◀─────────────────── └────────────┘
//!                  always, one event
//! ```
//!
//! Nothing that goes wrong while processing an event ends the loop; only the
//! shutdown token does.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use botbot_core::{EventQueue, IdentityStore, KeyValueStore, Line, ResponseSink};
use botbot_framework::metrics::{QUEUE_DEPTH, TRANSPORT_LATENCY};
use botbot_framework::{Dispatcher, PluginRegistry};
use chrono::Utc;
use futures::FutureExt;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::IdentityCache;
use crate::config::RunnerConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::normalizer::Normalizer;

/// What happened to one popped payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The line was valid; this many invocations were scheduled.
    Dispatched(usize),
    /// Network or channel did not resolve.
    Skipped,
    /// The payload could not be processed.
    Failed,
}

/// Counters kept by a [`PluginRunner`].
#[derive(Debug, Default)]
pub struct RunnerStats {
    received: AtomicU64,
    dispatched: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// A point-in-time copy of [`RunnerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerStatsSnapshot {
    pub received: u64,
    pub dispatched: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl RunnerStats {
    pub fn snapshot(&self) -> RunnerStatsSnapshot {
        RunnerStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: ProcessOutcome) {
        self.received.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            ProcessOutcome::Dispatched(_) => &self.dispatched,
            ProcessOutcome::Skipped => &self.skipped,
            ProcessOutcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Pops packets off the queue and hands them to the dispatcher.
pub struct PluginRunner {
    queue: Arc<dyn EventQueue>,
    normalizer: Normalizer,
    dispatcher: Dispatcher,
    queue_key: String,
    pop_timeout: Duration,
    stats: RunnerStats,
}

impl PluginRunner {
    pub fn new(queue: Arc<dyn EventQueue>, normalizer: Normalizer, dispatcher: Dispatcher) -> Self {
        let defaults = RunnerConfig::default();
        Self {
            queue,
            normalizer,
            dispatcher,
            queue_key: defaults.queue_key.clone(),
            pop_timeout: defaults.pop_timeout(),
            stats: RunnerStats::default(),
        }
    }

    /// Wires a runner from configuration: identity cache, normalizer,
    /// executor and dispatcher.
    pub fn from_config(
        config: &RunnerConfig,
        queue: Arc<dyn EventQueue>,
        identities: Arc<dyn IdentityStore>,
        registry: Arc<PluginRegistry>,
        store: Arc<dyn KeyValueStore>,
        sink: Arc<dyn ResponseSink>,
    ) -> Self {
        let cache = Arc::new(IdentityCache::new(identities, config.identity_cache_ttl()));
        let dispatcher = Dispatcher::new(registry, config.execution.executor(), store, sink)
            .with_command_prefix(config.command_prefix.clone());

        info!(
            execution = ?config.execution,
            command_prefix = %config.command_prefix,
            queue_key = %config.queue_key,
            "Plugin runner configured"
        );

        Self::new(queue, Normalizer::new(cache), dispatcher)
            .with_queue_key(config.queue_key.clone())
            .with_pop_timeout(config.pop_timeout())
    }

    /// Sets the queue key (builder pattern).
    pub fn with_queue_key(mut self, key: impl Into<String>) -> Self {
        self.queue_key = key.into();
        self
    }

    /// Sets the bounded wait of one pop (builder pattern).
    pub fn with_pop_timeout(mut self, timeout: Duration) -> Self {
        self.pop_timeout = timeout;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn stats(&self) -> RunnerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Runs until `shutdown` is cancelled, then waits for scheduled
    /// invocations to finish.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(queue_key = %self.queue_key, "Plugin runner started");

        loop {
            let popped = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                popped = self.queue.pop(&self.queue_key, self.pop_timeout) => popped,
            };

            match popped {
                Ok(Some(payload)) => {
                    self.record_queue_depth().await;
                    self.process(&payload).await;
                }
                Ok(None) => self.record_queue_depth().await,
                Err(e) => {
                    error!(queue_key = %self.queue_key, error = %e, "Queue pop failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.pop_timeout) => {}
                    }
                }
            }
        }

        info!("Plugin runner stopping, waiting for running plugins");
        self.dispatcher.executor().drain().await;
        let stats = self.stats();
        info!(
            received = stats.received,
            dispatched = stats.dispatched,
            skipped = stats.skipped,
            failed = stats.failed,
            "Plugin runner stopped"
        );
    }

    /// Processes one payload. Failures and panics are logged with the
    /// payload attached.
    pub async fn process(&self, payload: &str) -> ProcessOutcome {
        debug!(payload, "Received payload");

        let result = AssertUnwindSafe(self.try_process(payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(RuntimeError::Panicked(panic_message(panic.as_ref()))));

        let outcome = match result {
            Ok(Some(count)) => ProcessOutcome::Dispatched(count),
            Ok(None) => ProcessOutcome::Skipped,
            Err(e) => {
                error!(payload, error = %e, "Failed to process payload");
                ProcessOutcome::Failed
            }
        };
        self.stats.record(outcome);
        outcome
    }

    async fn try_process(&self, payload: &str) -> RuntimeResult<Option<usize>> {
        let line = self.normalizer.parse(payload).await?;
        record_latency(&line);

        if !line.is_valid() {
            return Ok(None);
        }
        Ok(Some(self.dispatcher.dispatch(Arc::new(line)).await))
    }

    async fn record_queue_depth(&self) {
        match self.queue.len(&self.queue_key).await {
            Ok(depth) => ::metrics::gauge!(QUEUE_DEPTH).set(depth as f64),
            Err(e) => debug!(error = %e, "Could not sample queue depth"),
        }
    }
}

impl std::fmt::Debug for PluginRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRunner")
            .field("queue_key", &self.queue_key)
            .field("pop_timeout", &self.pop_timeout)
            .field("dispatcher", &self.dispatcher)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

fn record_latency(line: &Line) {
    let delay = Utc::now().signed_duration_since(line.received);
    let millis = delay.num_microseconds().unwrap_or(i64::MAX) as f64 / 1000.0;
    ::metrics::histogram!(TRANSPORT_LATENCY).record(millis);
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Waits for Ctrl+C or SIGTERM.
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler, only Ctrl+C will stop the runner");
                wait_for_ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = wait_for_ctrl_c() => {}
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

/// A token that is cancelled on the first shutdown signal.
pub fn shutdown_on_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        trigger.cancel();
    });
    token
}
