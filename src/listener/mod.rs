//! Listener loop - the loader's worker pool
//!
//! Each worker repeatedly:
//! - Receives one delivery from the broker
//! - Decodes and validates the job message
//! - Executes every root action of the message
//! - Publishes a derived message for each child that names a queue
//! - Acknowledges the delivery with the overall outcome
//!
//! A delivery is handled by exactly one worker from start to finish. Shutdown
//! is cooperative: workers stop between messages, never in the middle of one.

mod broker;
mod spool;

pub use broker::{Broker, BrokerError, Delivery, MemoryBroker};
pub use spool::SpoolBroker;

use crate::config::{validate, Config};
use crate::executor::{ActionExecutor, ActionResult, FailureReason};
use crate::memory::MemoryMonitor;
use crate::message::{Action, JobMessage};
use crate::retrieval::{
    build_http_client, ChromiumRenderer, ChromiumSettings, ContentRetriever, PageCache,
    RenderClient,
};
use crate::storage::AssetStore;
use crate::LoaderError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Pause after a broker error before the worker asks again
const BROKER_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Counters shared by all workers
#[derive(Debug, Default)]
pub struct ListenerStats {
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    published: AtomicU64,
}

impl ListenerStats {
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    fn record(&self, result: &ActionResult) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        if result.is_success() {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Worker pool consuming job messages from a broker
pub struct Listener {
    broker: Arc<dyn Broker>,
    executor: Arc<ActionExecutor>,
    workers: usize,
    shutdown: CancellationToken,
    stats: Arc<ListenerStats>,
}

impl Listener {
    /// Creates a listener running `workers` concurrent workers (at least one)
    pub fn new(broker: Arc<dyn Broker>, executor: Arc<ActionExecutor>, workers: usize) -> Self {
        Self {
            broker,
            executor,
            workers: workers.max(1),
            shutdown: CancellationToken::new(),
            stats: Arc::new(ListenerStats::default()),
        }
    }

    /// Builds the render client, HTTP client and executor described by `config`
    ///
    /// # Returns
    ///
    /// * `Ok(Listener)` - Ready to `run`; the browser is launched on first render
    /// * `Err(LoaderError::Config)` - `config` does not pass validation
    /// * `Err(LoaderError::Reqwest)` - The HTTP client could not be built
    pub fn from_config(
        config: &Config,
        broker: Arc<dyn Broker>,
        store: Arc<dyn AssetStore>,
        memory: Arc<dyn MemoryMonitor>,
    ) -> Result<Self, LoaderError> {
        validate(config)?;
        let user_agent = config.user_agent.user_agent();

        let renderer = Arc::new(ChromiumRenderer::new(ChromiumSettings {
            executable: config.render.chrome_path.clone(),
            user_agent: user_agent.clone(),
        }));
        // Bounded by validation, so the cast cannot wrap
        let horizon = chrono::Duration::seconds(config.render.cache_horizon_secs as i64);
        let render = Arc::new(RenderClient::new(
            renderer,
            PageCache::new(config.render.cache_capacity, horizon),
            Arc::clone(&memory),
            Duration::from_secs(config.render.timeout_secs),
        ));

        let http = build_http_client(&config.http, &user_agent)?;
        let executor = ActionExecutor::new(
            ContentRetriever::new(render, http),
            store,
            memory,
            config.loader.disable_headless,
        );

        tracing::info!(
            "Listener for queue {} with {} worker(s), headless {}",
            config.loader.queue,
            config.loader.worker_count(),
            if config.loader.disable_headless {
                "disabled"
            } else {
                "allowed"
            }
        );

        Ok(Self::new(
            broker,
            Arc::new(executor),
            config.loader.worker_count(),
        ))
    }

    /// Token that stops the workers once cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    /// Runs the workers until the broker is exhausted or shutdown is requested
    ///
    /// The shared render cache is released before returning.
    pub async fn run(&self) -> Result<(), LoaderError> {
        tracing::info!("Starting {} worker(s)", self.workers);

        let mut workers = JoinSet::new();
        for n in 0..self.workers {
            let worker = Worker {
                label: format!("worker-{}", n),
                broker: Arc::clone(&self.broker),
                executor: Arc::clone(&self.executor),
                shutdown: self.shutdown.clone(),
                stats: Arc::clone(&self.stats),
            };
            let span = tracing::info_span!("worker", label = %worker.label);
            workers.spawn(worker.run().instrument(span));
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Worker task ended abnormally: {}", e);
            }
        }

        let released = self
            .executor
            .retriever()
            .render_client()
            .clear_cache()
            .await;
        tracing::info!(
            "Listener stopped: {} processed, {} succeeded, {} failed, {} published, {} cached pages released",
            self.stats.processed(),
            self.stats.succeeded(),
            self.stats.failed(),
            self.stats.published(),
            released
        );
        Ok(())
    }
}

struct Worker {
    label: String,
    broker: Arc<dyn Broker>,
    executor: Arc<ActionExecutor>,
    shutdown: CancellationToken,
    stats: Arc<ListenerStats>,
}

impl Worker {
    async fn run(self) {
        tracing::debug!("[{}] started", self.label);
        loop {
            let received = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("[{}] shutdown requested", self.label);
                    break;
                }
                received = self.broker.receive() => received,
            };

            match received {
                Ok(Some(delivery)) => self.handle(delivery).await,
                Ok(None) => {
                    tracing::debug!("[{}] broker has no more messages", self.label);
                    break;
                }
                Err(e) => {
                    tracing::error!("[{}] broker receive failed: {}", self.label, e);
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(BROKER_RETRY_DELAY) => {}
                    }
                }
            }
        }
        tracing::debug!("[{}] stopped", self.label);
    }

    async fn handle(&self, delivery: Delivery) {
        let result = match JobMessage::from_slice(&delivery.body) {
            Ok(message) => self.execute_message(&message).await,
            Err(e) => {
                tracing::warn!(
                    "[{}] rejecting malformed message {}: {}",
                    self.label,
                    delivery.id,
                    e
                );
                ActionResult::FailIrreversible(FailureReason::MalformedMessage(e.to_string()))
            }
        };

        self.stats.record(&result);
        if let Err(e) = self.broker.acknowledge(&delivery, &result).await {
            tracing::error!(
                "[{}] failed to acknowledge {}: {}",
                self.label,
                delivery.id,
                e
            );
        }
    }

    /// Executes every root action; the first failure becomes the message outcome
    async fn execute_message(&self, message: &JobMessage) -> ActionResult {
        let mut outcome = ActionResult::Success;

        for root in &message.actions {
            let mut action = root.clone();
            let result = self
                .executor
                .execute(&mut action, &message.data, &self.label)
                .await;

            match result {
                ActionResult::Success => self.forward_children(message, action.actions).await,
                failure => {
                    if outcome.is_success() {
                        outcome = failure;
                    }
                }
            }
        }

        outcome
    }

    async fn forward_children(&self, message: &JobMessage, children: Vec<Action>) {
        for child in children {
            let Some(queue) = child.queue.clone().filter(|queue| !queue.is_empty()) else {
                tracing::debug!("[{}] dropping child action without a queue", self.label);
                continue;
            };

            let body = match message.derive(child).to_vec() {
                Ok(body) => body,
                Err(e) => {
                    tracing::error!("[{}] cannot encode message for {}: {}", self.label, queue, e);
                    continue;
                }
            };

            match self.broker.publish(&queue, body).await {
                Ok(()) => {
                    self.stats.published.fetch_add(1, Ordering::Relaxed);
                    tracing::info!("[{}] forwarded next stage to {}", self.label, queue);
                }
                Err(e) => {
                    tracing::error!("[{}] failed to publish to {}: {}", self.label, queue, e)
                }
            }
        }
    }
}

/// Cancels `shutdown` on Ctrl+C
pub fn setup_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl+C, finishing in-flight messages...");
                shutdown.cancel();
            }
            Err(e) => {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
        }
    });
}
