//! Pipeline wiring and the main event loop.
//!
//! Pollers feed batches into a bounded channel; the loop hands each batch to
//! the evaluator and each match to the dispatcher, and watches for
//! cancellation. The loop itself only ever waits on channels and timers.
//!
//! One batch is evaluated at a time. While it runs the loop stops reading
//! batches, so a slow store fills the batch channel and pollers block on
//! send instead of piling up evaluation tasks. Results keep draining.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::app::{CancelToken, Result};
use crate::config::format_duration;
use crate::dispatcher::{DeliveryOutcome, Dispatcher};
use crate::domain::MatchResult;
use crate::evaluator::{Evaluator, DEFAULT_WORKERS};
use crate::fetcher::FeedClient;
use crate::messenger::Messenger;
use crate::poller::{Batch, PollerRegistry, PollerSettings};
use crate::store::RuleStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub batch_buffer: usize,
    pub result_buffer: usize,
    pub evaluator_workers: usize,
    pub resync_interval: Duration,
    pub op_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_buffer: 10,
            result_buffer: 10,
            evaluator_workers: DEFAULT_WORKERS,
            resync_interval: Duration::from_secs(300),
            op_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    Draining,
    Stopped,
}

pub struct Orchestrator {
    store: Arc<dyn RuleStore>,
    registry: Arc<PollerRegistry>,
    evaluator: Arc<Evaluator>,
    dispatcher: Arc<Dispatcher>,
    cancel: CancelToken,
    batches: mpsc::Receiver<Batch>,
    results_tx: mpsc::Sender<MatchResult>,
    results: mpsc::Receiver<MatchResult>,
    resync_interval: Duration,
    evaluation: Option<JoinHandle<()>>,
    state: watch::Sender<PipelineState>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn RuleStore>,
        client: Arc<dyn FeedClient + Send + Sync>,
        messenger: Arc<dyn Messenger + Send + Sync>,
        poller: PollerSettings,
        settings: PipelineSettings,
        cancel: CancelToken,
    ) -> Self {
        let (batch_tx, batches) = mpsc::channel(settings.batch_buffer.max(1));
        let (results_tx, results) = mpsc::channel(settings.result_buffer.max(1));
        let (state, _) = watch::channel(PipelineState::Running);

        Self {
            registry: Arc::new(PollerRegistry::new(client, poller, batch_tx)),
            evaluator: Arc::new(Evaluator::with_workers(
                store.clone(),
                cancel.clone(),
                settings.evaluator_workers,
            )),
            dispatcher: Arc::new(Dispatcher::new(
                store.clone(),
                messenger,
                cancel.clone(),
                settings.op_timeout,
            )),
            store,
            cancel,
            batches,
            results_tx,
            results,
            resync_interval: settings.resync_interval,
            evaluation: None,
            state,
        }
    }

    /// The registry pollers are added to; shared with the command handlers.
    pub fn registry(&self) -> Arc<PollerRegistry> {
        self.registry.clone()
    }

    pub fn state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Start a poller for every stored subreddit. A store failure here is
    /// fatal for startup.
    pub async fn seed(&self) -> Result<usize> {
        let started = self.registry.sync(self.store.as_ref(), &self.cancel).await?;
        info!(pollers = started, "seeded pollers");
        Ok(started)
    }

    /// Run until the cancellation token fires.
    pub async fn run(mut self) -> Result<()> {
        info!(
            resync = %format_duration(self.resync_interval),
            "pipeline running"
        );

        let mut resync = interval_at(
            Instant::now() + self.resync_interval,
            self.resync_interval,
        );
        resync.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = finished(&mut self.evaluation), if self.evaluation.is_some() => {
                    self.evaluation = None;
                }
                Some(result) = self.results.recv() => self.admit_result(result),
                Some(batch) = self.batches.recv(), if self.evaluation.is_none() => {
                    self.admit_batch(batch);
                }
                _ = resync.tick() => self.spawn_resync(),
            }
        }

        self.state.send_replace(PipelineState::Draining);
        info!("shutting down pipeline");
        self.registry.stop_all();
        self.batches.close();
        self.results.close();

        self.state.send_replace(PipelineState::Stopped);
        info!("pipeline stopped");
        Ok(())
    }

    /// Evaluate off the loop. The loop reads no further batch until this
    /// one is done, so batches finish in arrival order.
    fn admit_batch(&mut self, batch: Batch) {
        if batch.is_empty() {
            return;
        }

        let evaluator = self.evaluator.clone();
        let results = self.results_tx.clone();
        self.evaluation = Some(tokio::spawn(async move {
            match evaluator.evaluate(batch, &results).await {
                Ok(summary) => debug!(
                    items = summary.items,
                    pairs = summary.pairs,
                    matches = summary.matches,
                    skipped = summary.skipped,
                    "batch evaluated"
                ),
                Err(e) => error!(error = %e, "batch evaluation failed"),
            }
        }));
    }

    fn admit_result(&self, result: MatchResult) {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            match dispatcher.deliver(&result).await {
                Ok(DeliveryOutcome::Delivered) => {}
                Ok(outcome) => debug!(
                    rule_id = result.rule_id,
                    post = %result.item.external_id,
                    ?outcome,
                    "delivery skipped"
                ),
                Err(e) => warn!(
                    error = %e,
                    rule_id = result.rule_id,
                    post = %result.item.external_id,
                    "delivery failed"
                ),
            }
        });
    }

    fn spawn_resync(&self) {
        let registry = self.registry.clone();
        let store = self.store.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = registry.sync(store.as_ref(), &cancel).await {
                warn!(error = %e, "poller resync failed");
            }
        });
    }
}

async fn finished(evaluation: &mut Option<JoinHandle<()>>) {
    match evaluation {
        Some(handle) => {
            if let Err(e) = handle.await {
                error!(error = %e, "evaluation task failed");
            }
        }
        None => std::future::pending().await,
    }
}

/// Cancel `cancel` on SIGINT or SIGTERM.
pub fn spawn_signal_handler(cancel: CancelToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        cancel.cancel();
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "could not install signal handlers, falling back to ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {},
        _ = sigint.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
