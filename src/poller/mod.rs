//! Fixed-rate listing pollers.
//!
//! Each [`Poller`] drives one subreddit on its own task: every tick it
//! fetches the listing once and publishes the decoded batch onto the shared
//! output channel. A failed fetch publishes an empty batch and the schedule
//! carries on.

pub mod registry;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::domain::Item;
use crate::fetcher::FeedClient;

pub use registry::PollerRegistry;

pub const DEFAULT_URL_TEMPLATE: &str = "https://www.reddit.com/r/{subreddit}/.json";

/// A batch of items from one fetch, possibly empty.
pub type Batch = Vec<Item>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerSettings {
    pub interval: Duration,
    pub timeout: Duration,
    /// Listing URL with a `{subreddit}` placeholder.
    pub url_template: String,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
        }
    }
}

impl PollerSettings {
    pub fn listing_url(&self, subreddit: &str) -> String {
        self.url_template.replace("{subreddit}", subreddit)
    }
}

pub struct Poller {
    source: String,
    url: String,
    interval: Duration,
    timeout: Duration,
    client: Arc<dyn FeedClient + Send + Sync>,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    pub fn new(
        source: &str,
        url: String,
        interval: Duration,
        timeout: Duration,
        client: Arc<dyn FeedClient + Send + Sync>,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            source: source.to_string(),
            url,
            interval,
            timeout,
            client,
            stop_tx,
            task: Mutex::new(None),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Spawn the polling task. Returns `false` when the poller was already
    /// started or has been stopped.
    pub fn start(&self, output: mpsc::Sender<Batch>) -> bool {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() || self.is_stopped() {
            return false;
        }

        info!(source = %self.source, url = %self.url, "starting poller");
        *task = Some(tokio::spawn(run(
            self.source.clone(),
            self.url.clone(),
            self.interval,
            self.timeout,
            self.client.clone(),
            self.stop_tx.subscribe(),
            output,
        )));
        true
    }

    /// Halt future fetches. Safe to call any number of times and while a
    /// fetch is in flight; nothing is published after this returns.
    pub fn stop(&self) {
        if !self.stop_tx.send_replace(true) {
            info!(source = %self.source, "stopping poller");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        !self.is_stopped() && task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

async fn stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn run(
    source: String,
    url: String,
    period: Duration,
    timeout: Duration,
    client: Arc<dyn FeedClient + Send + Sync>,
    mut stop_rx: watch::Receiver<bool>,
    output: mpsc::Sender<Batch>,
) {
    let mut timer = interval_at(Instant::now() + period, period);
    // Keep the schedule on its original grid when a fetch overruns a slot.
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = stopped(&mut stop_rx) => break,
            _ = timer.tick() => {}
        }

        let batch = tokio::select! {
            biased;
            _ = stopped(&mut stop_rx) => break,
            res = tokio::time::timeout(timeout, client.fetch(&url)) => match res {
                Ok(Ok(items)) => {
                    debug!(source = %source, count = items.len(), "fetched listing");
                    items
                }
                Ok(Err(e)) => {
                    warn!(source = %source, error = %e, "listing fetch failed");
                    Vec::new()
                }
                Err(_) => {
                    warn!(source = %source, timeout_ms = timeout.as_millis() as u64, "listing fetch timed out");
                    Vec::new()
                }
            },
        };

        if *stop_rx.borrow() {
            break;
        }

        tokio::select! {
            biased;
            _ = stopped(&mut stop_rx) => break,
            sent = output.send(batch) => {
                if sent.is_err() {
                    debug!(source = %source, "batch channel closed");
                    break;
                }
            }
        }
    }

    debug!(source = %source, "poller task finished");
}
