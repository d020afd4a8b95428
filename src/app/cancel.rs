//! Process-wide cancellation signal.
//!
//! A [`CancelToken`] is cloned into every component that performs store,
//! network or delivery calls. Cancelling any clone wakes every waiter.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::app::{Result, SpyError};

#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender outlives every token.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Run `fut` bounded by `limit`, aborting early when `cancel` fires.
pub async fn bounded<T, F>(
    cancel: &CancelToken,
    operation: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(SpyError::Cancelled(operation));
    }

    tokio::select! {
        _ = cancel.cancelled() => Err(SpyError::Cancelled(operation)),
        res = tokio::time::timeout(limit, fut) => match res {
            Ok(inner) => inner,
            Err(_) => Err(SpyError::Timeout {
                operation,
                millis: limit.as_millis(),
            }),
        },
    }
}
