//! Idempotent notification delivery.
//!
//! The store's unique (item, channel, rule) constraint is what keeps a post
//! from being announced twice across poll cycles and restarts. The dispatcher
//! checks it before sending and records the delivery afterwards.

pub mod render;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use crate::app::cancel::bounded;
use crate::app::{CancelToken, Result};
use crate::domain::MatchResult;
use crate::messenger::Messenger;
use crate::store::RuleStore;

pub use render::{render, truncate_bytes, SUMMARY_LIMIT};

type Triple = (i64, i64, i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The message was sent and recorded.
    Delivered,
    /// A record for the triple already exists.
    AlreadyNotified,
    /// Another invocation in this process is delivering the same triple.
    InFlight,
}

/// Removes its triple from the in-flight set when dropped.
struct Claim<'a> {
    set: &'a Mutex<HashSet<Triple>>,
    key: Triple,
}

impl<'a> Claim<'a> {
    fn acquire(set: &'a Mutex<HashSet<Triple>>, key: Triple) -> Option<Self> {
        let fresh = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key);
        if !fresh {
            return None;
        }
        Some(Self { set, key })
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

pub struct Dispatcher {
    store: Arc<dyn RuleStore>,
    messenger: Arc<dyn Messenger + Send + Sync>,
    cancel: CancelToken,
    op_timeout: Duration,
    in_flight: Mutex<HashSet<Triple>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn RuleStore>,
        messenger: Arc<dyn Messenger + Send + Sync>,
        cancel: CancelToken,
        op_timeout: Duration,
    ) -> Self {
        Self {
            store,
            messenger,
            cancel,
            op_timeout,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Deliver one match at most once. A failed send leaves no record, so
    /// the post is reconsidered if a later poll returns it again.
    pub async fn deliver(&self, result: &MatchResult) -> Result<DeliveryOutcome> {
        let (item_id, channel_id, rule_id) = result.triple();

        let Some(_claim) = Claim::acquire(&self.in_flight, result.triple()) else {
            debug!(item_id, channel_id, rule_id, "delivery already in flight");
            return Ok(DeliveryOutcome::InFlight);
        };

        let count = self
            .store
            .notification_count(&self.cancel, item_id, channel_id, rule_id)
            .await?;
        if count > 0 {
            debug!(item_id, channel_id, rule_id, "already notified");
            return Ok(DeliveryOutcome::AlreadyNotified);
        }

        let destination = self
            .store
            .channel_external_id(&self.cancel, channel_id)
            .await?;
        let message = render(&result.item);

        bounded(
            &self.cancel,
            "deliver message",
            self.op_timeout,
            self.messenger.deliver(&destination, &message),
        )
        .await?;

        let record = self
            .store
            .insert_notification(&self.cancel, item_id, channel_id, rule_id)
            .await?;

        info!(
            notification_id = record.id,
            rule_id,
            channel = %destination,
            post = %result.item.external_id,
            title = %result.item.title,
            "notification sent"
        );
        Ok(DeliveryOutcome::Delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::SpyError;
    use crate::store::SqliteStore;
    use crate::testing::{seed_rule, MockMessenger};
    use crate::domain::{MatchMode, TargetField};

    struct Fixture {
        store: Arc<SqliteStore>,
        messenger: Arc<MockMessenger>,
        dispatcher: Arc<Dispatcher>,
        result: MatchResult,
    }

    async fn fixture(messenger: MockMessenger) -> Fixture {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let cancel = CancelToken::new();
        let seeded = seed_rule(&store, "rust", "chan-42", TargetField::Title, "launch", MatchMode::Partial).await;

        let mut item = crate::domain::Item::new("rust", "t3_launch");
        item.title = "Launch Day".into();
        item.author = "engineer42".into();
        item.url = "https://example.com/launch".into();
        item.body = "x".repeat(2000);
        item.thumbnail = "https://i.example.com/thumb.png".into();

        let item_id = store
            .resolve_or_create_item(&cancel, &item, seeded.subreddit.id)
            .await
            .unwrap();

        let messenger = Arc::new(messenger);
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            messenger.clone(),
            cancel,
            Duration::from_millis(200),
        ));

        Fixture {
            store,
            messenger,
            dispatcher,
            result: MatchResult {
                rule_id: seeded.rule.id,
                channel_id: seeded.channel.id,
                item_id,
                item,
            },
        }
    }

    async fn records(f: &Fixture) -> i64 {
        let (item_id, channel_id, rule_id) = f.result.triple();
        f.store
            .notification_count(&CancelToken::new(), item_id, channel_id, rule_id)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_delivers_and_records() {
        let f = fixture(MockMessenger::new()).await;

        let outcome = f.dispatcher.deliver(&f.result).await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        let sent = f.messenger.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "chan-42");
        assert_eq!(sent[0].1.title, "Launch Day");
        assert_eq!(sent[0].1.summary.len(), SUMMARY_LIMIT);
        assert_eq!(
            sent[0].1.thumbnail.as_ref().map(|u| u.as_str()),
            Some("https://i.example.com/thumb.png")
        );
        assert_eq!(records(&f).await, 1);
    }

    #[tokio::test]
    async fn test_repeated_delivery_sends_once() {
        let f = fixture(MockMessenger::new()).await;

        for _ in 0..5 {
            f.dispatcher.deliver(&f.result).await.unwrap();
        }

        assert_eq!(f.messenger.sent().len(), 1);
        assert_eq!(records(&f).await, 1);
        assert_eq!(
            f.dispatcher.deliver(&f.result).await.unwrap(),
            DeliveryOutcome::AlreadyNotified
        );
    }

    #[tokio::test]
    async fn test_concurrent_delivery_sends_once() {
        let f = fixture(MockMessenger::new().with_delay(Duration::from_millis(20))).await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = f.dispatcher.clone();
                let result = f.result.clone();
                tokio::spawn(async move { dispatcher.deliver(&result).await })
            })
            .collect();

        let outcomes: Vec<DeliveryOutcome> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|h| h.unwrap().unwrap())
            .collect();

        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == DeliveryOutcome::Delivered)
                .count(),
            1
        );
        assert_eq!(f.messenger.sent().len(), 1);
        assert_eq!(records(&f).await, 1);
    }

    #[tokio::test]
    async fn test_existing_record_blocks_resend() {
        let f = fixture(MockMessenger::new()).await;
        let (item_id, channel_id, rule_id) = f.result.triple();
        f.store
            .insert_notification(&CancelToken::new(), item_id, channel_id, rule_id)
            .await
            .unwrap();

        let outcome = f.dispatcher.deliver(&f.result).await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::AlreadyNotified);
        assert!(f.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delivery_leaves_no_record() {
        let f = fixture(MockMessenger::failing()).await;

        let err = f.dispatcher.deliver(&f.result).await.unwrap_err();
        assert!(matches!(err, SpyError::Delivery { .. }));
        assert_eq!(records(&f).await, 0);

        // The same post showing up again gets another chance.
        f.messenger.set_failing(false);
        assert_eq!(
            f.dispatcher.deliver(&f.result).await.unwrap(),
            DeliveryOutcome::Delivered
        );
        assert_eq!(records(&f).await, 1);
    }

    #[tokio::test]
    async fn test_slow_delivery_times_out() {
        let f = fixture(MockMessenger::new().with_delay(Duration::from_secs(2))).await;

        let err = f.dispatcher.deliver(&f.result).await.unwrap_err();

        assert!(matches!(err, SpyError::Timeout { operation: "deliver message", .. }));
        assert_eq!(records(&f).await, 0);
    }

    #[tokio::test]
    async fn test_unknown_channel_is_an_error() {
        let f = fixture(MockMessenger::new()).await;
        let mut result = f.result.clone();
        result.channel_id = 9999;

        let err = f.dispatcher.deliver(&result).await.unwrap_err();

        assert!(matches!(err, SpyError::ChannelNotFound(9999)));
        assert!(f.messenger.sent().is_empty());
    }

    #[test]
    fn test_claim_releases_on_drop() {
        let set = Mutex::new(HashSet::new());
        let first = Claim::acquire(&set, (1, 2, 3));
        assert!(first.is_some());
        assert!(Claim::acquire(&set, (1, 2, 3)).is_none());
        drop(first);
        assert!(Claim::acquire(&set, (1, 2, 3)).is_some());
    }

    #[test]
    fn test_refused_claim_keeps_holder() {
        let set = Mutex::new(HashSet::new());
        let holder = Claim::acquire(&set, (1, 2, 3)).unwrap();

        assert!(Claim::acquire(&set, (1, 2, 3)).is_none());
        assert!(set.lock().unwrap().contains(&(1, 2, 3)));
        assert!(Claim::acquire(&set, (1, 2, 3)).is_none());

        drop(holder);
        assert!(set.lock().unwrap().is_empty());
    }
}
