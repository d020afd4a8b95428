//! Test doubles and fixtures shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::app::{CancelToken, Result, SpyError};
use crate::domain::{
    Channel, Item, MatchMode, NewRule, NotificationRecord, Rule, Server, Subreddit, TargetField,
};
use crate::fetcher::FeedClient;
use crate::messenger::{Messenger, RenderedMessage};
use crate::store::{RuleStore, SqliteStore};

// ============================================================================
// Feed client
// ============================================================================

#[derive(Default)]
pub struct MockFeedClient {
    items: Vec<Item>,
    fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl MockFeedClient {
    pub fn with_items(items: Vec<Item>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedClient for MockFeedClient {
    async fn fetch(&self, url: &str) -> Result<Vec<Item>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(SpyError::Other("connection refused".into()));
        }
        Ok(self.items.clone())
    }
}

// ============================================================================
// Messenger
// ============================================================================

#[derive(Default)]
pub struct MockMessenger {
    sent: Mutex<Vec<(String, RenderedMessage)>>,
    fail: AtomicBool,
    delay: Option<Duration>,
}

impl MockMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let messenger = Self::default();
        messenger.set_failing(true);
        messenger
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, RenderedMessage)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for MockMessenger {
    async fn deliver(&self, destination: &str, message: &RenderedMessage) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(SpyError::Delivery {
                destination: destination.to_string(),
                reason: "503 Service Unavailable".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), message.clone()));
        Ok(())
    }
}

// ============================================================================
// Store
// ============================================================================

/// Sqlite store whose rule lookups take `delay`, counting how many ran.
pub struct SlowRuleStore {
    inner: Arc<SqliteStore>,
    delay: Duration,
    rule_lookups: AtomicUsize,
}

impl SlowRuleStore {
    pub fn new(inner: Arc<SqliteStore>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            rule_lookups: AtomicUsize::new(0),
        }
    }

    pub fn rule_lookups(&self) -> usize {
        self.rule_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuleStore for SlowRuleStore {
    async fn resolve_or_create_server(&self, cancel: &CancelToken, external_id: &str) -> Result<Server> {
        self.inner.resolve_or_create_server(cancel, external_id).await
    }

    async fn resolve_or_create_channel(
        &self,
        cancel: &CancelToken,
        external_id: &str,
        server_id: i64,
    ) -> Result<Channel> {
        self.inner
            .resolve_or_create_channel(cancel, external_id, server_id)
            .await
    }

    async fn resolve_or_create_subreddit(
        &self,
        cancel: &CancelToken,
        external_id: &str,
    ) -> Result<Subreddit> {
        self.inner.resolve_or_create_subreddit(cancel, external_id).await
    }

    async fn all_subreddits(&self, cancel: &CancelToken) -> Result<Vec<Subreddit>> {
        self.inner.all_subreddits(cancel).await
    }

    async fn subreddits_with_rules(&self, cancel: &CancelToken) -> Result<Vec<Subreddit>> {
        self.inner.subreddits_with_rules(cancel).await
    }

    async fn channel_external_id(&self, cancel: &CancelToken, channel_id: i64) -> Result<String> {
        self.inner.channel_external_id(cancel, channel_id).await
    }

    async fn resolve_or_create_item(
        &self,
        cancel: &CancelToken,
        item: &Item,
        subreddit_id: i64,
    ) -> Result<i64> {
        self.inner.resolve_or_create_item(cancel, item, subreddit_id).await
    }

    async fn insert_rule(&self, cancel: &CancelToken, rule: &NewRule) -> Result<Rule> {
        self.inner.insert_rule(cancel, rule).await
    }

    async fn rules_for_subreddit(&self, cancel: &CancelToken, subreddit_id: i64) -> Result<Vec<Rule>> {
        self.rule_lookups.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.rules_for_subreddit(cancel, subreddit_id).await
    }

    async fn notification_count(
        &self,
        cancel: &CancelToken,
        item_id: i64,
        channel_id: i64,
        rule_id: i64,
    ) -> Result<i64> {
        self.inner
            .notification_count(cancel, item_id, channel_id, rule_id)
            .await
    }

    async fn insert_notification(
        &self,
        cancel: &CancelToken,
        item_id: i64,
        channel_id: i64,
        rule_id: i64,
    ) -> Result<NotificationRecord> {
        self.inner
            .insert_notification(cancel, item_id, channel_id, rule_id)
            .await
    }
}

// ============================================================================
// Store fixtures
// ============================================================================

pub struct SeededRule {
    pub server: Server,
    pub channel: Channel,
    pub subreddit: Subreddit,
    pub rule: Rule,
}

/// Store a rule for `subreddit` delivering to `channel` on a fixed test server.
pub async fn seed_rule(
    store: &SqliteStore,
    subreddit: &str,
    channel: &str,
    field: TargetField,
    value: &str,
    mode: MatchMode,
) -> SeededRule {
    let cancel = CancelToken::new();
    let server = store
        .resolve_or_create_server(&cancel, "test-guild")
        .await
        .unwrap();
    let channel = store
        .resolve_or_create_channel(&cancel, channel, server.id)
        .await
        .unwrap();
    let subreddit = store
        .resolve_or_create_subreddit(&cancel, subreddit)
        .await
        .unwrap();
    let rule = store
        .insert_rule(
            &cancel,
            &NewRule {
                target_field: field,
                target_value: value.to_string(),
                mode,
                subreddit_id: subreddit.id,
                channel_id: channel.id,
                server_id: server.id,
            },
        )
        .await
        .unwrap();

    SeededRule {
        server,
        channel,
        subreddit,
        rule,
    }
}
