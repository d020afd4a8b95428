pub mod sqlite;

use async_trait::async_trait;

use crate::app::{CancelToken, Result};
use crate::domain::{Channel, Item, NewRule, NotificationRecord, Rule, Server, Subreddit};

pub use sqlite::SqliteStore;

/// Persistence contract shared by the evaluator, the dispatcher and the
/// rule-creation flow.
///
/// Every call observes `cancel` and is bounded by the store's operation
/// timeout. All `resolve_or_create_*` calls are insert-if-absent and compare
/// external ids case-insensitively.
#[async_trait]
pub trait RuleStore: Send + Sync {
    // Reference entities
    async fn resolve_or_create_server(&self, cancel: &CancelToken, external_id: &str)
        -> Result<Server>;
    async fn resolve_or_create_channel(
        &self,
        cancel: &CancelToken,
        external_id: &str,
        server_id: i64,
    ) -> Result<Channel>;
    async fn resolve_or_create_subreddit(
        &self,
        cancel: &CancelToken,
        external_id: &str,
    ) -> Result<Subreddit>;
    async fn all_subreddits(&self, cancel: &CancelToken) -> Result<Vec<Subreddit>>;
    /// Subreddits with at least one rule: the ones worth polling.
    async fn subreddits_with_rules(&self, cancel: &CancelToken) -> Result<Vec<Subreddit>>;
    async fn channel_external_id(&self, cancel: &CancelToken, channel_id: i64) -> Result<String>;

    // Items
    async fn resolve_or_create_item(
        &self,
        cancel: &CancelToken,
        item: &Item,
        subreddit_id: i64,
    ) -> Result<i64>;

    // Rules
    async fn insert_rule(&self, cancel: &CancelToken, rule: &NewRule) -> Result<Rule>;
    async fn rules_for_subreddit(&self, cancel: &CancelToken, subreddit_id: i64)
        -> Result<Vec<Rule>>;

    // Delivery records
    async fn notification_count(
        &self,
        cancel: &CancelToken,
        item_id: i64,
        channel_id: i64,
        rule_id: i64,
    ) -> Result<i64>;
    /// Returns the already stored record when the triple exists.
    async fn insert_notification(
        &self,
        cancel: &CancelToken,
        item_id: i64,
        channel_id: i64,
        rule_id: i64,
    ) -> Result<NotificationRecord>;
}
