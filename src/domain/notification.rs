use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Item;

/// Proof that a post was delivered to a channel on behalf of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: i64,
    pub item_id: i64,
    pub channel_id: i64,
    pub rule_id: i64,
    pub notified_at: DateTime<Utc>,
}

/// A positive match handed from the evaluator to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub rule_id: i64,
    pub channel_id: i64,
    pub item_id: i64,
    pub item: Item,
}

impl MatchResult {
    /// The dedup key of this match.
    pub fn triple(&self) -> (i64, i64, i64) {
        (self.item_id, self.channel_id, self.rule_id)
    }
}
