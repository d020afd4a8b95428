pub mod item;
pub mod notification;
pub mod reference;
pub mod rule;

pub use item::Item;
pub use notification::{MatchResult, NotificationRecord};
pub use reference::{normalize_external_id, Channel, Server, Subreddit};
pub use rule::{MatchMode, NewRule, Rule, TargetField};
