//! Reference entities: where posts come from and where notifications go.

use serde::{Deserialize, Serialize};

/// External ids are compared case-insensitively; everything is stored folded.
pub fn normalize_external_id(id: &str) -> String {
    id.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subreddit {
    pub id: i64,
    pub external_id: String,
}

impl Subreddit {
    pub fn new(id: i64, external_id: &str) -> Self {
        Self {
            id,
            external_id: normalize_external_id(external_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: i64,
    pub external_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub external_id: String,
    pub server_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_external_id() {
        assert_eq!(normalize_external_id("  AskReddit "), "askreddit");
        assert_eq!(normalize_external_id("1234567890"), "1234567890");
    }

    #[test]
    fn test_subreddit_new_folds_case() {
        let sr = Subreddit::new(3, "Rust");
        assert_eq!(sr.external_id, "rust");
        assert_eq!(sr.id, 3);
    }
}
