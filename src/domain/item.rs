use serde::{Deserialize, Serialize};

use crate::domain::reference::normalize_external_id;

const PERMALINK_BASE: &str = "https://www.reddit.com";

/// One post fetched from a subreddit listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Listing id, unique within its subreddit.
    pub external_id: String,
    /// Subreddit name as reported by the listing.
    pub source: String,
    pub author: String,
    pub title: String,
    pub body: String,
    pub url: String,
    pub permalink: String,
    pub thumbnail: String,
}

impl Item {
    pub fn new(source: &str, external_id: &str) -> Self {
        Self {
            external_id: external_id.to_string(),
            source: source.to_string(),
            ..Default::default()
        }
    }

    /// Case-folded source name used to look up the owning subreddit.
    pub fn source_key(&self) -> String {
        normalize_external_id(&self.source)
    }

    /// Best link for the post: the submitted URL, or the permalink when the
    /// listing omitted it.
    pub fn link(&self) -> String {
        if !self.url.is_empty() {
            return self.url.clone();
        }
        if self.permalink.starts_with('/') {
            return format!("{}{}", PERMALINK_BASE, self.permalink);
        }
        self.permalink.clone()
    }
}
