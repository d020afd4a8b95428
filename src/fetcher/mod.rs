pub mod http_fetcher;
pub mod listing;

use async_trait::async_trait;

use crate::app::Result;
use crate::domain::Item;

pub use http_fetcher::HttpFeedClient;

/// Fetches one subreddit listing and decodes it into items.
#[async_trait]
pub trait FeedClient {
    async fn fetch(&self, url: &str) -> Result<Vec<Item>>;
}
