use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::app::{Result, SpyError};
use crate::domain::Item;
use crate::fetcher::{listing, FeedClient};

const USER_AGENT: &str = concat!("reddit-spy/", env!("CARGO_PKG_VERSION"));

pub struct HttpFeedClient {
    client: Client,
}

impl HttpFeedClient {
    /// `timeout` bounds the whole request, body included.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch(&self, url: &str) -> Result<Vec<Item>> {
        let response = self.client.get(url).send().await?;

        if response.status() != StatusCode::OK {
            return Err(SpyError::Other(format!(
                "unexpected status {} from {}",
                response.status(),
                url
            )));
        }

        let body = response.bytes().await?;
        listing::decode(&body)
    }
}
