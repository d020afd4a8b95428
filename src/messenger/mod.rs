pub mod discord;

use async_trait::async_trait;
use url::Url;

use crate::app::Result;

pub use discord::DiscordMessenger;

/// Message content handed to a [`Messenger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub title: String,
    pub url: String,
    pub author: String,
    pub summary: String,
    pub thumbnail: Option<Url>,
}

/// Outbound delivery to a destination channel.
#[async_trait]
pub trait Messenger {
    async fn deliver(&self, destination: &str, message: &RenderedMessage) -> Result<()>;
}
