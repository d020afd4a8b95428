//! Discord REST delivery.
//!
//! Posts a single link embed per notification to
//! `POST {api_base}/channels/{channel_id}/messages`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::Serialize;

use crate::app::{Result, SpyError};
use crate::messenger::{Messenger, RenderedMessage};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Discord rejects embeds whose title or author name exceeds this many
/// characters.
pub const EMBED_TITLE_LIMIT: usize = 256;

/// The first `limit` characters of `text`.
fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[derive(Debug, Serialize)]
struct MessageSend<'a> {
    embeds: Vec<Embed<'a>>,
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    title: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    url: &'a str,
    author: EmbedAuthor<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<EmbedField<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<EmbedThumbnail<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedAuthor<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct EmbedField<'a> {
    name: &'static str,
    value: &'a str,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct EmbedThumbnail<'a> {
    url: &'a str,
}

impl<'a> From<&'a RenderedMessage> for MessageSend<'a> {
    fn from(message: &'a RenderedMessage) -> Self {
        let mut fields = Vec::new();
        // Discord rejects empty field values.
        if !message.summary.is_empty() {
            fields.push(EmbedField {
                name: "Summary",
                value: &message.summary,
                inline: true,
            });
        }

        Self {
            embeds: vec![Embed {
                kind: "link",
                title: truncate_chars(&message.title, EMBED_TITLE_LIMIT),
                url: &message.url,
                author: EmbedAuthor {
                    name: truncate_chars(&message.author, EMBED_TITLE_LIMIT),
                },
                fields,
                thumbnail: message
                    .thumbnail
                    .as_ref()
                    .map(|u| EmbedThumbnail { url: u.as_str() }),
            }],
        }
    }
}

pub struct DiscordMessenger {
    client: Client,
    api_base: String,
}

impl DiscordMessenger {
    pub fn new(token: &str, api_base: &str, timeout: Duration) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bot {}", token))
            .map_err(|e| SpyError::Config(format!("invalid Discord token: {}", e)))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .user_agent(concat!(
                "DiscordBot (https://github.com/meriley/reddit-spy, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{}/messages", self.api_base, channel_id)
    }
}

#[async_trait]
impl Messenger for DiscordMessenger {
    async fn deliver(&self, destination: &str, message: &RenderedMessage) -> Result<()> {
        let payload = MessageSend::from(message);
        let response = self
            .client
            .post(self.messages_url(destination))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpyError::Delivery {
                destination: destination.to_string(),
                reason: format!("{}: {}", status, body),
            });
        }

        Ok(())
    }
}
