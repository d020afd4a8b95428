//! Wire shape of a subreddit `.json` listing.
//!
//! Only the fields the rules and the rendered message need are decoded;
//! everything else in the document is ignored.

use html_escape::decode_html_entities;
use serde::Deserialize;

use crate::app::Result;
use crate::domain::Item;

#[derive(Debug, Default, Deserialize)]
pub struct Listing {
    #[serde(default)]
    pub data: ListingData,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
pub struct ListingChild {
    pub data: Post,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Post {
    pub author: String,
    pub id: String,
    pub permalink: String,
    pub selftext: String,
    pub subreddit: String,
    pub thumbnail: String,
    pub title: String,
    pub url: String,
}

impl From<Post> for Item {
    fn from(post: Post) -> Self {
        Item {
            external_id: post.id,
            source: post.subreddit,
            author: decode_html_entities(&post.author).to_string(),
            title: decode_html_entities(&post.title).to_string(),
            body: decode_html_entities(&post.selftext).to_string(),
            url: decode_html_entities(&post.url).to_string(),
            permalink: post.permalink,
            thumbnail: decode_html_entities(&post.thumbnail).to_string(),
        }
    }
}

/// Decode a listing document. Entries without an id cannot be deduplicated
/// and are dropped.
pub fn decode(body: &[u8]) -> Result<Vec<Item>> {
    let listing: Listing = serde_json::from_slice(body)?;
    Ok(listing
        .data
        .children
        .into_iter()
        .map(|child| Item::from(child.data))
        .filter(|item| !item.external_id.is_empty())
        .collect())
}
