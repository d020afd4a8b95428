use url::Url;

use crate::domain::Item;
use crate::messenger::RenderedMessage;

/// Upper bound, in bytes, of the body excerpt shown in a notification.
pub const SUMMARY_LIMIT: usize = 1024;

/// Byte prefix of `text` no longer than `limit`, backed off to the previous
/// character boundary so the result stays valid UTF-8.
pub fn truncate_bytes(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Thumbnails are cosmetic: anything that is not an absolute URL
/// (`self`, `default`, `nsfw`, empty) is dropped.
pub fn parse_thumbnail(raw: &str) -> Option<Url> {
    Url::parse(raw).ok().filter(|u| u.has_host())
}

pub fn render(item: &Item) -> RenderedMessage {
    RenderedMessage {
        title: item.title.clone(),
        url: item.link(),
        author: item.author.clone(),
        summary: truncate_bytes(&item.body, SUMMARY_LIMIT).to_string(),
        thumbnail: parse_thumbnail(&item.thumbnail),
    }
}
