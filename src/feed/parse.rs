// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use url::Url;

use crate::error::FeedError;

/// Upper bound on entries handed downstream per fetch
pub const MAX_FEED_ENTRIES: usize = 20;

/// A decoded feed, already truncated to [`MAX_FEED_ENTRIES`]
#[derive(Debug, Clone)]
pub struct FeedDocument {
    pub title: String,
    pub entries: Vec<FeedEntry>,
}

/// One `<item>` as found in the feed, before any normalization
#[derive(Debug, Clone, Default)]
pub struct FeedEntry {
    pub title: String,
    pub guid: Option<String>,
    /// Raw `pubDate` text
    pub published_on: Option<String>,
    pub enclosure: Option<Url>,
    /// Raw duration text: seconds, `MM:SS` or `HH:MM:SS`
    pub duration: Option<String>,
}

impl FeedEntry {
    /// GUID, or the enclosure URL when the feed has none
    pub fn stable_id(&self) -> Option<String> {
        self.guid
            .clone()
            .or_else(|| self.enclosure.as_ref().map(Url::to_string))
    }
}

/// Parse RSS feed XML bytes, keeping the first [`MAX_FEED_ENTRIES`] items in document order
pub fn parse_feed(xml_bytes: &[u8]) -> Result<FeedDocument, FeedError> {
    let channel = rss::Channel::read_from(xml_bytes)?;

    let entries = channel
        .items()
        .iter()
        .take(MAX_FEED_ENTRIES)
        .map(parse_entry)
        .collect();

    Ok(FeedDocument {
        title: channel.title().to_string(),
        entries,
    })
}

fn parse_entry(item: &rss::Item) -> FeedEntry {
    let title = item
        .title()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("Untitled Episode")
        .to_string();

    // An unparseable enclosure URL is treated like a missing one
    let enclosure = item
        .enclosure()
        .and_then(|enc| Url::parse(enc.url().trim()).ok());

    FeedEntry {
        title,
        guid: item.guid().and_then(|g| non_empty(g.value())),
        published_on: item.pub_date().and_then(non_empty),
        enclosure,
        duration: duration_field(item),
    }
}

/// `itunes:duration`, falling back to any other namespaced `duration` element
fn duration_field(item: &rss::Item) -> Option<String> {
    item.itunes_ext()
        .and_then(|ext| ext.duration())
        .and_then(non_empty)
        .or_else(|| {
            item.extensions()
                .values()
                .filter_map(|elements| elements.get("duration"))
                .flatten()
                .find_map(|ext| ext.value().and_then(non_empty))
        })
}

fn non_empty(value: &str) -> Option<String> {
    Some(value.trim())
        .filter(|v| !v.is_empty())
        .map(String::from)
}
