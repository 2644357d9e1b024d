mod fetch;
mod parse;

pub use fetch::{fetch_feed, fetch_feed_bytes};
pub use parse::{FeedDocument, FeedEntry, MAX_FEED_ENTRIES, parse_feed};
