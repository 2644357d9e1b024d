// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::store::PodcastId;

/// Errors that can occur while talking to a remote host
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed for {url}: {source}")]
    RequestFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Stream error while reading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} timed out after {timeout:?}")]
    TimedOut { url: String, timeout: Duration },

    #[error("Request to {url} was cancelled")]
    Cancelled { url: String },
}

/// Errors that can occur when fetching or parsing RSS feeds
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to parse RSS feed: {0}")]
    Parse(#[from] rss::Error),
}

/// Errors for free-text fields that do not match any known format
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Invalid duration '{value}': {reason}")]
    Duration { value: String, reason: String },

    #[error("Unrecognized timestamp '{value}'")]
    Timestamp { value: String },

    #[error("Missing published date")]
    MissingTimestamp,
}

/// Errors raised while decoding an MP3 byte stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("No MPEG audio frames found in stream")]
    NoFrames,

    #[error("Lost frame sync at byte {offset} after skipping {skipped} bytes")]
    LostSync { offset: u64, skipped: usize },
}

/// Errors that can occur while resolving an episode's duration
#[derive(Error, Debug)]
pub enum DurationError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Failed to fetch audio: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to decode audio from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: DecodeError,
    },
}

/// Errors that turn a single feed entry into a skipped episode
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Episode '{title}' has no enclosure (audio file)")]
    MissingEnclosure { title: String },

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Duration unavailable: {0}")]
    Duration(#[from] DurationError),
}

/// Errors raised by the persistence layer
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Podcast {0} is not known")]
    PodcastNotFound(PodcastId),

    #[error("Episode '{guid}' of podcast {podcast_id} is not known")]
    EpisodeNotFound { podcast_id: PodcastId, guid: String },

    #[error("Failed to read store file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write store file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse store JSON in {path}: {source}")]
    JsonParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize store: {0}")]
    JsonSerializeFailed(#[from] serde_json::Error),
}

/// Top-level errors for ingesting a podcast
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Ingestion task failed: {0}")]
    TaskFailed(String),
}
