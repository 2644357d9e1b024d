// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bytes::Bytes;

use crate::error::{FeedError, FetchError};
use crate::http::{FetchLimits, HttpClient, is_success};

use super::parse::{FeedDocument, parse_feed};

/// Fetch raw feed bytes from a URL (without parsing)
pub async fn fetch_feed_bytes<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    limits: &FetchLimits,
) -> Result<Bytes, FetchError> {
    limits.run(url, get_feed_body(client, url)).await
}

async fn get_feed_body<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Bytes, FetchError> {
    let response = client
        .get_bytes(url)
        .await
        .map_err(|e| FetchError::RequestFailed {
            url: url.to_string(),
            source: e,
        })?;

    if !is_success(response.status) {
        return Err(FetchError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    Ok(response.body)
}

/// Fetch and parse a podcast feed from a URL
pub async fn fetch_feed<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    limits: &FetchLimits,
) -> Result<FeedDocument, FeedError> {
    let bytes = fetch_feed_bytes(client, url, limits).await?;
    tracing::debug!(url, bytes = bytes.len(), "feed downloaded");
    parse_feed(&bytes)
}
