// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub(crate) mod mp3;

pub use mp3::{FrameHeader, MAX_RESYNC_BYTES, Mp3DurationDecoder};

use url::Url;

use crate::error::{DurationError, FetchError, FormatError};
use crate::feed::FeedEntry;
use crate::http::{FetchLimits, HttpClient, HttpResponse, is_success};

/// Parse an inline duration: plain seconds, `MM:SS` or `HH:MM:SS`
pub fn parse_duration(value: &str) -> Result<u64, FormatError> {
    let trimmed = value.trim();
    let invalid = |reason: &str| FormatError::Duration {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let segments: Vec<&str> = trimmed.split(':').collect();
    if segments.len() > 3 {
        return Err(invalid("more than three segments"));
    }

    // Rightmost segment is seconds, then minutes, then hours
    segments
        .iter()
        .rev()
        .zip([1u64, 60, 3600])
        .try_fold(0u64, |total, (segment, unit)| {
            if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("expected whole numbers"));
            }
            segment
                .parse::<u64>()
                .ok()
                .and_then(|n| n.checked_mul(unit))
                .and_then(|n| total.checked_add(n))
                .ok_or_else(|| invalid("value out of range"))
        })
}

/// Resolve an entry's duration in whole seconds.
///
/// The inline duration wins whenever the feed provides one. Otherwise, with
/// `decode_audio` set, the enclosure is streamed and its MP3 frames are
/// counted. Without either source the duration is unknown and reported as 0.
pub async fn resolve_duration<C: HttpClient + ?Sized>(
    client: &C,
    entry: &FeedEntry,
    decode_audio: bool,
    limits: &FetchLimits,
) -> Result<u64, DurationError> {
    if let Some(inline) = &entry.duration {
        return Ok(parse_duration(inline)?);
    }

    match &entry.enclosure {
        Some(url) if decode_audio => {
            tracing::debug!(title = %entry.title, %url, "no inline duration, decoding audio");
            decode_remote_duration(client, url, limits).await
        }
        _ => Ok(0),
    }
}

/// Stream an MP3 resource and sum the playback time of its frames.
///
/// The fetch deadline applies to the response headers and to each chunk
/// separately, so only a stalled download times out.
pub async fn decode_remote_duration<C: HttpClient + ?Sized>(
    client: &C,
    url: &Url,
    limits: &FetchLimits,
) -> Result<u64, DurationError> {
    let url = url.as_str();
    let response = limits.run(url, open_stream(client, url)).await?;

    let decode_error = |source| DurationError::Decode {
        url: url.to_string(),
        source,
    };

    let mut decoder = Mp3DurationDecoder::new();
    let mut stream = response.body;

    while let Some(chunk) = limits.next_chunk(url, &mut stream).await? {
        decoder.push(&chunk).map_err(decode_error)?;
    }

    let frames = decoder.frames();
    let duration = decoder.finish().map_err(decode_error)?;
    tracing::debug!(url, frames, secs = duration.as_secs_f64(), "audio decoded");

    Ok(duration.as_secs_f64().round() as u64)
}

async fn open_stream<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<HttpResponse, FetchError> {
    let response = client
        .get_stream(url)
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

    Ok(response)
}
