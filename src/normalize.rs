// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::duration::resolve_duration;
use crate::error::{FormatError, NormalizeError};
use crate::feed::FeedEntry;
use crate::http::{FetchLimits, HttpClient};
use crate::store::PodcastId;

/// The persistable form of a feed entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEpisode {
    pub podcast_id: PodcastId,
    /// Feed GUID, or the enclosure URL when the feed has none
    pub guid: String,
    pub title: String,
    pub source_url: Url,
    pub published_at: DateTime<Utc>,
    pub duration_secs: u64,
}

/// RFC 1123 date-time without the zone, e.g. `Mon, 02 Jan 2006 15:04:05`
const RFC1123_NAIVE: &str = "%a, %d %b %Y %H:%M:%S";
const RFC1123_NUMERIC_ZONE: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Zone abbreviations seen in the wild, with their UTC offsets in hours
const NAMED_ZONES: &[(&str, i32)] = &[
    ("GMT", 0),
    ("UT", 0),
    ("UTC", 0),
    ("Z", 0),
    ("EST", -5),
    ("EDT", -4),
    ("CST", -6),
    ("CDT", -5),
    ("MST", -7),
    ("MDT", -6),
    ("PST", -8),
    ("PDT", -7),
    ("BST", 1),
    ("CET", 1),
    ("CEST", 2),
    ("EET", 2),
    ("EEST", 3),
    ("IST", 5),
    ("JST", 9),
    ("AEST", 10),
    ("AEDT", 11),
];

/// Parse a feed timestamp, trying each known encoding in turn.
///
/// Order: RFC 1123 with numeric offset, RFC 1123 with a named zone, lenient
/// RFC 2822 (single-digit days, missing weekday), then RFC 3339.
pub fn parse_published(value: &str) -> Result<DateTime<Utc>, FormatError> {
    let value = value.trim();

    DateTime::parse_from_str(value, RFC1123_NUMERIC_ZONE)
        .ok()
        .or_else(|| parse_named_zone(value))
        .or_else(|| DateTime::parse_from_rfc2822(value).ok())
        .or_else(|| DateTime::parse_from_rfc3339(value).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| FormatError::Timestamp {
            value: value.to_string(),
        })
}

fn parse_named_zone(value: &str) -> Option<DateTime<FixedOffset>> {
    let (rest, zone) = value.rsplit_once(' ')?;
    let hours = NAMED_ZONES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(zone))
        .map(|(_, hours)| *hours)?;
    let naive = NaiveDateTime::parse_from_str(rest, RFC1123_NAIVE).ok()?;
    let offset = FixedOffset::east_opt(hours * 3600)?;
    naive.and_local_timezone(offset).single()
}

/// Turn one feed entry into a [`CanonicalEpisode`].
///
/// Timestamp and duration problems are errors; callers decide whether to
/// skip the entry or abort.
pub async fn normalize_entry<C: HttpClient + ?Sized>(
    client: &C,
    podcast_id: PodcastId,
    entry: &FeedEntry,
    decode_audio: bool,
    limits: &FetchLimits,
) -> Result<CanonicalEpisode, NormalizeError> {
    let source_url = entry
        .enclosure
        .clone()
        .ok_or_else(|| NormalizeError::MissingEnclosure {
            title: entry.title.clone(),
        })?;

    let published_at = entry
        .published_on
        .as_deref()
        .ok_or(FormatError::MissingTimestamp)
        .and_then(parse_published)?;

    let guid = entry
        .guid
        .clone()
        .unwrap_or_else(|| source_url.to_string());

    let duration_secs = resolve_duration(client, entry, decode_audio, limits).await?;

    Ok(CanonicalEpisode {
        podcast_id,
        guid,
        title: entry.title.clone(),
        source_url,
        published_at,
        duration_secs,
    })
}
