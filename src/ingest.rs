// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::error::{FeedError, FetchError, IngestError, NormalizeError};
use crate::feed::{FeedEntry, fetch_feed};
use crate::http::{DEFAULT_FETCH_TIMEOUT, FetchLimits, HttpClient};
use crate::normalize::{CanonicalEpisode, normalize_entry};
use crate::progress::{NoopReporter, ProgressEvent, SharedProgressReporter};
use crate::store::{EpisodeStore, PodcastId};

/// Options for podcast ingestion
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Decode the enclosure's MP3 frames when the feed has no duration
    pub decode_audio: bool,
    /// Deadline for each feed or audio fetch
    pub fetch_timeout: Duration,
    /// Maximum number of entries normalized at once within one podcast
    pub max_concurrent: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            decode_audio: true,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_concurrent: 3,
        }
    }
}

/// Result of ingesting one podcast
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub podcast_id: PodcastId,
    pub feed_title: String,
    /// Episodes stored for the first time
    pub inserted: usize,
    /// Episodes that already existed and were refreshed
    pub updated: usize,
    /// Entries left out (title, error message)
    pub skipped: Vec<(String, String)>,
}

impl IngestReport {
    pub fn stored(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Coordinates feed fetching, normalization and storage.
///
/// Cloning is cheap; clones share collaborators and the cancellation token
/// but no mutable state.
#[derive(Clone)]
pub struct Ingestor {
    client: Arc<dyn HttpClient>,
    store: Arc<dyn EpisodeStore>,
    options: IngestOptions,
    limits: FetchLimits,
    reporter: SharedProgressReporter,
}

impl Ingestor {
    pub fn new(
        client: Arc<dyn HttpClient>,
        store: Arc<dyn EpisodeStore>,
        options: IngestOptions,
    ) -> Self {
        let limits = FetchLimits::new(options.fetch_timeout);
        Self {
            client,
            store,
            options,
            limits,
            reporter: NoopReporter::shared(),
        }
    }

    pub fn with_reporter(mut self, reporter: SharedProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Cancel every in-flight and future fetch of this ingestor and its clones
    pub fn shutdown(&self) {
        self.limits.cancel.cancel();
    }

    /// Fetch a podcast's feed and store up to 20 of its episodes.
    ///
    /// Entries that fail to normalize are skipped and listed in the report.
    /// Audio is only decoded for episodes without a stored duration.
    /// Lookup, fetch, parse and store failures abort the whole batch; in
    /// that case nothing from this run is written.
    pub async fn ingest(&self, podcast_id: PodcastId) -> Result<IngestReport, IngestError> {
        let result = self.run(podcast_id).await;
        if let Err(e) = &result {
            self.reporter.report(ProgressEvent::IngestFailed {
                podcast_id,
                error: e.to_string(),
            });
        }
        result
    }

    async fn run(&self, podcast_id: PodcastId) -> Result<IngestReport, IngestError> {
        let podcast = self.store.find_podcast(podcast_id).await?;
        let feed_url = podcast.feed_url.as_str();

        self.reporter.report(ProgressEvent::FetchingFeed {
            podcast_id,
            url: feed_url.to_string(),
        });

        let document = fetch_feed(self.client.as_ref(), feed_url, &self.limits).await?;

        tracing::info!(
            podcast_id,
            title = %document.title,
            entries = document.entries.len(),
            "feed parsed"
        );
        self.reporter.report(ProgressEvent::FeedParsed {
            podcast_id,
            feed_title: document.title.clone(),
            entries: document.entries.len(),
        });

        let known = if self.options.decode_audio {
            self.store.known_durations(podcast_id).await?
        } else {
            HashMap::new()
        };

        let pending: Vec<_> = document
            .entries
            .iter()
            .map(|entry| self.normalize(podcast_id, entry, &known))
            .collect();

        // `buffered` yields in input order while several entries resolve at once
        let results: Vec<_> = futures::stream::iter(pending)
            .buffered(self.options.max_concurrent.max(1))
            .collect()
            .await;

        if self.limits.cancel.is_cancelled() {
            return Err(FeedError::Fetch(FetchError::Cancelled {
                url: feed_url.to_string(),
            })
            .into());
        }

        let mut episodes = Vec::with_capacity(results.len());
        let mut skipped = Vec::new();

        for (entry, result) in document.entries.iter().zip(results) {
            match result {
                Ok(episode) => {
                    self.reporter.report(ProgressEvent::EpisodeNormalized {
                        podcast_id,
                        episode_title: episode.title.clone(),
                        duration_secs: episode.duration_secs,
                    });
                    episodes.push(episode);
                }
                Err(e) => {
                    tracing::warn!(podcast_id, title = %entry.title, error = %e, "skipping entry");
                    self.reporter.report(ProgressEvent::EpisodeSkipped {
                        podcast_id,
                        episode_title: entry.title.clone(),
                        error: e.to_string(),
                    });
                    skipped.push((entry.title.clone(), e.to_string()));
                }
            }
        }

        let summary = self.store.upsert_episodes(&episodes).await?;

        tracing::info!(
            podcast_id,
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = skipped.len(),
            "episodes stored"
        );
        self.reporter.report(ProgressEvent::IngestCompleted {
            podcast_id,
            inserted: summary.inserted,
            updated: summary.updated,
            skipped: skipped.len(),
        });

        Ok(IngestReport {
            podcast_id,
            feed_title: document.title,
            inserted: summary.inserted,
            updated: summary.updated,
            skipped,
        })
    }

    async fn normalize(
        &self,
        podcast_id: PodcastId,
        entry: &FeedEntry,
        known: &HashMap<String, u64>,
    ) -> Result<CanonicalEpisode, NormalizeError> {
        let stored_secs = entry
            .duration
            .is_none()
            .then(|| entry.stable_id())
            .flatten()
            .and_then(|id| known.get(&id).copied());

        let episode = normalize_entry(
            self.client.as_ref(),
            podcast_id,
            entry,
            self.options.decode_audio && stored_secs.is_none(),
            &self.limits,
        )
        .await?;

        Ok(match stored_secs {
            Some(duration_secs) => CanonicalEpisode {
                duration_secs,
                ..episode
            },
            None => episode,
        })
    }

    /// Ingest in the background. Errors are logged and dropped.
    ///
    /// Only the podcast id crosses into the task, so the caller can finish
    /// its own work without waiting.
    pub fn spawn_refresh(&self, podcast_id: PodcastId) -> JoinHandle<()> {
        let ingestor = self.clone();
        tokio::spawn(
            async move {
                match ingestor.ingest(podcast_id).await {
                    Ok(report) => tracing::info!(
                        stored = report.stored(),
                        skipped = report.skipped.len(),
                        "background refresh finished"
                    ),
                    Err(e) => tracing::warn!(error = %e, "background refresh failed"),
                }
            }
            .instrument(tracing::info_span!("refresh", podcast_id)),
        )
    }

    /// Ingest several podcasts concurrently and wait for all of them.
    ///
    /// Every podcast gets its own task; a failure (or panic) in one does not
    /// affect the others. Results come back in input order.
    pub async fn refresh_all(
        &self,
        podcast_ids: impl IntoIterator<Item = PodcastId>,
    ) -> Vec<(PodcastId, Result<IngestReport, IngestError>)> {
        let handles: Vec<_> = podcast_ids
            .into_iter()
            .map(|podcast_id| {
                let ingestor = self.clone();
                let handle = tokio::spawn(
                    async move { ingestor.ingest(podcast_id).await }
                        .instrument(tracing::info_span!("refresh", podcast_id)),
                );
                (podcast_id, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (podcast_id, handle) in handles {
            let result = handle
                .await
                .unwrap_or_else(|e| Err(IngestError::TaskFailed(e.to_string())));
            results.push((podcast_id, result));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::duration::mp3::tests::mp3_frames;
    use crate::error::StoreError;
    use crate::http::{BufferedResponse, ByteStream, HttpResponse};
    use crate::normalize::CanonicalEpisode;
    use crate::progress::tests::RecordingReporter;
    use crate::store::tests::make_podcast;
    use crate::store::{MemoryStore, Podcast, UpsertSummary};

    #[derive(Default)]
    struct MockHttpClient {
        feeds: HashMap<String, (u16, String)>,
        audio: Vec<u8>,
        /// Split audio into chunks of this size, sent `chunk_delay` apart
        chunk: Option<(usize, Duration)>,
        hang: bool,
        hang_audio: bool,
        audio_requests: AtomicUsize,
    }

    impl MockHttpClient {
        fn with_feed(mut self, podcast_id: PodcastId, status: u16, body: String) -> Self {
            self.feeds.insert(feed_url(podcast_id), (status, body));
            self
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn get_bytes(&self, url: &str) -> Result<BufferedResponse, reqwest::Error> {
            if self.hang {
                futures::future::pending::<()>().await;
            }
            let (status, body) = self
                .feeds
                .get(url)
                .cloned()
                .unwrap_or((404, "Not Found".to_string()));
            Ok(BufferedResponse {
                status,
                body: Bytes::from(body),
            })
        }

        async fn get_stream(&self, _url: &str) -> Result<HttpResponse, reqwest::Error> {
            self.audio_requests.fetch_add(1, Ordering::SeqCst);
            if self.hang_audio {
                futures::future::pending::<()>().await;
            }

            let stream: ByteStream = match self.chunk {
                Some((size, delay)) => {
                    let chunks: Vec<Bytes> =
                        self.audio.chunks(size).map(Bytes::copy_from_slice).collect();
                    Box::pin(futures::stream::iter(chunks).then(move |chunk| async move {
                        tokio::time::sleep(delay).await;
                        Ok::<_, reqwest::Error>(chunk)
                    }))
                }
                None => {
                    let data = Bytes::from(self.audio.clone());
                    Box::pin(futures::stream::once(async move {
                        Ok::<_, reqwest::Error>(data)
                    }))
                }
            };

            Ok(HttpResponse {
                status: 200,
                body: stream,
            })
        }
    }

    /// Store that looks podcasts up but refuses every write
    struct ReadOnlyStore(MemoryStore);

    #[async_trait]
    impl EpisodeStore for ReadOnlyStore {
        async fn find_podcast(&self, id: PodcastId) -> Result<Podcast, StoreError> {
            self.0.find_podcast(id).await
        }

        async fn known_durations(
            &self,
            podcast_id: PodcastId,
        ) -> Result<HashMap<String, u64>, StoreError> {
            self.0.known_durations(podcast_id).await
        }

        async fn upsert_episodes(
            &self,
            _episodes: &[CanonicalEpisode],
        ) -> Result<UpsertSummary, StoreError> {
            Err(StoreError::WriteFailed {
                path: "/read-only/store.json".into(),
                source: std::io::Error::other("read-only"),
            })
        }
    }

    fn feed_url(podcast_id: PodcastId) -> String {
        make_podcast(podcast_id).feed_url.to_string()
    }

    struct Item<'a> {
        guid: Option<&'a str>,
        pub_date: &'a str,
        duration: Option<&'a str>,
        enclosure: bool,
    }

    fn item(guid: &str) -> Item<'_> {
        Item {
            guid: Some(guid),
            pub_date: "Mon, 01 Jan 2024 12:00:00 +0000",
            duration: Some("10:00"),
            enclosure: true,
        }
    }

    fn feed_xml(items: &[Item<'_>]) -> String {
        let body: String = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let guid = item
                    .guid
                    .map(|g| format!("<guid>{g}</guid>"))
                    .unwrap_or_default();
                let duration = item
                    .duration
                    .map(|d| format!("<itunes:duration>{d}</itunes:duration>"))
                    .unwrap_or_default();
                let enclosure = if item.enclosure {
                    format!("<enclosure url=\"https://example.com/audio/{i}.mp3\" type=\"audio/mpeg\"/>")
                } else {
                    String::new()
                };
                format!(
                    "<item><title>Episode {i}</title>{guid}<pubDate>{}</pubDate>{enclosure}{duration}</item>",
                    item.pub_date
                )
            })
            .collect();

        format!(
            r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
  <channel><title>Mock Feed</title><description>Mock</description>{body}</channel>
</rss>"#
        )
    }

    fn ingestor(client: MockHttpClient, store: Arc<dyn EpisodeStore>) -> Ingestor {
        Ingestor::new(Arc::new(client), store, IngestOptions::default())
    }

    #[tokio::test]
    async fn ingest_stores_normalized_episodes() {
        let store = Arc::new(MemoryStore::with_podcasts([make_podcast(1)]));
        let client = MockHttpClient::default().with_feed(1, 200, feed_xml(&[item("a"), item("b")]));

        let report = ingestor(client, store.clone()).ingest(1).await.unwrap();

        assert_eq!(report.feed_title, "Mock Feed");
        assert_eq!(report.inserted, 2);
        assert!(report.skipped.is_empty());

        let data = store.snapshot().await;
        assert_eq!(data.episodes.len(), 2);
        assert!(data.episodes.iter().all(|e| e.duration_secs == 600));
        assert_eq!(data.episodes[0].guid, "a");
    }

    #[tokio::test]
    async fn reingesting_unchanged_feed_creates_no_duplicates() {
        let store = Arc::new(MemoryStore::with_podcasts([make_podcast(1)]));
        let client = MockHttpClient::default().with_feed(1, 200, feed_xml(&[item("a"), item("b")]));
        let ingestor = ingestor(client, store.clone());

        ingestor.ingest(1).await.unwrap();
        let second = ingestor.ingest(1).await.unwrap();

        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 2);
        assert_eq!(store.snapshot().await.episodes.len(), 2);
    }

    #[tokio::test]
    async fn ingest_keeps_only_first_twenty_entries() {
        let guids: Vec<String> = (0..30).map(|i| format!("guid-{i}")).collect();
        let items: Vec<_> = guids.iter().map(|g| item(g)).collect();
        let store = Arc::new(MemoryStore::with_podcasts([make_podcast(1)]));
        let client = MockHttpClient::default().with_feed(1, 200, feed_xml(&items));

        let report = ingestor(client, store.clone()).ingest(1).await.unwrap();

        assert_eq!(report.inserted, 20);
        let data = store.snapshot().await;
        let stored: Vec<_> = data.episodes.iter().map(|e| e.guid.as_str()).collect();
        let expected: Vec<_> = guids[..20].iter().map(String::as_str).collect();
        assert_eq!(stored, expected);
    }

    #[tokio::test]
    async fn ingest_skips_entries_that_fail_to_normalize() {
        let store = Arc::new(MemoryStore::with_podcasts([make_podcast(1)]));
        let items = [
            item("good"),
            Item {
                pub_date: "not-a-date",
                ..item("bad-date")
            },
            Item {
                enclosure: false,
                ..item("no-audio")
            },
            Item {
                duration: Some("forever"),
                ..item("bad-duration")
            },
        ];
        let client = MockHttpClient::default().with_feed(1, 200, feed_xml(&items));

        let report = ingestor(client, store.clone()).ingest(1).await.unwrap();

        assert_eq!(report.inserted, 1);
        let skipped: Vec<_> = report.skipped.iter().map(|(title, _)| title.as_str()).collect();
        assert_eq!(skipped, vec!["Episode 1", "Episode 2", "Episode 3"]);
        assert_eq!(store.snapshot().await.episodes[0].guid, "good");
    }

    #[tokio::test]
    async fn ingest_uses_enclosure_url_when_guid_is_missing() {
        let store = Arc::new(MemoryStore::with_podcasts([make_podcast(1)]));
        let items = [Item {
            guid: None,
            ..item("unused")
        }];
        let client = MockHttpClient::default().with_feed(1, 200, feed_xml(&items));
        let ingestor = ingestor(client, store.clone());

        ingestor.ingest(1).await.unwrap();
        ingestor.ingest(1).await.unwrap();

        let data = store.snapshot().await;
        assert_eq!(data.episodes.len(), 1);
        assert_eq!(data.episodes[0].guid, "https://example.com/audio/0.mp3");
    }

    #[tokio::test]
    async fn ingest_decodes_audio_when_duration_is_missing() {
        let store = Arc::new(MemoryStore::with_podcasts([make_podcast(1)]));
        let items = [Item {
            duration: None,
            ..item("a")
        }];
        let client = MockHttpClient {
            audio: mp3_frames(1000),
            ..Default::default()
        }
        .with_feed(1, 200, feed_xml(&items));

        ingestor(client, store.clone()).ingest(1).await.unwrap();

        assert_eq!(store.snapshot().await.episodes[0].duration_secs, 26);
    }

    #[tokio::test]
    async fn slow_but_steady_audio_is_still_measured() {
        let store = Arc::new(MemoryStore::with_podcasts([make_podcast(1)]));
        let items = [Item {
            duration: None,
            ..item("a")
        }];
        // 20 chunks of 10 frames, 20ms apart: 400ms in total against a 200ms deadline
        let client = MockHttpClient {
            audio: mp3_frames(200),
            chunk: Some((4170, Duration::from_millis(20))),
            ..Default::default()
        }
        .with_feed(1, 200, feed_xml(&items));
        let options = IngestOptions {
            fetch_timeout: Duration::from_millis(200),
            ..Default::default()
        };

        let report = Ingestor::new(Arc::new(client), store.clone(), options)
            .ingest(1)
            .await
            .unwrap();

        assert!(report.skipped.is_empty(), "{:?}", report.skipped);
        assert_eq!(report.inserted, 1);
        assert_eq!(store.snapshot().await.episodes[0].duration_secs, 5);
    }

    #[tokio::test]
    async fn reingest_reuses_stored_durations() {
        let store = Arc::new(MemoryStore::with_podcasts([make_podcast(1)]));
        let items = [
            Item {
                duration: None,
                ..item("a")
            },
            Item {
                duration: None,
                guid: None,
                ..item("unused")
            },
        ];
        let client = Arc::new(
            MockHttpClient {
                audio: mp3_frames(1000),
                ..Default::default()
            }
            .with_feed(1, 200, feed_xml(&items)),
        );
        let ingestor = Ingestor::new(client.clone(), store.clone(), IngestOptions::default());

        ingestor.ingest(1).await.unwrap();
        assert_eq!(client.audio_requests.load(Ordering::SeqCst), 2);

        let second = ingestor.ingest(1).await.unwrap();

        assert_eq!(second.updated, 2);
        assert_eq!(client.audio_requests.load(Ordering::SeqCst), 2);
        assert!(store.snapshot().await.episodes.iter().all(|e| e.duration_secs == 26));
    }

    #[tokio::test]
    async fn ingest_without_decoding_stores_zero_duration() {
        let store = Arc::new(MemoryStore::with_podcasts([make_podcast(1)]));
        let items = [Item {
            duration: None,
            ..item("a")
        }];
        let client = Arc::new(
            MockHttpClient {
                audio: mp3_frames(1000),
                ..Default::default()
            }
            .with_feed(1, 200, feed_xml(&items)),
        );
        let options = IngestOptions {
            decode_audio: false,
            ..Default::default()
        };

        Ingestor::new(client.clone(), store.clone(), options)
            .ingest(1)
            .await
            .unwrap();

        assert_eq!(store.snapshot().await.episodes[0].duration_secs, 0);
        assert_eq!(client.audio_requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fetch_failure_aborts_without_writing() {
        let store = Arc::new(MemoryStore::with_podcasts([make_podcast(1)]));
        let client = MockHttpClient::default().with_feed(1, 503, "Unavailable".to_string());

        let result = ingestor(client, store.clone()).ingest(1).await;

        assert!(matches!(
            result,
            Err(IngestError::Feed(FeedError::Fetch(FetchError::HttpStatus { status: 503, .. })))
        ));
        assert!(store.snapshot().await.episodes.is_empty());
    }

    #[tokio::test]
    async fn parse_failure_aborts_without_writing() {
        let store = Arc::new(MemoryStore::with_podcasts([make_podcast(1)]));
        let client = MockHttpClient::default().with_feed(1, 200, "<html>nope</html>".to_string());

        let result = ingestor(client, store.clone()).ingest(1).await;

        assert!(matches!(result, Err(IngestError::Feed(FeedError::Parse(_)))));
        assert!(store.snapshot().await.episodes.is_empty());
    }

    #[tokio::test]
    async fn unknown_podcast_is_a_store_error() {
        let store = Arc::new(MemoryStore::new());

        let result = ingestor(MockHttpClient::default(), store).ingest(99).await;

        assert!(matches!(
            result,
            Err(IngestError::Store(StoreError::PodcastNotFound(99)))
        ));
    }

    #[tokio::test]
    async fn store_failure_is_surfaced() {
        let store = Arc::new(ReadOnlyStore(MemoryStore::with_podcasts([make_podcast(1)])));
        let client = MockHttpClient::default().with_feed(1, 200, feed_xml(&[item("a")]));

        let result = ingestor(client, store).ingest(1).await;

        assert!(matches!(
            result,
            Err(IngestError::Store(StoreError::WriteFailed { .. }))
        ));
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_fetches() {
        let store = Arc::new(MemoryStore::with_podcasts([make_podcast(1)]));
        let client = MockHttpClient {
            hang: true,
            ..Default::default()
        };
        let ingestor = ingestor(client, store);

        let pending = {
            let ingestor = ingestor.clone();
            tokio::spawn(async move { ingestor.ingest(1).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        ingestor.shutdown();

        let result = pending.await.unwrap();
        assert!(matches!(
            result,
            Err(IngestError::Feed(FeedError::Fetch(FetchError::Cancelled { .. })))
        ));
    }

    #[tokio::test]
    async fn shutdown_during_audio_decoding_writes_nothing() {
        let store = Arc::new(MemoryStore::with_podcasts([make_podcast(1)]));
        let items = [
            item("inline"),
            Item {
                duration: None,
                ..item("needs-audio")
            },
        ];
        let client = Arc::new(
            MockHttpClient {
                hang_audio: true,
                ..Default::default()
            }
            .with_feed(1, 200, feed_xml(&items)),
        );
        let ingestor = Ingestor::new(client.clone(), store.clone(), IngestOptions::default());

        let pending = {
            let ingestor = ingestor.clone();
            tokio::spawn(async move { ingestor.ingest(1).await })
        };
        while client.audio_requests.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        ingestor.shutdown();

        let result = pending.await.unwrap();
        assert!(matches!(
            result,
            Err(IngestError::Feed(FeedError::Fetch(FetchError::Cancelled { .. })))
        ));
        assert!(store.snapshot().await.episodes.is_empty());
    }

    #[tokio::test]
    async fn refresh_all_isolates_failures() {
        let ids = [1, 2, 3, 4, 5];
        let store = Arc::new(MemoryStore::with_podcasts(ids.map(make_podcast)));
        let mut client = MockHttpClient::default();
        for id in ids {
            let guid = format!("{id}-ep");
            let status = if id == 3 { 500 } else { 200 };
            client = client.with_feed(id, status, feed_xml(&[item(&guid)]));
        }

        let results = ingestor(client, store.clone()).refresh_all(ids).await;

        assert_eq!(results.iter().map(|(id, _)| *id).collect::<Vec<_>>(), ids);
        for (id, result) in &results {
            if *id == 3 {
                assert!(result.is_err());
            } else {
                assert_eq!(result.as_ref().unwrap().inserted, 1);
            }
        }

        let data = store.snapshot().await;
        assert_eq!(data.episodes.len(), 4);
        assert!(data.episodes.iter().all(|e| e.podcast_id != 3));
    }

    #[tokio::test]
    async fn spawn_refresh_persists_in_background() {
        let store = Arc::new(MemoryStore::with_podcasts([make_podcast(1)]));
        let client = MockHttpClient::default().with_feed(1, 200, feed_xml(&[item("a")]));

        ingestor(client, store.clone()).spawn_refresh(1).await.unwrap();

        assert_eq!(store.snapshot().await.episodes.len(), 1);
    }

    #[tokio::test]
    async fn spawn_refresh_swallows_errors() {
        let store = Arc::new(MemoryStore::new());

        let outcome = ingestor(MockHttpClient::default(), store).spawn_refresh(42).await;

        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn reporter_sees_ingestion_steps() {
        let store = Arc::new(MemoryStore::with_podcasts([make_podcast(1)]));
        let items = [item("a"), Item {
            pub_date: "soon",
            ..item("b")
        }];
        let client = MockHttpClient::default().with_feed(1, 200, feed_xml(&items));
        let reporter = Arc::new(RecordingReporter::default());

        ingestor(client, store)
            .with_reporter(reporter.clone())
            .ingest(1)
            .await
            .unwrap();

        let events = reporter.events.lock().unwrap();
        assert!(matches!(events[0], ProgressEvent::FetchingFeed { podcast_id: 1, .. }));
        assert!(matches!(events[1], ProgressEvent::FeedParsed { entries: 2, .. }));
        assert!(matches!(events[2], ProgressEvent::EpisodeNormalized { duration_secs: 600, .. }));
        assert!(matches!(events[3], ProgressEvent::EpisodeSkipped { .. }));
        assert_eq!(
            events[4],
            ProgressEvent::IngestCompleted {
                podcast_id: 1,
                inserted: 1,
                updated: 0,
                skipped: 1,
            }
        );
    }
}
