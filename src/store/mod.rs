// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod json;

pub use json::JsonStore;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use url::Url;

use crate::error::StoreError;
use crate::normalize::CanonicalEpisode;

/// Numeric collection identifier assigned by the podcast catalog
pub type PodcastId = u64;

/// A podcast known to the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Podcast {
    pub id: PodcastId,
    pub name: String,
    pub feed_url: Url,
}

/// Record of an episode the user has listened to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listen {
    pub podcast_id: PodcastId,
    pub guid: String,
    pub listened_at: DateTime<Utc>,
}

/// Outcome of a batch upsert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

/// Persistence seam used by the ingestion pipeline
#[async_trait]
pub trait EpisodeStore: Send + Sync {
    /// Look up a podcast and its feed URL
    async fn find_podcast(&self, id: PodcastId) -> Result<Podcast, StoreError>;

    /// Stored nonzero durations of a podcast's episodes, keyed by GUID
    async fn known_durations(
        &self,
        podcast_id: PodcastId,
    ) -> Result<HashMap<String, u64>, StoreError>;

    /// Insert or update every episode keyed by `(podcast_id, guid)`.
    ///
    /// Either the whole batch is stored or none of it is.
    async fn upsert_episodes(
        &self,
        episodes: &[CanonicalEpisode],
    ) -> Result<UpsertSummary, StoreError>;
}

/// All records kept for the local user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreData {
    #[serde(default)]
    pub podcasts: Vec<Podcast>,
    #[serde(default)]
    pub subscriptions: Vec<PodcastId>,
    #[serde(default)]
    pub episodes: Vec<CanonicalEpisode>,
    #[serde(default)]
    pub listens: Vec<Listen>,
}

impl StoreData {
    pub fn podcast(&self, id: PodcastId) -> Result<&Podcast, StoreError> {
        self.podcasts
            .iter()
            .find(|p| p.id == id)
            .ok_or(StoreError::PodcastNotFound(id))
    }

    /// Register a podcast, replacing name and feed URL if it already exists
    pub fn put_podcast(&mut self, podcast: Podcast) {
        match self.podcasts.iter_mut().find(|p| p.id == podcast.id) {
            Some(existing) => *existing = podcast,
            None => self.podcasts.push(podcast),
        }
    }

    /// Returns false if the podcast was already subscribed
    pub fn subscribe(&mut self, id: PodcastId) -> Result<bool, StoreError> {
        self.podcast(id)?;
        if self.subscriptions.contains(&id) {
            return Ok(false);
        }
        self.subscriptions.push(id);
        Ok(true)
    }

    /// Returns false if there was no subscription to remove
    pub fn unsubscribe(&mut self, id: PodcastId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| *s != id);
        self.subscriptions.len() != before
    }

    pub fn subscribed_podcasts(&self) -> Vec<&Podcast> {
        self.subscriptions
            .iter()
            .filter_map(|id| self.podcasts.iter().find(|p| p.id == *id))
            .collect()
    }

    /// Episodes of one podcast, newest first
    pub fn episodes_for(&self, podcast_id: PodcastId) -> Vec<&CanonicalEpisode> {
        let mut episodes: Vec<_> = self
            .episodes
            .iter()
            .filter(|e| e.podcast_id == podcast_id)
            .collect();
        episodes.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        episodes
    }

    pub fn known_durations(&self, podcast_id: PodcastId) -> HashMap<String, u64> {
        self.episodes
            .iter()
            .filter(|e| e.podcast_id == podcast_id && e.duration_secs > 0)
            .map(|e| (e.guid.clone(), e.duration_secs))
            .collect()
    }

    pub fn listens_for(&self, podcast_id: PodcastId) -> Vec<&Listen> {
        self.listens
            .iter()
            .filter(|l| l.podcast_id == podcast_id)
            .collect()
    }

    pub fn is_listened(&self, podcast_id: PodcastId, guid: &str) -> bool {
        self.listens
            .iter()
            .any(|l| l.podcast_id == podcast_id && l.guid == guid)
    }

    /// Mark an episode listened, refreshing the timestamp of an existing listen
    pub fn mark_listened(
        &mut self,
        podcast_id: PodcastId,
        guid: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let known = self
            .episodes
            .iter()
            .any(|e| e.podcast_id == podcast_id && e.guid == guid);
        if !known {
            return Err(StoreError::EpisodeNotFound {
                podcast_id,
                guid: guid.to_string(),
            });
        }

        match self
            .listens
            .iter_mut()
            .find(|l| l.podcast_id == podcast_id && l.guid == guid)
        {
            Some(listen) => listen.listened_at = at,
            None => self.listens.push(Listen {
                podcast_id,
                guid: guid.to_string(),
                listened_at: at,
            }),
        }
        Ok(())
    }

    /// Returns false if the episode was not marked listened
    pub fn unmark_listened(&mut self, podcast_id: PodcastId, guid: &str) -> bool {
        let before = self.listens.len();
        self.listens
            .retain(|l| !(l.podcast_id == podcast_id && l.guid == guid));
        self.listens.len() != before
    }

    /// Apply a batch upsert, validating every owning podcast before touching anything
    pub fn upsert_episodes(
        &mut self,
        episodes: &[CanonicalEpisode],
    ) -> Result<UpsertSummary, StoreError> {
        for episode in episodes {
            self.podcast(episode.podcast_id)?;
        }

        let mut summary = UpsertSummary::default();
        for episode in episodes {
            match self
                .episodes
                .iter_mut()
                .find(|e| e.podcast_id == episode.podcast_id && e.guid == episode.guid)
            {
                Some(existing) => {
                    *existing = episode.clone();
                    summary.updated += 1;
                }
                None => {
                    self.episodes.push(episode.clone());
                    summary.inserted += 1;
                }
            }
        }
        Ok(summary)
    }
}

/// Volatile store, mainly for tests and one-shot runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_podcasts(podcasts: impl IntoIterator<Item = Podcast>) -> Self {
        let mut data = StoreData::default();
        for podcast in podcasts {
            data.put_podcast(podcast);
        }
        Self {
            data: Mutex::new(data),
        }
    }

    /// Copy of the current contents
    pub async fn snapshot(&self) -> StoreData {
        self.data.lock().await.clone()
    }
}

#[async_trait]
impl EpisodeStore for MemoryStore {
    async fn find_podcast(&self, id: PodcastId) -> Result<Podcast, StoreError> {
        self.data.lock().await.podcast(id).cloned()
    }

    async fn known_durations(
        &self,
        podcast_id: PodcastId,
    ) -> Result<HashMap<String, u64>, StoreError> {
        Ok(self.data.lock().await.known_durations(podcast_id))
    }

    async fn upsert_episodes(
        &self,
        episodes: &[CanonicalEpisode],
    ) -> Result<UpsertSummary, StoreError> {
        self.data.lock().await.upsert_episodes(episodes)
    }
}
