// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::normalize::CanonicalEpisode;

use super::{EpisodeStore, Podcast, PodcastId, StoreData, UpsertSummary};

/// Store backed by a single JSON document on disk.
///
/// Every mutation is applied to a copy, written to `<file>.partial` and
/// renamed over the original. Only then does the in-memory copy change, so a
/// failed write leaves both the file and the store untouched.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl JsonStore {
    /// Open the store at `path`, starting empty if the file does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = if path.exists() {
            read_store_file(&path)?
        } else {
            StoreData::default()
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Copy of the current contents
    pub async fn snapshot(&self) -> StoreData {
        self.data.lock().await.clone()
    }

    /// Apply `change` and persist the result atomically
    pub async fn update<T, F>(&self, change: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut StoreData) -> Result<T, StoreError>,
    {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        let value = change(&mut next)?;
        write_store_file(&next, &self.path)?;
        *data = next;
        Ok(value)
    }
}

#[async_trait]
impl EpisodeStore for JsonStore {
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
        self.update(|data| data.upsert_episodes(episodes)).await
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

fn read_store_file(path: &Path) -> Result<StoreData, StoreError> {
    let content = std::fs::read_to_string(path).map_err(|e| StoreError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&content).map_err(|e| StoreError::JsonParseFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_store_file(data: &StoreData, path: &Path) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(data)?;
    let partial = partial_path(path);

    std::fs::write(&partial, json).map_err(|e| StoreError::WriteFailed {
        path: partial.clone(),
        source: e,
    })?;

    std::fs::rename(&partial, path).map_err(|e| StoreError::WriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}
