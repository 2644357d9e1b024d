use std::sync::Arc;

use crate::store::PodcastId;

/// Events emitted during ingestion for progress reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Feed is being fetched from URL
    FetchingFeed { podcast_id: PodcastId, url: String },

    /// Feed has been parsed successfully
    FeedParsed {
        podcast_id: PodcastId,
        feed_title: String,
        /// Entries kept after truncation
        entries: usize,
    },

    /// An entry was turned into a storable episode
    EpisodeNormalized {
        podcast_id: PodcastId,
        episode_title: String,
        duration_secs: u64,
    },

    /// An entry could not be normalized and was left out
    EpisodeSkipped {
        podcast_id: PodcastId,
        episode_title: String,
        error: String,
    },

    /// All normalized episodes were stored
    IngestCompleted {
        podcast_id: PodcastId,
        inserted: usize,
        updated: usize,
        skipped: usize,
    },

    /// Ingestion stopped before anything was stored
    IngestFailed { podcast_id: PodcastId, error: String },
}

/// Trait for reporting progress events during ingestion.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {
        // Intentionally empty
    }
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
