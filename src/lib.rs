pub mod duration;
pub mod error;
pub mod feed;
pub mod http;
pub mod ingest;
pub mod logging;
pub mod normalize;
pub mod progress;
pub mod stats;
pub mod store;

// Re-export main types for convenience
pub use duration::{Mp3DurationDecoder, parse_duration, resolve_duration};
pub use error::{
    DecodeError, DurationError, FeedError, FetchError, FormatError, IngestError, NormalizeError,
    StoreError,
};
pub use feed::{FeedDocument, FeedEntry, fetch_feed, parse_feed};
pub use http::{FetchLimits, HttpClient, HttpResponse, ReqwestClient};
pub use ingest::{IngestOptions, IngestReport, Ingestor};
pub use normalize::{CanonicalEpisode, normalize_entry, parse_published};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use stats::{ListeningStats, human_seconds};
pub use store::{EpisodeStore, JsonStore, Listen, MemoryStore, Podcast, PodcastId, StoreData};
