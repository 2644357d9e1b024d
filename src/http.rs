// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;

/// Default deadline for a single feed or audio fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// A streaming response body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Fully buffered HTTP response
pub struct BufferedResponse {
    /// HTTP status code
    pub status: u16,
    /// Complete response body
    pub body: Bytes,
}

/// HTTP response with status and body stream
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as a stream of bytes
    pub body: ByteStream,
}

/// Returns true for 2xx status codes
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// HTTP client abstraction for testability
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch the entire response body as bytes
    async fn get_bytes(&self, url: &str) -> Result<BufferedResponse, reqwest::Error>;

    /// Get a streaming response for large bodies such as audio files
    async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error>;
}

/// Default HTTP client implementation using reqwest
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a new ReqwestClient with default settings
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a client whose connections give up after `timeout`.
    ///
    /// The limit applies to connecting and to each read, so a slow but
    /// steady audio stream is not cut off.
    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent(concat!("podtrack/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get_bytes(&self, url: &str) -> Result<BufferedResponse, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(BufferedResponse { status, body })
    }

    async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body: ByteStream = Box::pin(response.bytes_stream());

        Ok(HttpResponse { status, body })
    }
}

/// Deadline and cancellation applied to every outbound fetch.
///
/// Feeds are small and get one deadline for the whole request. Audio
/// streams get it for the response headers and then again for every chunk,
/// so a long download only fails once it stalls.
#[derive(Debug, Clone)]
pub struct FetchLimits {
    /// Upper bound for one feed fetch, or for one wait on an audio stream
    pub timeout: Duration,
    /// Cancelled when the owning ingestor shuts down
    pub cancel: CancellationToken,
}

impl FetchLimits {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Run `fut` against `url`, failing if the deadline passes or the token is cancelled
    pub async fn run<F, T, E>(&self, url: &str, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<FetchError>,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled {
                url: url.to_string(),
            }
            .into()),
            result = tokio::time::timeout(self.timeout, fut) => match result {
                Ok(inner) => inner,
                Err(_) => Err(FetchError::TimedOut {
                    url: url.to_string(),
                    timeout: self.timeout,
                }
                .into()),
            },
        }
    }

    /// Wait for the next chunk of `stream`, failing once it has been idle for the deadline
    pub async fn next_chunk(
        &self,
        url: &str,
        stream: &mut ByteStream,
    ) -> Result<Option<Bytes>, FetchError> {
        let next = async {
            stream
                .next()
                .await
                .transpose()
                .map_err(|e| FetchError::StreamFailed {
                    url: url.to_string(),
                    source: e,
                })
        };
        self.run(url, next).await
    }
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}
