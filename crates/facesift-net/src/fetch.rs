//! Remote image fetching with a bounded timeout.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Per-image download budget.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("timed out fetching {0}")]
    Timeout(String),
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(url.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Status { url: url.to_string(), status: status.as_u16() }
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// Source of candidate image bytes.
pub trait ImageFetcher {
    /// Download the full body at `url`. Non-success statuses are errors.
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>>;
}

/// HTTP fetcher over a pooled `reqwest` client.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let bytes = response.bytes().await.map_err(|e| FetchError::from_reqwest(url, e))?;
        tracing::debug!(url, len = bytes.len(), "fetched image");
        Ok(bytes.to_vec())
    }
}
