//! Upstream retrieval of the dataset document.

use std::time::Duration;

use tracing::debug;

use crate::FetchError;
use crate::model::Dataset;

pub const DEFAULT_DATA_URL: &str = "https://unpkg.com/bangumi-data@0.3/dist/data.json";

/// Source of complete dataset snapshots.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Human-readable description of where data comes from, for logs.
    fn source(&self) -> &str;

    /// Retrieve and decode one full dataset. No retries.
    async fn fetch(&self) -> Result<Dataset, FetchError>;
}

/// Fetches the dataset with a single HTTP GET.
pub struct HttpFetcher {
    url: String,
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(concat!("bangumi-catalog/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport(format!("build http client: {e}")))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    fn source(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Dataset, FetchError> {
        debug!(url = %self.url, "dataset request");

        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status().as_u16()));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(format!("read body: {e}")))?;

        serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}
