use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(thiserror::Error, Debug)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Request(String),
    #[error("feed returned status {0}")]
    Status(u16),
    #[error("feed request timed out")]
    Timeout,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulePayload {
    #[serde(default)]
    matches: Vec<serde_json::Value>,
}

/// Source of scheduled matches. Entries are passed through untouched.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_matches(&self) -> Result<Vec<serde_json::Value>, FeedError>;
}

pub struct HttpFeedSource {
    client: reqwest::Client,
    url: String,
}

impl HttpFeedSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), url: url.into() }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_matches(&self) -> Result<Vec<serde_json::Value>, FeedError> {
        let request = async {
            let resp = self.client.get(&self.url).send().await.map_err(|e| FeedError::Request(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(FeedError::Status(resp.status().as_u16()));
            }
            resp.json::<SchedulePayload>().await.map_err(|e| FeedError::Request(e.to_string()))
        };
        let payload = tokio::time::timeout(FETCH_TIMEOUT, request).await.map_err(|_| FeedError::Timeout)??;
        Ok(payload.matches)
    }
}
