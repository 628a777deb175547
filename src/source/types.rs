// src/source/types.rs
use chrono::{DateTime, Utc};
use thiserror::Error;

/// One entry from a platform's ranked trending listing.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct TrendItem {
    pub source: String, // platform id, e.g. "hotlist", "tech-rss"
    pub title: String,  // raw title as fetched
    pub url: Option<String>,
    pub rank: Option<u32>, // 1-based position on the listing, if the platform exposes one
    pub fetched_at: DateTime<Utc>,
}

impl TrendItem {
    /// Stable dedup identity: (source, normalized title). Rank drift between
    /// runs does not change it.
    pub fn identity(&self) -> String {
        crate::source::item_identity(&self.source, &self.title)
    }
}

/// Per-adapter failure. Recovered locally by the aggregator; never fatal alone.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(String),
    #[error("timed out after {0}s")]
    Timeout(u64),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("source task failed: {0}")]
    Internal(String),
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    /// Fetch the platform's current ranked listing. Must complete or fail
    /// within the caller-supplied timeout; the aggregator enforces it.
    async fn fetch_latest(&self) -> Result<Vec<TrendItem>, FetchError>;
    fn id(&self) -> &str;
}
