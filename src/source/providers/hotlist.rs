// src/source/providers/hotlist.rs
//! Adapter for aggregation APIs that return a ranked news list as JSON:
//! `{"code": 200, "data": {"newsList": [{"title": "...", "url": "..."}]}}`.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::source::types::{FetchError, SourceProvider, TrendItem};

#[derive(Debug, Deserialize)]
struct HotlistEnvelope {
    code: i64,
    #[serde(default)]
    data: Option<HotlistData>,
}

#[derive(Debug, Deserialize)]
struct HotlistData {
    #[serde(rename = "newsList", default)]
    news_list: Vec<HotlistEntry>,
}

#[derive(Debug, Deserialize)]
struct HotlistEntry {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

pub struct HotlistProvider {
    id: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl HotlistProvider {
    /// Parse a captured response body instead of hitting the network.
    pub fn from_fixture_str(id: impl Into<String>, body: &str) -> Self {
        Self {
            id: id.into(),
            mode: Mode::Fixture(body.to_string()),
        }
    }

    pub fn from_url(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mode: Mode::Http {
                url: url.into(),
                client: reqwest::Client::new(),
            },
        }
    }

    fn parse_items(&self, body: &str) -> Result<Vec<TrendItem>, FetchError> {
        let envelope: HotlistEnvelope =
            serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

        if envelope.code != 200 {
            return Err(FetchError::Parse(format!(
                "hotlist api returned code {}",
                envelope.code
            )));
        }

        let entries = envelope.data.map(|d| d.news_list).unwrap_or_default();
        let mut out = Vec::with_capacity(entries.len());
        for (i, entry) in entries.into_iter().enumerate() {
            let Some(title) = entry.title else { continue };
            let title = title.trim().to_string();
            if title.is_empty() {
                continue;
            }
            out.push(TrendItem {
                source: self.id.clone(),
                title,
                url: entry.url.filter(|u| !u.is_empty()),
                rank: Some(i as u32 + 1),
                fetched_at: Utc::now(),
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for HotlistProvider {
    async fn fetch_latest(&self) -> Result<Vec<TrendItem>, FetchError> {
        match &self.mode {
            Mode::Fixture(body) => self.parse_items(body),
            Mode::Http { url, client } => {
                let resp = client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| FetchError::Http(e.to_string()))?
                    .error_for_status()
                    .map_err(|e| FetchError::Http(e.to_string()))?;
                let body = resp
                    .text()
                    .await
                    .map_err(|e| FetchError::Http(e.to_string()))?;
                self.parse_items(&body)
            }
        }
    }

    fn id(&self) -> &str {
        &self.id
    }
}
