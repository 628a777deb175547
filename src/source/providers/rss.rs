// src/source/providers/rss.rs
//! RSS 2.0 adapter for platforms that publish their trending feed as XML.
//! Item order in the channel is taken as the ranking.

use async_trait::async_trait;
use chrono::Utc;
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::source::types::{FetchError, SourceProvider, TrendItem};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
}

pub struct RssProvider {
    id: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssProvider {
    pub fn from_fixture_str(id: impl Into<String>, xml: &str) -> Self {
        Self {
            id: id.into(),
            mode: Mode::Fixture(xml.to_string()),
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

    fn parse_items(&self, xml: &str) -> Result<Vec<TrendItem>, FetchError> {
        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&xml_clean).map_err(|e| FetchError::Parse(e.to_string()))?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for (i, it) in rss.channel.item.into_iter().enumerate() {
            let Some(title) = it.title else { continue };
            let title = title.trim().to_string();
            if title.is_empty() {
                continue;
            }
            out.push(TrendItem {
                source: self.id.clone(),
                title,
                url: it.link.filter(|l| !l.is_empty()),
                rank: Some(i as u32 + 1),
                fetched_at: Utc::now(),
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for RssProvider {
    async fn fetch_latest(&self) -> Result<Vec<TrendItem>, FetchError> {
        match &self.mode {
            Mode::Fixture(xml) => self.parse_items(xml),
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

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
