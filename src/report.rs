// src/report.rs
//! Plain-text digest rendering for notification channels. HTML reports are a
//! separate concern and not produced here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::filter::Matched;
use crate::notify::NotifyPayload;
use crate::state::PushMode;

const MAX_LISTED_ITEMS: usize = 10;

pub fn render_digest(
    mode: PushMode,
    now: DateTime<Utc>,
    delta: &[Matched],
    sources_succeeded: usize,
    sources_attempted: usize,
) -> NotifyPayload {
    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("Mode: {mode}"));
    lines.push(String::new());

    lines.push(format!("Trending ({} items)", delta.len()));
    for m in delta.iter().take(MAX_LISTED_ITEMS) {
        let rank = m
            .item
            .rank
            .map(|r| format!("#{r} "))
            .unwrap_or_default();
        match &m.item.url {
            Some(url) => lines.push(format!("- [{}] {}{} <{}>", m.item.source, rank, m.item.title, url)),
            None => lines.push(format!("- [{}] {}{}", m.item.source, rank, m.item.title)),
        }
    }
    if delta.len() > MAX_LISTED_ITEMS {
        lines.push(format!("- ... and {} more", delta.len() - MAX_LISTED_ITEMS));
    }

    // per-source tally
    let mut per_source: BTreeMap<&str, usize> = BTreeMap::new();
    for m in delta {
        *per_source.entry(m.item.source.as_str()).or_insert(0) += 1;
    }
    if !per_source.is_empty() {
        lines.push(String::new());
        let tally: Vec<String> = per_source
            .iter()
            .map(|(s, n)| format!("{s}: {n}"))
            .collect();
        lines.push(format!("By source: {}", tally.join(", ")));
    }

    lines.push(String::new());
    lines.push(format!(
        "Sources: {sources_succeeded}/{sources_attempted} ok"
    ));

    NotifyPayload {
        title: format!("Trendwatch digest - {}", now.format("%Y-%m-%d %H:%M")),
        body: lines.join("\n"),
    }
}
