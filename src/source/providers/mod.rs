// src/source/providers/mod.rs
pub mod hotlist;
pub mod rss;

use std::sync::Arc;

use crate::config::SourceSpec;
use crate::source::types::SourceProvider;

use hotlist::HotlistProvider;
use rss::RssProvider;

/// Build adapters from configuration. Platforms are looked up by kind;
/// unknown kinds are logged and skipped so one bad entry cannot take the
/// whole run down.
pub fn build_providers(specs: &[SourceSpec]) -> Vec<Arc<dyn SourceProvider>> {
    let mut out: Vec<Arc<dyn SourceProvider>> = Vec::new();
    for spec in specs.iter().filter(|s| s.enabled) {
        match spec.kind.as_str() {
            "hotlist" => out.push(Arc::new(HotlistProvider::from_url(
                spec.id.clone(),
                spec.url.clone(),
            ))),
            "rss" => out.push(Arc::new(RssProvider::from_url(
                spec.id.clone(),
                spec.url.clone(),
            ))),
            other => {
                tracing::warn!(source = %spec.id, kind = %other, "unknown source kind; skipping");
            }
        }
    }
    out
}
