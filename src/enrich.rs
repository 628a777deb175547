// src/enrich.rs
//! Optional post-processing seam: an external agent (AI summarizer or
//! similar) turns matched items into extra digest text. Failures here are
//! logged and never block notification.

use crate::filter::Matched;

#[async_trait::async_trait]
pub trait Enricher: Send + Sync {
    /// Produce extra digest text for the matched items.
    async fn enrich(&self, items: &[Matched]) -> anyhow::Result<String>;
    fn name(&self) -> &str;
}

/// Run the enricher, tolerating its failure. Returns `None` when disabled or
/// when the enricher errors out.
pub async fn try_enrich(enricher: Option<&dyn Enricher>, items: &[Matched]) -> Option<String> {
    let e = enricher?;
    match e.enrich(items).await {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(err) => {
            tracing::warn!(enricher = e.name(), error = %err, "enrichment failed; continuing without it");
            None
        }
    }
}
