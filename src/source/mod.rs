// src/source/mod.rs
pub mod providers;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;

use crate::source::types::{FetchError, SourceProvider, TrendItem};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("source_items_total", "Items parsed from source adapters.");
        describe_counter!(
            "source_batch_kept_total",
            "Items kept in the batch after identity dedup."
        );
        describe_counter!(
            "source_dedup_total",
            "Items collapsed as duplicate identities within one batch."
        );
        describe_counter!("source_fetch_errors_total", "Adapter fetch/parse errors.");
        describe_histogram!("source_fetch_ms", "Per-adapter fetch time in milliseconds.");
        describe_gauge!(
            "source_last_fetch_ts",
            "Unix ts when the aggregator last ran."
        );
    });
}

/// Normalize a title for matching and identity: HTML entity decode, lowercase,
/// collapse whitespace, trim.
pub fn normalize_title(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();
    out = out.to_lowercase();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Dedup identity for (source, title): short sha256 hex over the source id and
/// the normalized title. Two textually-identical titles from the same source
/// map to the same identity regardless of rank.
pub fn item_identity(source: &str, title: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_title(title).as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Result of one aggregation pass over all configured adapters.
#[derive(Debug)]
pub struct FetchReport {
    pub batch: Vec<TrendItem>,
    pub errors: Vec<(String, FetchError)>,
    pub attempted: usize,
    pub started_at: DateTime<Utc>,
}

impl FetchReport {
    pub fn succeeded(&self) -> usize {
        self.attempted - self.errors.len()
    }

    /// True when every adapter failed. Distinct from partial failure; the
    /// pipeline aborts the cycle on it.
    pub fn all_failed(&self) -> bool {
        self.attempted > 0 && self.errors.len() == self.attempted
    }
}

/// Invoke every adapter concurrently, each bounded by `per_source_timeout`.
/// A single adapter failure is recorded and the rest of the batch proceeds;
/// items are stamped with the aggregation start time so one run is comparably
/// timestamped. Duplicate identities within the batch collapse to the first
/// occurrence.
pub async fn fetch_all(
    providers: &[Arc<dyn SourceProvider>],
    per_source_timeout: Duration,
) -> FetchReport {
    ensure_metrics_described();

    let started_at = Utc::now();
    let mut handles = Vec::with_capacity(providers.len());
    for p in providers {
        let p = Arc::clone(p);
        let id = p.id().to_string();
        handles.push((
            id,
            tokio::spawn(async move {
                let t0 = std::time::Instant::now();
                let res = match tokio::time::timeout(per_source_timeout, p.fetch_latest()).await {
                    Ok(r) => r,
                    Err(_) => Err(FetchError::Timeout(per_source_timeout.as_secs())),
                };
                let ms = t0.elapsed().as_secs_f64() * 1_000.0;
                metrics::histogram!("source_fetch_ms").record(ms);
                res
            }),
        ));
    }

    let mut raw: Vec<TrendItem> = Vec::new();
    let mut errors: Vec<(String, FetchError)> = Vec::new();
    let attempted = handles.len();

    for (id, handle) in handles {
        match handle.await {
            Ok(Ok(mut items)) => {
                counter!("source_items_total").increment(items.len() as u64);
                for it in &mut items {
                    it.fetched_at = started_at;
                }
                raw.append(&mut items);
            }
            Ok(Err(e)) => {
                tracing::warn!(source = %id, error = %e, "source fetch failed");
                counter!("source_fetch_errors_total").increment(1);
                errors.push((id, e));
            }
            Err(join_err) => {
                tracing::warn!(source = %id, error = %join_err, "source task failed");
                counter!("source_fetch_errors_total").increment(1);
                errors.push((id, FetchError::Internal(join_err.to_string())));
            }
        }
    }

    let (batch, dedup_cnt) = dedup_batch(raw);
    counter!("source_batch_kept_total").increment(batch.len() as u64);
    counter!("source_dedup_total").increment(dedup_cnt as u64);
    gauge!("source_last_fetch_ts").set(started_at.timestamp() as f64);

    FetchReport {
        batch,
        errors,
        attempted,
        started_at,
    }
}

/// Collapse duplicate identities within one batch, keeping the first
/// occurrence (batch order is the adapters' listing order).
pub fn dedup_batch(items: Vec<TrendItem>) -> (Vec<TrendItem>, usize) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut keep = Vec::with_capacity(items.len());
    let mut dropped = 0usize;

    for it in items {
        if !seen.insert(it.identity()) {
            dropped += 1;
            continue;
        }
        keep.push(it);
    }
    (keep, dropped)
}
