// src/state.rs
//! Cross-run push state: which item identities have already been surfaced,
//! keyed by calendar date. Append-only within a day; committed only after a
//! confirmed delivery, so failed sends stay eligible for the next run.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::Matched;

/// Policy governing which matched items are eligible for delivery this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushMode {
    /// Everything matched today that today's record has not seen yet.
    Daily,
    /// The full current snapshot, never suppressed by history.
    Current,
    /// Only identities absent from the entire known state, across days.
    Incremental,
}

impl FromStr for PushMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "current" => Ok(Self::Current),
            "incremental" => Ok(Self::Incremental),
            other => Err(format!(
                "unknown push mode `{other}` (expected daily | current | incremental)"
            )),
        }
    }
}

impl std::fmt::Display for PushMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Daily => "daily",
            Self::Current => "current",
            Self::Incremental => "incremental",
        };
        f.write_str(s)
    }
}

/// Persisted record of surfaced item identities, per calendar date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushState {
    #[serde(default)]
    days: BTreeMap<NaiveDate, BTreeSet<String>>,
}

impl PushState {
    pub fn contains_on(&self, day: NaiveDate, identity: &str) -> bool {
        self.days.get(&day).is_some_and(|s| s.contains(identity))
    }

    pub fn contains_anywhere(&self, identity: &str) -> bool {
        self.days.values().any(|s| s.contains(identity))
    }

    /// Append identities under `day`. Never removes anything.
    pub fn record<I>(&mut self, day: NaiveDate, identities: I)
    where
        I: IntoIterator<Item = String>,
    {
        let set = self.days.entry(day).or_default();
        for id in identities {
            set.insert(id);
        }
    }

    /// Drop whole day-keys strictly older than `cutoff`. Returns how many days
    /// were removed. Callers must not run this in incremental mode, whose
    /// never-resend contract spans the whole history.
    pub fn prune_older_than(&mut self, cutoff: NaiveDate) -> usize {
        let keep = self.days.split_off(&cutoff);
        let dropped = self.days.len();
        self.days = keep;
        dropped
    }

    pub fn total_identities(&self) -> usize {
        self.days.values().map(|s| s.len()).sum()
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }
}

/// Mode-filtered delta for one run. Returns the eligible items plus the state
/// that MUST only be committed after a confirmed delivery.
pub fn compute_delta(
    matches: &[Matched],
    mode: PushMode,
    today: NaiveDate,
    state: &PushState,
) -> (Vec<Matched>, PushState) {
    let delta: Vec<Matched> = match mode {
        PushMode::Daily => matches
            .iter()
            .filter(|m| !state.contains_on(today, &m.item.identity()))
            .cloned()
            .collect(),
        PushMode::Current => matches.to_vec(),
        PushMode::Incremental => matches
            .iter()
            .filter(|m| !state.contains_anywhere(&m.item.identity()))
            .cloned()
            .collect(),
    };

    let mut next = state.clone();
    next.record(today, delta.iter().map(|m| m.item.identity()));
    (delta, next)
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("reading push state from {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("decoding push state from {path}: {source}")]
    Decode {
        path: String,
        source: serde_json::Error,
    },
    #[error("writing push state to {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

/// Narrow storage seam so tests can swap in an in-memory fake.
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<PushState, StateError>;
    async fn commit(&self, state: &PushState) -> Result<(), StateError>;
}

/// Durable JSON file store. Missing file loads as empty state; commits go
/// through a temp file + rename so a crash mid-write cannot truncate history.
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> Result<PushState, StateError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PushState::default())
            }
            Err(e) => {
                return Err(StateError::Read {
                    path: self.path.display().to_string(),
                    source: e,
                })
            }
        };
        serde_json::from_str(&raw).map_err(|e| StateError::Decode {
            path: self.path.display().to_string(),
            source: e,
        })
    }

    async fn commit(&self, state: &PushState) -> Result<(), StateError> {
        let write_err = |e| StateError::Write {
            path: self.path.display().to_string(),
            source: e,
        };

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(write_err)?;
        }
        let body = serde_json::to_vec_pretty(state).map_err(|e| StateError::Decode {
            path: self.path.display().to_string(),
            source: e,
        })?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(write_err)?;
        Ok(())
    }
}

/// In-memory store for tests.
pub struct MemoryStateStore {
    inner: std::sync::Mutex<PushState>,
}

impl MemoryStateStore {
    pub fn new(initial: PushState) -> Self {
        Self {
            inner: std::sync::Mutex::new(initial),
        }
    }

    pub fn snapshot(&self) -> PushState {
        self.inner.lock().expect("state mutex poisoned").clone()
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new(PushState::default())
    }
}

#[async_trait::async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<PushState, StateError> {
        Ok(self.snapshot())
    }

    async fn commit(&self, state: &PushState) -> Result<(), StateError> {
        *self.inner.lock().expect("state mutex poisoned") = state.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::types::TrendItem;
    use chrono::Utc;

    fn matched(source: &str, title: &str) -> Matched {
        Matched {
            item: TrendItem {
                source: source.to_string(),
                title: title.to_string(),
                url: None,
                rank: None,
                fetched_at: Utc::now(),
            },
            group: 0,
        }
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn daily_filters_against_todays_record_only() {
        let today = day("2026-08-06");
        let yesterday = day("2026-08-05");
        let old = matched("hn", "seen yesterday");
        let fresh = matched("hn", "brand new");

        let mut state = PushState::default();
        state.record(yesterday, [old.item.identity()]);

        let (delta, next) =
            compute_delta(&[old.clone(), fresh.clone()], PushMode::Daily, today, &state);
        // yesterday's record does not suppress today's digest
        assert_eq!(delta.len(), 2);
        assert!(next.contains_on(today, &fresh.item.identity()));

        let (delta2, _) = compute_delta(&[old, fresh], PushMode::Daily, today, &next);
        assert!(delta2.is_empty());
    }

    #[test]
    fn current_mode_is_idempotent_and_unsuppressed() {
        let today = day("2026-08-06");
        let m = matched("hn", "snapshot item");
        let mut state = PushState::default();
        state.record(today, [m.item.identity()]);

        let (d1, s1) = compute_delta(&[m.clone()], PushMode::Current, today, &state);
        let (d2, _) = compute_delta(&[m.clone()], PushMode::Current, today, &state);
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 1);
        // record-keeping still happens
        assert!(s1.contains_on(today, &m.item.identity()));
    }

    #[test]
    fn incremental_never_resends_across_days() {
        let m = matched("hn", "once only");
        let (d1, s1) = compute_delta(
            &[m.clone()],
            PushMode::Incremental,
            day("2026-08-05"),
            &PushState::default(),
        );
        assert_eq!(d1.len(), 1);

        // next day, same identity: suppressed by the whole known state
        let (d2, s2) = compute_delta(&[m.clone()], PushMode::Incremental, day("2026-08-06"), &s1);
        assert!(d2.is_empty());

        // and again, any number of runs later
        let (d3, _) = compute_delta(&[m], PushMode::Incremental, day("2026-09-01"), &s2);
        assert!(d3.is_empty());
    }

    #[test]
    fn record_is_append_only() {
        let today = day("2026-08-06");
        let mut state = PushState::default();
        state.record(today, ["a".to_string(), "b".to_string()]);
        state.record(today, ["b".to_string(), "c".to_string()]);
        assert_eq!(state.total_identities(), 3);
    }

    #[test]
    fn prune_drops_only_older_days() {
        let mut state = PushState::default();
        state.record(day("2026-07-01"), ["a".to_string()]);
        state.record(day("2026-08-01"), ["b".to_string()]);
        state.record(day("2026-08-06"), ["c".to_string()]);

        let dropped = state.prune_older_than(day("2026-08-01"));
        assert_eq!(dropped, 1);
        assert_eq!(state.day_count(), 2);
        assert!(state.contains_anywhere("b"));
        assert!(!state.contains_anywhere("a"));
    }

    #[test]
    fn push_mode_parses_and_roundtrips() {
        assert_eq!("daily".parse::<PushMode>().unwrap(), PushMode::Daily);
        assert_eq!(" Current ".parse::<PushMode>().unwrap(), PushMode::Current);
        assert_eq!(
            "incremental".parse::<PushMode>().unwrap(),
            PushMode::Incremental
        );
        assert!("weekly".parse::<PushMode>().is_err());
        assert_eq!(PushMode::Incremental.to_string(), "incremental");
    }
}
