// src/pipeline.rs
//! One pipeline execution: compile grammar, fetch, match, mode-filter,
//! window-gate, render, dispatch, commit. State is committed only after at
//! least one channel confirms delivery; every other exit leaves it untouched,
//! so a failed or aborted run is indistinguishable from one that never ran.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use thiserror::Error;

use crate::config::AppConfig;
use crate::enrich::Enricher;
use crate::filter::{filter_items, CompiledGrammar, GrammarError};
use crate::notify::{any_succeeded, NotifierMux};
use crate::report::render_digest;
use crate::source::types::SourceProvider;
use crate::state::{compute_delta, PushMode, StateError, StateStore};
use crate::window::PushWindow;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Pipeline executions started.");
        describe_counter!("pipeline_failures_total", "Pipeline executions that failed.");
        describe_counter!(
            "pipeline_delivered_items_total",
            "Items delivered to at least one channel."
        );
        describe_gauge!("pipeline_last_run_ts", "Unix ts of the last pipeline run.");
    });
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error("all {attempted} sources failed this cycle")]
    AllSourcesFailed { attempted: usize },
    #[error("all {attempted} notification channels failed")]
    AllChannelsFailed { attempted: usize },
    #[error(transparent)]
    State(#[from] StateError),
}

/// Cooperative cancellation, checked at stage boundaries. A cancelled run
/// never commits state.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Per-run parameters resolved from configuration before the run starts.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: PushMode,
    pub per_source_timeout: Duration,
    pub window: PushWindow,
    pub retention_days: u32,
    pub notify_enabled: bool,
}

/// Caller intent for one invocation.
#[derive(Clone)]
pub struct RunOptions {
    /// Manual-trigger override: bypasses the window gate and the notify
    /// enable switch.
    pub force: bool,
    pub now: DateTime<Local>,
    pub cancel: CancelFlag,
}

impl RunOptions {
    pub fn new(force: bool) -> Self {
        Self {
            force,
            now: Local::now(),
            cancel: CancelFlag::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Delivered,
    NothingToDeliver,
    WindowClosed,
    NotificationsDisabled,
    NoChannelsConfigured,
    Cancelled,
}

/// The single per-run summary every execution produces, success or not.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub mode: PushMode,
    pub outcome: RunOutcome,
    pub sources_attempted: usize,
    pub sources_succeeded: usize,
    pub items_fetched: usize,
    pub items_matched: usize,
    pub items_delivered: usize,
    pub channels_succeeded: usize,
    pub channels_failed: usize,
    pub source_errors: Vec<(String, String)>,
}

impl RunSummary {
    fn new(mode: PushMode) -> Self {
        Self {
            started_at: Utc::now(),
            mode,
            outcome: RunOutcome::NothingToDeliver,
            sources_attempted: 0,
            sources_succeeded: 0,
            items_fetched: 0,
            items_matched: 0,
            items_delivered: 0,
            channels_succeeded: 0,
            channels_failed: 0,
            source_errors: Vec::new(),
        }
    }

    fn log(&self, note: &str) {
        let sources = format!("{}/{}", self.sources_succeeded, self.sources_attempted);
        let channels = format!(
            "{}/{}",
            self.channels_succeeded,
            self.channels_succeeded + self.channels_failed
        );
        tracing::info!(
            target: "pipeline",
            mode = %self.mode,
            outcome = ?self.outcome,
            sources = %sources,
            fetched = self.items_fetched,
            matched = self.items_matched,
            delivered = self.items_delivered,
            channels = %channels,
            "{note}"
        );
    }
}

pub struct Pipeline {
    providers: Vec<Arc<dyn SourceProvider>>,
    store: Arc<dyn StateStore>,
    mux: NotifierMux,
    enricher: Option<Box<dyn Enricher>>,
}

impl Pipeline {
    pub fn new(
        providers: Vec<Arc<dyn SourceProvider>>,
        store: Arc<dyn StateStore>,
        mux: NotifierMux,
    ) -> Self {
        Self {
            providers,
            store,
            mux,
            enricher: None,
        }
    }

    pub fn with_enricher(mut self, enricher: Box<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Execute one run. Grammar compilation happens before any fetch (fail
    /// fast); no retries live here — failed state is never committed, which is
    /// what makes external retries safe.
    pub async fn run_once(
        &self,
        cfg: &RunConfig,
        grammar_text: &str,
        opts: &RunOptions,
    ) -> Result<RunSummary, PipelineError> {
        ensure_metrics_described();
        counter!("pipeline_runs_total").increment(1);
        gauge!("pipeline_last_run_ts").set(Utc::now().timestamp() as f64);

        let mut summary = RunSummary::new(cfg.mode);

        let grammar = match CompiledGrammar::compile(grammar_text) {
            Ok(g) => g,
            Err(e) => {
                counter!("pipeline_failures_total").increment(1);
                summary.log("grammar rejected");
                return Err(e.into());
            }
        };

        let state = self.store.load().await.map_err(|e| {
            counter!("pipeline_failures_total").increment(1);
            e
        })?;

        let report = crate::source::fetch_all(&self.providers, cfg.per_source_timeout).await;
        summary.sources_attempted = report.attempted;
        summary.sources_succeeded = report.succeeded();
        summary.items_fetched = report.batch.len();
        summary.source_errors = report
            .errors
            .iter()
            .map(|(id, e)| (id.clone(), e.to_string()))
            .collect();

        if report.all_failed() {
            counter!("pipeline_failures_total").increment(1);
            summary.log("every source failed; aborting cycle");
            return Err(PipelineError::AllSourcesFailed {
                attempted: report.attempted,
            });
        }

        if opts.cancel.is_cancelled() {
            summary.outcome = RunOutcome::Cancelled;
            summary.log("cancelled before matching");
            return Ok(summary);
        }

        let matches = filter_items(&grammar, &report.batch);
        summary.items_matched = matches.len();

        let today = opts.now.date_naive();
        let (delta, mut next_state) = compute_delta(&matches, cfg.mode, today, &state);

        if delta.is_empty() {
            summary.outcome = RunOutcome::NothingToDeliver;
            summary.log("no eligible items this run");
            return Ok(summary);
        }

        if !cfg.notify_enabled && !opts.force {
            summary.outcome = RunOutcome::NotificationsDisabled;
            summary.log("notifications disabled; nothing dispatched, state untouched");
            return Ok(summary);
        }

        if !cfg.window.allows(opts.now.time(), opts.force) {
            summary.outcome = RunOutcome::WindowClosed;
            summary.log("outside push window; items stay eligible");
            return Ok(summary);
        }

        if self.mux.is_empty() {
            summary.outcome = RunOutcome::NoChannelsConfigured;
            summary.log("no channels configured; state untouched");
            return Ok(summary);
        }

        let mut payload = render_digest(
            cfg.mode,
            report.started_at,
            &delta,
            summary.sources_succeeded,
            summary.sources_attempted,
        );
        if let Some(extra) = crate::enrich::try_enrich(self.enricher.as_deref(), &delta).await {
            payload.body.push_str("\n\n");
            payload.body.push_str(&extra);
        }

        if opts.cancel.is_cancelled() {
            summary.outcome = RunOutcome::Cancelled;
            summary.log("cancelled before dispatch");
            return Ok(summary);
        }

        let outcomes = self.mux.send_all(&payload).await;
        summary.channels_succeeded = outcomes.iter().filter(|o| o.ok).count();
        summary.channels_failed = outcomes.len() - summary.channels_succeeded;

        if !any_succeeded(&outcomes) {
            counter!("pipeline_failures_total").increment(1);
            summary.log("every channel failed; state rolled back");
            return Err(PipelineError::AllChannelsFailed {
                attempted: outcomes.len(),
            });
        }

        // Delivery confirmed somewhere: commit. Retention never runs in
        // incremental mode, whose never-resend contract spans all history.
        if cfg.retention_days > 0 && cfg.mode != PushMode::Incremental {
            let cutoff = today - chrono::Days::new(u64::from(cfg.retention_days));
            next_state.prune_older_than(cutoff);
        }
        if let Err(e) = self.store.commit(&next_state).await {
            counter!("pipeline_failures_total").increment(1);
            summary.log("delivered but state commit failed; run reported as failed");
            return Err(e.into());
        }

        summary.items_delivered = delta.len();
        summary.outcome = RunOutcome::Delivered;
        counter!("pipeline_delivered_items_total").increment(delta.len() as u64);
        summary.log("delivered");
        Ok(summary)
    }
}

/// Outcome of the last finished run, kept for the status API.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Serializes pipeline executions: the scheduler and the manual-trigger API
/// both go through `trigger`, so two runs never race on the same state file.
pub struct Runner {
    config: AppConfig,
    pipeline: Pipeline,
    run_lock: tokio::sync::Mutex<()>,
    last: std::sync::RwLock<Option<RunReport>>,
    cancel: CancelFlag,
}

impl Runner {
    pub fn new(config: AppConfig, pipeline: Pipeline) -> Self {
        Self {
            config,
            pipeline,
            run_lock: tokio::sync::Mutex::new(()),
            last: std::sync::RwLock::new(None),
            cancel: CancelFlag::default(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Request cancellation of the run in flight, if any.
    pub fn cancel_current(&self) {
        self.cancel.cancel();
    }

    pub fn last_report(&self) -> Option<RunReport> {
        self.last.read().expect("report lock poisoned").clone()
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Run the pipeline once, waiting for any run in flight to finish first.
    pub async fn trigger(&self, force: bool) -> anyhow::Result<RunSummary> {
        let _guard = self.run_lock.lock().await;
        self.run_locked(force).await
    }

    /// Run the pipeline once unless a run is already in flight.
    pub async fn trigger_if_idle(&self, force: bool) -> Option<anyhow::Result<RunSummary>> {
        let guard = self.run_lock.try_lock().ok()?;
        let res = self.run_locked(force).await;
        drop(guard);
        Some(res)
    }

    async fn run_locked(&self, force: bool) -> anyhow::Result<RunSummary> {
        self.cancel.reset();
        let run_cfg = self.config.run_config()?;

        // Re-read the grammar every run so config edits apply without restart.
        let keywords_path = &self.config.report.keywords_path;
        let grammar_text = match tokio::fs::read_to_string(keywords_path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %keywords_path, "keywords file missing; passing all items through");
                String::new()
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("reading keywords from {keywords_path}")))
            }
        };

        let opts = RunOptions {
            force,
            now: Local::now(),
            cancel: self.cancel.clone(),
        };

        let res = self.pipeline.run_once(&run_cfg, &grammar_text, &opts).await;
        let report = match &res {
            Ok(summary) => RunReport {
                finished_at: Utc::now(),
                summary: Some(summary.clone()),
                error: None,
            },
            Err(e) => RunReport {
                finished_at: Utc::now(),
                summary: None,
                error: Some(format!("{e:#}")),
            },
        };
        *self.last.write().expect("report lock poisoned") = Some(report);

        res.map_err(Into::into)
    }
}
