// tests/pipeline_run.rs
//
// End-to-end pipeline semantics with mock providers, channels, and stores:
// partial vs. total source failure, dispatch/state coupling, window gating,
// incremental monotonicity, and cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Local, TimeZone, Utc};

use trendwatch::notify::{Notifier, NotifierMux, NotifyPayload};
use trendwatch::pipeline::{Pipeline, PipelineError, RunConfig, RunOptions, RunOutcome};
use trendwatch::source::types::{FetchError, SourceProvider, TrendItem};
use trendwatch::state::{MemoryStateStore, PushMode, PushState, StateError, StateStore};
use trendwatch::window::PushWindow;

struct MockProvider {
    id: String,
    titles: Vec<&'static str>,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl MockProvider {
    fn ok(id: &str, titles: Vec<&'static str>) -> Arc<dyn SourceProvider> {
        Arc::new(Self {
            id: id.to_string(),
            titles,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn failing(id: &str) -> Arc<dyn SourceProvider> {
        Arc::new(Self {
            id: id.to_string(),
            titles: Vec::new(),
            fail: true,
            calls: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn counted(id: &str, calls: Arc<AtomicUsize>) -> Arc<dyn SourceProvider> {
        Arc::new(Self {
            id: id.to_string(),
            titles: vec!["counted title"],
            fail: false,
            calls,
        })
    }
}

#[async_trait::async_trait]
impl SourceProvider for MockProvider {
    async fn fetch_latest(&self) -> Result<Vec<TrendItem>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FetchError::Http("connection refused".to_string()));
        }
        Ok(self
            .titles
            .iter()
            .enumerate()
            .map(|(i, t)| TrendItem {
                source: self.id.clone(),
                title: t.to_string(),
                url: None,
                rank: Some(i as u32 + 1),
                fetched_at: Utc::now(),
            })
            .collect())
    }

    fn id(&self) -> &str {
        &self.id
    }
}

struct MockNotifier {
    name: &'static str,
    ok: bool,
    sent: Arc<Mutex<Vec<NotifyPayload>>>,
}

impl MockNotifier {
    fn new(name: &'static str, ok: bool) -> (Box<dyn Notifier>, Arc<Mutex<Vec<NotifyPayload>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        (
            Box::new(Self {
                name,
                ok,
                sent: Arc::clone(&sent),
            }),
            sent,
        )
    }
}

#[async_trait::async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, payload: &NotifyPayload) -> anyhow::Result<()> {
        if self.ok {
            self.sent.lock().unwrap().push(payload.clone());
            Ok(())
        } else {
            anyhow::bail!("channel down")
        }
    }
    fn channel(&self) -> &str {
        self.name
    }
}

/// Store whose commit always fails, to exercise the post-delivery policy.
struct BrokenCommitStore;

#[async_trait::async_trait]
impl StateStore for BrokenCommitStore {
    async fn load(&self) -> Result<PushState, StateError> {
        Ok(PushState::default())
    }
    async fn commit(&self, _state: &PushState) -> Result<(), StateError> {
        Err(StateError::Write {
            path: "<broken>".to_string(),
            source: std::io::Error::other("disk full"),
        })
    }
}

fn run_config(mode: PushMode) -> RunConfig {
    RunConfig {
        mode,
        per_source_timeout: Duration::from_secs(5),
        window: PushWindow::default(),
        retention_days: 0,
        notify_enabled: true,
    }
}

fn opts() -> RunOptions {
    RunOptions::new(false)
}

#[tokio::test]
async fn partial_source_failure_still_delivers() {
    let providers = vec![
        MockProvider::ok("a", vec!["alpha breakthrough"]),
        MockProvider::failing("b"),
        MockProvider::ok("c", vec!["alpha again"]),
        MockProvider::failing("d"),
        MockProvider::ok("e", vec!["alpha third"]),
    ];
    let store = Arc::new(MemoryStateStore::default());
    let (n, sent) = MockNotifier::new("chat", true);
    let mut mux = NotifierMux::new();
    mux.push(n);

    let pipeline = Pipeline::new(providers, store, mux);
    let summary = pipeline
        .run_once(&run_config(PushMode::Current), "alpha\n", &opts())
        .await
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Delivered);
    assert_eq!(summary.sources_attempted, 5);
    assert_eq!(summary.sources_succeeded, 3);
    assert_eq!(summary.items_fetched, 3);
    assert_eq!(summary.items_delivered, 3);
    assert_eq!(summary.source_errors.len(), 2);
    assert_eq!(sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn all_sources_failing_aborts_without_dispatch_or_state() {
    let providers = vec![
        MockProvider::failing("a"),
        MockProvider::failing("b"),
        MockProvider::failing("c"),
    ];
    let store = Arc::new(MemoryStateStore::default());
    let before = store.snapshot();
    let (n, sent) = MockNotifier::new("chat", true);
    let mut mux = NotifierMux::new();
    mux.push(n);

    let pipeline = Pipeline::new(providers, store.clone(), mux);
    let err = pipeline
        .run_once(&run_config(PushMode::Current), "alpha\n", &opts())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::AllSourcesFailed { attempted: 3 }
    ));
    assert!(sent.lock().unwrap().is_empty());
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn all_channels_failing_rolls_back_state() {
    let providers = vec![MockProvider::ok("a", vec!["alpha story"])];
    let store = Arc::new(MemoryStateStore::default());
    let before = store.snapshot();
    let (n1, _) = MockNotifier::new("one", false);
    let (n2, _) = MockNotifier::new("two", false);
    let mut mux = NotifierMux::new();
    mux.push(n1);
    mux.push(n2);

    let pipeline = Pipeline::new(providers, store.clone(), mux);
    let err = pipeline
        .run_once(&run_config(PushMode::Daily), "alpha\n", &opts())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::AllChannelsFailed { attempted: 2 }
    ));
    // set-for-set identical: the failed send left no trace
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn partial_channel_failure_still_commits() {
    let providers = vec![MockProvider::ok("a", vec!["alpha story"])];
    let store = Arc::new(MemoryStateStore::default());
    let (bad, _) = MockNotifier::new("bad", false);
    let (good, sent) = MockNotifier::new("good", true);
    let mut mux = NotifierMux::new();
    mux.push(bad);
    mux.push(good);

    let pipeline = Pipeline::new(providers, store.clone(), mux);
    let summary = pipeline
        .run_once(&run_config(PushMode::Daily), "alpha\n", &opts())
        .await
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Delivered);
    assert_eq!(summary.channels_succeeded, 1);
    assert_eq!(summary.channels_failed, 1);
    assert_eq!(sent.lock().unwrap().len(), 1);
    assert_eq!(store.snapshot().total_identities(), 1);
}

#[tokio::test]
async fn closed_window_skips_dispatch_and_keeps_items_eligible() {
    let providers = vec![MockProvider::ok("a", vec!["alpha story"])];
    let store = Arc::new(MemoryStateStore::default());
    let (n, sent) = MockNotifier::new("chat", true);
    let mut mux = NotifierMux::new();
    mux.push(n);

    let mut cfg = run_config(PushMode::Daily);
    cfg.window = PushWindow::from_spec(true, "09:00", "18:00").unwrap();
    let mut o = opts();
    o.now = Local.with_ymd_and_hms(2026, 8, 6, 3, 0, 0).unwrap();

    let pipeline = Pipeline::new(providers, store.clone(), mux);
    let summary = pipeline.run_once(&cfg, "alpha\n", &o).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::WindowClosed);
    assert!(sent.lock().unwrap().is_empty());
    assert_eq!(store.snapshot().total_identities(), 0);
}

#[tokio::test]
async fn force_bypasses_a_closed_window() {
    let providers = vec![MockProvider::ok("a", vec!["alpha story"])];
    let store = Arc::new(MemoryStateStore::default());
    let (n, sent) = MockNotifier::new("chat", true);
    let mut mux = NotifierMux::new();
    mux.push(n);

    let mut cfg = run_config(PushMode::Daily);
    cfg.window = PushWindow::from_spec(true, "09:00", "18:00").unwrap();
    let mut o = RunOptions::new(true);
    o.now = Local.with_ymd_and_hms(2026, 8, 6, 3, 0, 0).unwrap();

    let pipeline = Pipeline::new(providers, store, mux);
    let summary = pipeline.run_once(&cfg, "alpha\n", &o).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Delivered);
    assert_eq!(sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn incremental_mode_never_resends_after_commit() {
    let providers = vec![MockProvider::ok("a", vec!["alpha story", "alpha other"])];
    let store = Arc::new(MemoryStateStore::default());
    let (n, sent) = MockNotifier::new("chat", true);
    let mut mux = NotifierMux::new();
    mux.push(n);

    let pipeline = Pipeline::new(providers, store.clone(), mux);
    let cfg = run_config(PushMode::Incremental);

    let first = pipeline.run_once(&cfg, "alpha\n", &opts()).await.unwrap();
    assert_eq!(first.items_delivered, 2);

    // same listing next run: everything already known, nothing goes out
    let second = pipeline.run_once(&cfg, "alpha\n", &opts()).await.unwrap();
    assert_eq!(second.outcome, RunOutcome::NothingToDeliver);
    assert_eq!(second.items_delivered, 0);
    assert_eq!(sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn grammar_error_halts_before_any_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let providers = vec![MockProvider::counted("a", Arc::clone(&calls))];
    let store = Arc::new(MemoryStateStore::default());

    let pipeline = Pipeline::new(providers, store, NotifierMux::new());
    let err = pipeline
        .run_once(&run_config(PushMode::Daily), "!only-excludes\n", &opts())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Grammar(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn commit_failure_after_delivery_is_reported_as_run_failure() {
    let providers = vec![MockProvider::ok("a", vec!["alpha story"])];
    let (n, sent) = MockNotifier::new("chat", true);
    let mut mux = NotifierMux::new();
    mux.push(n);

    let pipeline = Pipeline::new(providers, Arc::new(BrokenCommitStore), mux);
    let err = pipeline
        .run_once(&run_config(PushMode::Daily), "alpha\n", &opts())
        .await
        .unwrap_err();

    // delivery happened, but the run must still fail: dedup history is lost
    assert_eq!(sent.lock().unwrap().len(), 1);
    assert!(matches!(err, PipelineError::State(_)));
}

#[tokio::test]
async fn cancellation_aborts_before_dispatch_and_commit() {
    let providers = vec![MockProvider::ok("a", vec!["alpha story"])];
    let store = Arc::new(MemoryStateStore::default());
    let (n, sent) = MockNotifier::new("chat", true);
    let mut mux = NotifierMux::new();
    mux.push(n);

    let o = opts();
    o.cancel.cancel();

    let pipeline = Pipeline::new(providers, store.clone(), mux);
    let summary = pipeline
        .run_once(&run_config(PushMode::Daily), "alpha\n", &o)
        .await
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Cancelled);
    assert!(sent.lock().unwrap().is_empty());
    assert_eq!(store.snapshot().total_identities(), 0);
}

#[tokio::test]
async fn enrichment_appends_text_and_its_failure_never_blocks_delivery() {
    use trendwatch::enrich::Enricher;
    use trendwatch::filter::Matched;

    struct FixedEnricher {
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Enricher for FixedEnricher {
        async fn enrich(&self, _items: &[Matched]) -> anyhow::Result<String> {
            if self.fail {
                anyhow::bail!("model unavailable")
            }
            Ok("Summary: one big story today.".to_string())
        }
        fn name(&self) -> &str {
            "fixed"
        }
    }

    for fail in [false, true] {
        let providers = vec![MockProvider::ok("a", vec!["alpha story"])];
        let store = Arc::new(MemoryStateStore::default());
        let (n, sent) = MockNotifier::new("chat", true);
        let mut mux = NotifierMux::new();
        mux.push(n);

        let pipeline = Pipeline::new(providers, store, mux)
            .with_enricher(Box::new(FixedEnricher { fail }));
        let summary = pipeline
            .run_once(&run_config(PushMode::Current), "alpha\n", &opts())
            .await
            .unwrap();

        assert_eq!(summary.outcome, RunOutcome::Delivered);
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].body.contains("Summary: one big story today."),
            !fail
        );
    }
}

#[tokio::test]
async fn slow_source_is_bounded_by_its_timeout() {
    struct SlowProvider;

    #[async_trait::async_trait]
    impl SourceProvider for SlowProvider {
        async fn fetch_latest(&self) -> Result<Vec<TrendItem>, FetchError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
        fn id(&self) -> &str {
            "slow"
        }
    }

    let providers: Vec<Arc<dyn SourceProvider>> = vec![
        Arc::new(SlowProvider),
        MockProvider::ok("fast", vec!["alpha story"]),
    ];
    let store = Arc::new(MemoryStateStore::default());
    let (n, _) = MockNotifier::new("chat", true);
    let mut mux = NotifierMux::new();
    mux.push(n);

    let mut cfg = run_config(PushMode::Current);
    cfg.per_source_timeout = Duration::from_millis(100);

    let pipeline = Pipeline::new(providers, store, mux);
    let summary = pipeline.run_once(&cfg, "alpha\n", &opts()).await.unwrap();

    assert_eq!(summary.sources_succeeded, 1);
    assert_eq!(summary.source_errors.len(), 1);
    assert!(summary.source_errors[0].1.contains("timed out"));
    assert_eq!(summary.outcome, RunOutcome::Delivered);
}
