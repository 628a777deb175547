//! Trendwatch — Binary Entrypoint
//! Runs the aggregation-filter-dedup pipeline once (cron-shaped), or hosts
//! the interval scheduler and the status API when enabled in configuration.

use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trendwatch::api::{self, AppState};
use trendwatch::config::AppConfig;
use trendwatch::filter::CompiledGrammar;
use trendwatch::pipeline::{Pipeline, Runner};
use trendwatch::scheduler::{spawn_interval_runner, SchedulerCfg};
use trendwatch::source::providers::build_providers;
use trendwatch::state::JsonStateStore;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("trendwatch=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::load_default()?;

    // Validate the grammar at boot so a broken keywords file fails fast.
    // Each run still re-reads and recompiles it.
    match std::fs::read_to_string(&config.report.keywords_path) {
        Ok(text) => {
            let grammar = CompiledGrammar::compile(&text)?;
            tracing::info!(stats = ?grammar.stats(), "keyword grammar loaded");
        }
        Err(_) => {
            tracing::warn!(
                path = %config.report.keywords_path,
                "keywords file missing; all items will pass through"
            );
        }
    }

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .ok();

    let providers = build_providers(&config.fetch.sources);
    if providers.is_empty() {
        tracing::warn!("no sources configured; runs will abort");
    }
    let store = Arc::new(JsonStateStore::new(&config.state.path));
    let mux = trendwatch::notify::build_mux(&config.notify)?;
    tracing::info!(
        sources = providers.len(),
        channels = ?mux.channels(),
        mode = %config.report.mode,
        "trendwatch starting"
    );

    let pipeline = Pipeline::new(providers, store, mux);
    let runner = Arc::new(Runner::new(config.clone(), pipeline));

    let force = std::env::var("TRENDWATCH_FORCE").ok().as_deref() == Some("1");

    if !config.schedule.enabled && !config.api.enabled {
        // one-shot, cron-shaped
        let summary = runner.trigger(force).await?;
        tracing::info!(
            outcome = ?summary.outcome,
            delivered = summary.items_delivered,
            "run complete"
        );
        return Ok(());
    }

    if config.schedule.enabled {
        spawn_interval_runner(
            SchedulerCfg {
                interval_secs: config.schedule.interval_secs,
            },
            Arc::clone(&runner),
        );
    }

    if config.api.enabled {
        let state = AppState {
            runner,
            metrics: metrics_handle,
        };
        let router = api::create_router(state);
        let listener = tokio::net::TcpListener::bind(&config.api.bind).await?;
        tracing::info!(bind = %config.api.bind, "status api listening");
        axum::serve(listener, router).await?;
    } else {
        tokio::signal::ctrl_c().await?;
    }

    Ok(())
}
