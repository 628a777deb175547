// src/scheduler.rs
use std::sync::Arc;

use metrics::counter;
use tokio::task::JoinHandle;

use crate::pipeline::Runner;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub interval_secs: u64,
}

/// Spawn the interval loop driving scheduled pipeline runs. A failed run is
/// logged and the next tick proceeds; the runner serializes against manual
/// triggers.
pub fn spawn_interval_runner(cfg: SchedulerCfg, runner: Arc<Runner>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = std::time::Duration::from_secs(cfg.interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            counter!("scheduler_ticks_total").increment(1);

            match runner.trigger(false).await {
                Ok(summary) => {
                    tracing::info!(
                        target: "scheduler",
                        outcome = ?summary.outcome,
                        delivered = summary.items_delivered,
                        "scheduled run finished"
                    );
                }
                Err(e) => {
                    tracing::warn!(target: "scheduler", error = %e, "scheduled run failed");
                }
            }
        }
    })
}
