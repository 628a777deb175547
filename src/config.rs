// src/config.rs
//! Application configuration: TOML file with environment overrides. The
//! config is an explicit value passed into each pipeline invocation, never
//! hidden process state; the keyword grammar lives in its own line-oriented
//! file and is re-read at every run start.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::state::PushMode;
use crate::window::PushWindow;

pub const DEFAULT_CONFIG_PATH: &str = "config/trendwatch.toml";
pub const ENV_CONFIG_PATH: &str = "TRENDWATCH_CONFIG_PATH";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub fetch: FetchSection,
    pub report: ReportSection,
    pub window: WindowSection,
    pub notify: NotifySection,
    pub state: StateSection,
    pub schedule: ScheduleSection,
    pub api: ApiSection,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchSection {
    pub timeout_secs: u64,
    pub sources: Vec<SourceSpec>,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            sources: Vec::new(),
        }
    }
}

/// One configured platform. Concrete adapters are looked up by `kind`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SourceSpec {
    pub id: String,
    /// "hotlist" | "rss"
    pub kind: String,
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportSection {
    /// daily | current | incremental
    pub mode: String,
    pub keywords_path: String,
    /// Day-keys older than this are pruned at commit time (0 = keep all).
    /// Never applied in incremental mode.
    pub retention_days: u32,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            mode: "daily".to_string(),
            keywords_path: "config/keywords.txt".to_string(),
            retention_days: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowSection {
    pub enabled: bool,
    pub start: String,
    pub end: String,
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            enabled: false,
            start: "09:00".to_string(),
            end: "18:00".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotifySection {
    pub enabled: Option<bool>,
    pub webhooks: Vec<WebhookSpec>,
    pub email: Option<EmailSpec>,
}

impl NotifySection {
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WebhookSpec {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EmailSpec {
    pub smtp_host: String,
    pub user: String,
    /// "ENV" means: read from TRENDWATCH_SMTP_PASS
    pub password: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StateSection {
    pub path: String,
}

impl Default for StateSection {
    fn default() -> Self {
        Self {
            path: "state/push_state.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleSection {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiSection {
    pub enabled: bool,
    pub bind: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load from an explicit path. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading config from {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("parsing config at {}", path.display()))?
        } else {
            Self::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Load using $TRENDWATCH_CONFIG_PATH, falling back to the default path.
    pub fn load_default() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    /// Environment overrides for the knobs that differ between deployments.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TRENDWATCH_REPORT_MODE") {
            self.report.mode = v;
        }
        if let Ok(v) = std::env::var("TRENDWATCH_WINDOW_ENABLED") {
            self.window.enabled = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("TRENDWATCH_WINDOW_START") {
            self.window.start = v;
        }
        if let Ok(v) = std::env::var("TRENDWATCH_WINDOW_END") {
            self.window.end = v;
        }
        if let Ok(v) = std::env::var("TRENDWATCH_NOTIFY_ENABLED") {
            self.notify.enabled = Some(parse_bool(&v));
        }
        if let Ok(v) = std::env::var("TRENDWATCH_WEBHOOK_URL") {
            if !v.trim().is_empty() {
                self.notify.webhooks.push(WebhookSpec {
                    name: "webhook-env".to_string(),
                    url: v,
                });
            }
        }
        if let Ok(v) = std::env::var("TRENDWATCH_STATE_PATH") {
            self.state.path = v;
        }
        if let Ok(v) = std::env::var("TRENDWATCH_KEYWORDS_PATH") {
            self.report.keywords_path = v;
        }
    }

    /// Validate and resolve the per-run parameters.
    pub fn run_config(&self) -> Result<crate::pipeline::RunConfig> {
        let mode: PushMode = self
            .report
            .mode
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        let window =
            PushWindow::from_spec(self.window.enabled, &self.window.start, &self.window.end)?;
        Ok(crate::pipeline::RunConfig {
            mode,
            per_source_timeout: Duration::from_secs(self.fetch.timeout_secs.max(1)),
            window,
            retention_days: self.report.retention_days,
            notify_enabled: self.notify.enabled(),
        })
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
