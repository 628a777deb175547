// src/notify/mod.rs
pub mod email;
pub mod webhook;

use serde::Serialize;

/// Rendered digest handed to every channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyPayload {
    pub title: String,
    pub body: String,
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, payload: &NotifyPayload) -> anyhow::Result<()>;
    fn channel(&self) -> &str;
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelOutcome {
    pub channel: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn any_succeeded(outcomes: &[ChannelOutcome]) -> bool {
    outcomes.iter().any(|o| o.ok)
}

/// Fans one payload out to every configured channel and reports per-channel
/// success/failure. One channel failing never stops the others.
#[derive(Default)]
pub struct NotifierMux {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    pub fn channels(&self) -> Vec<String> {
        self.notifiers.iter().map(|n| n.channel().to_string()).collect()
    }

    pub async fn send_all(&self, payload: &NotifyPayload) -> Vec<ChannelOutcome> {
        let mut outcomes = Vec::with_capacity(self.notifiers.len());
        for n in &self.notifiers {
            match n.send(payload).await {
                Ok(()) => {
                    tracing::info!(channel = n.channel(), "notification delivered");
                    outcomes.push(ChannelOutcome {
                        channel: n.channel().to_string(),
                        ok: true,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(channel = n.channel(), error = %e, "notification failed");
                    outcomes.push(ChannelOutcome {
                        channel: n.channel().to_string(),
                        ok: false,
                        error: Some(format!("{e:#}")),
                    });
                }
            }
        }
        outcomes
    }
}

/// Build the channel fan-out from configuration. Empty webhook URLs are
/// skipped; the email password supports the "ENV" indirection.
pub fn build_mux(cfg: &crate::config::NotifySection) -> anyhow::Result<NotifierMux> {
    let mut mux = NotifierMux::new();
    for w in &cfg.webhooks {
        if w.url.trim().is_empty() {
            continue;
        }
        mux.push(Box::new(webhook::WebhookNotifier::new(
            w.name.clone(),
            w.url.clone(),
        )));
    }
    if let Some(e) = &cfg.email {
        let pass = if e.password.trim().eq_ignore_ascii_case("env") {
            std::env::var("TRENDWATCH_SMTP_PASS")
                .map_err(|_| anyhow::anyhow!("missing TRENDWATCH_SMTP_PASS env var"))?
        } else {
            e.password.clone()
        };
        mux.push(Box::new(email::EmailNotifier::new(
            &e.smtp_host,
            &e.user,
            &pass,
            &e.from,
            &e.to,
        )?));
    }
    Ok(mux)
}
