// src/notify/webhook.rs
use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::Client;

use super::{Notifier, NotifyPayload};

/// Generic JSON webhook channel (Slack-compatible `{"text": ...}` body).
#[derive(Clone)]
pub struct WebhookNotifier {
    name: String,
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl WebhookNotifier {
    pub fn new(name: impl Into<String>, webhook: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            webhook: webhook.into(),
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, payload: &NotifyPayload) -> Result<()> {
        let text = format!("*{}*\n\n{}", payload.title, payload.body);
        let body = serde_json::json!({ "text": text, "mrkdwn": true });

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(&body)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1)))
                                .await;
                            continue;
                        }
                        return Err(anyhow!("webhook {} HTTP error: {e}", self.name));
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(anyhow!("webhook {} request failed: {e}", self.name));
                }
            }
        }
    }

    fn channel(&self) -> &str {
        &self.name
    }
}
