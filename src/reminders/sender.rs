//! Outbound delivery of rendered reminders.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

/// Sender capability contract. New delivery channels only need to implement this trait.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Stable sender identifier (e.g. `webhook`, `log`).
    fn id(&self) -> &'static str;

    /// Deliver `text` to a member's external address.
    async fn send(&self, address: &str, text: &str) -> anyhow::Result<()>;
}

/// Posts `{"address": …, "text": …}` as JSON to a fixed URL.
///
/// Any non-2xx response counts as a failed delivery.
pub struct WebhookSender {
    url: String,
    client: reqwest::Client,
}

impl WebhookSender {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            anyhow::bail!("webhook url is empty");
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    fn id(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, address: &str, text: &str) -> anyhow::Result<()> {
        let body = serde_json::json!({
            "address": address,
            "text": text,
        });
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("webhook delivery failed ({status}): {body}");
        }

        Ok(())
    }
}

/// Writes reminders to the log instead of delivering them.
///
/// Attached by the daemon when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    fn id(&self) -> &'static str {
        "log"
    }

    async fn send(&self, address: &str, text: &str) -> anyhow::Result<()> {
        info!(address, "reminder:\n{text}");
        Ok(())
    }
}
