//! Notification sinks: where local notifications and in-app alerts end up.
//! Supports: log output and a generic HTTP webhook (for desktop/mobile bridges).

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use psyportal_core::config::NotifyConfig;
use psyportal_core::error::{PortalError, Result};
use psyportal_core::traits::{AlertSink, LocalNotifier};
use psyportal_core::types::{Alert, AlertLevel, LocalNotification};

use crate::foreground::RecentKeys;
use crate::route;

/// Writes notifications to the log. A recently shown tag is coalesced.
#[derive(Default)]
pub struct LogNotifier {
    shown: Mutex<RecentKeys>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalNotifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn show(&self, notification: &LocalNotification) -> Result<()> {
        let first = self
            .shown
            .lock()
            .map_err(|_| PortalError::Storage("notifier lock poisoned".into()))?
            .insert(&notification.tag);
        if first {
            tracing::info!(
                "🔔 {} — {} (open {})",
                notification.title,
                notification.body,
                route::target_for_local(notification)
            );
        } else {
            tracing::debug!("🔁 Coalesced {}", notification.tag);
        }
        Ok(())
    }
}

/// POSTs each notification as JSON to a webhook. The receiver coalesces on `tag`.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    headers: Vec<(String, String)>,
}

impl WebhookNotifier {
    pub fn new(url: &str, headers: Vec<(String, String)>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            headers,
        }
    }
}

#[async_trait]
impl LocalNotifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn show(&self, notification: &LocalNotification) -> Result<()> {
        let mut req = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({
                "tag": notification.tag,
                "title": notification.title,
                "body": notification.body,
                "category": notification.category,
                "item_id": notification.item_id,
                "url": route::target_for_local(notification),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }))
            .timeout(std::time::Duration::from_secs(10));

        for (key, value) in &self.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| PortalError::Http(format!("Webhook send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::info!("✅ Webhook notification sent: {}", notification.tag);
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(PortalError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Build the configured notifier. Unknown or incomplete config falls back to the log.
pub fn notifier_from_config(config: &NotifyConfig) -> Arc<dyn LocalNotifier> {
    match config.sink.as_str() {
        "webhook" if !config.webhook_url.is_empty() => Arc::new(WebhookNotifier::new(
            &config.webhook_url,
            config.webhook_headers.clone(),
        )),
        "webhook" => {
            tracing::warn!("⚠️ notify.sink = webhook but no webhook_url — using log");
            Arc::new(LogNotifier::new())
        }
        "log" => Arc::new(LogNotifier::new()),
        other => {
            tracing::warn!("⚠️ Unknown notify.sink '{other}' — using log");
            Arc::new(LogNotifier::new())
        }
    }
}

/// In-app alerts rendered as log lines.
#[derive(Default)]
pub struct LogAlerts;

impl AlertSink for LogAlerts {
    fn alert(&self, alert: &Alert) {
        match alert.level {
            AlertLevel::Info => match &alert.target {
                Some(target) => tracing::info!("💬 {}: {} (open {target})", alert.title, alert.body),
                None => tracing::info!("💬 {}: {}", alert.title, alert.body),
            },
            AlertLevel::Warning => tracing::warn!("⚠️ {}: {}", alert.title, alert.body),
        }
    }
}
