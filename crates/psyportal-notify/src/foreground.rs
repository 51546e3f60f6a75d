//! Foreground push handler.
//! Push messages that arrive while the host is visible become in-app alerts,
//! keyed by `push-<type>-<id>` so a redundant delivery is shown once.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use psyportal_core::traits::{AlertSink, PushProvider};
use psyportal_core::types::{Alert, AlertLevel, PushMessage};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::route;

/// Remember this many recent keys for coalescing.
pub(crate) const SEEN_LIMIT: usize = 256;

/// Bounded set of recently shown keys; the oldest key is forgotten first.
#[derive(Debug, Default)]
pub(crate) struct RecentKeys {
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl RecentKeys {
    /// Record `key`. Returns false if it is already remembered.
    pub(crate) fn insert(&mut self, key: &str) -> bool {
        if self.seen.contains(key) {
            return false;
        }
        self.seen.insert(key.to_string());
        self.order.push_back(key.to_string());
        if self.order.len() > SEEN_LIMIT
            && let Some(oldest) = self.order.pop_front()
        {
            self.seen.remove(&oldest);
        }
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.seen.len()
    }
}

pub struct ForegroundHandler {
    alerts: Arc<dyn AlertSink>,
    recent: RecentKeys,
}

impl ForegroundHandler {
    pub fn new(alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            alerts,
            recent: RecentKeys::default(),
        }
    }

    /// Stable key for a push message.
    pub fn alert_key(message: &PushMessage) -> String {
        let kind = message.kind().unwrap_or("notification");
        match message.item_id() {
            Some(id) => format!("push-{kind}-{id}"),
            None => format!(
                "push-{kind}-{}|{}",
                message.title.as_deref().unwrap_or_default(),
                message.body.as_deref().unwrap_or_default()
            ),
        }
    }

    /// Show the alert unless the same key was already shown. Returns the shown alert.
    pub fn handle(&mut self, message: &PushMessage) -> Option<Alert> {
        let key = Self::alert_key(message);
        if !self.recent.insert(&key) {
            tracing::debug!("🔁 Coalesced duplicate push {key}");
            return None;
        }

        let alert = Alert {
            key,
            title: message
                .title
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "New notification".into()),
            body: message.body.clone().unwrap_or_default(),
            level: AlertLevel::Info,
            target: Some(route::target_for_push(message).to_string()),
        };
        self.alerts.alert(&alert);
        Some(alert)
    }

    /// Start consuming the provider's foreground messages.
    /// Returns `None` when the provider offers no foreground stream.
    pub fn subscribe(self, push: &dyn PushProvider) -> Option<Subscription> {
        let mut rx = push.subscribe()?;
        let mut handler = self;
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        handler.handle(&message);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("⚠️ Foreground handler skipped {n} push message(s)");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        tracing::debug!("👂 Listening for foreground pushes from {}", push.name());
        Some(Subscription { task })
    }
}

/// Live foreground subscription; unsubscribes when dropped.
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stop listening. The consumer task is aborted in `Drop`.
    pub fn unsubscribe(self) {
        drop(self);
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
