//! Notification arbiter: decides whether a poll detection becomes a local
//! notification. While push is active the push channel owns delivery and
//! every poll-origin notification is suppressed.

use std::sync::Arc;

use psyportal_core::session::Session;
use psyportal_core::traits::LocalNotifier;
use psyportal_core::types::{Category, LocalNotification};

use crate::detector::Added;

const HISTORY_LIMIT: usize = 100;

pub struct NotificationArbiter {
    notifier: Arc<dyn LocalNotifier>,
    /// Emitted notifications (ring buffer, max 100).
    history: Vec<LocalNotification>,
    suppressed: u64,
}

impl NotificationArbiter {
    pub fn new(notifier: Arc<dyn LocalNotifier>) -> Self {
        Self {
            notifier,
            history: Vec::new(),
            suppressed: 0,
        }
    }

    /// Compose the local notification for a newly detected item.
    pub fn compose(added: &Added) -> LocalNotification {
        let (title, body) = match added.category {
            Category::Assignment => (
                "New task available".to_string(),
                match &added.label {
                    Some(title) => format!("You have a new pending questionnaire: {title}"),
                    None => "You have a new pending questionnaire".to_string(),
                },
            ),
            Category::Message => (
                "New message".to_string(),
                "You have a new message from your therapist".to_string(),
            ),
        };
        LocalNotification {
            tag: added.category.dedup_tag(added.id),
            title,
            body,
            category: added.category,
            item_id: added.id,
        }
    }

    /// Emit (or suppress) notifications for one cycle's additions.
    /// Returns what was actually shown.
    pub async fn arbitrate(&mut self, session: &Session, added: &[Added]) -> Vec<LocalNotification> {
        if added.is_empty() {
            return Vec::new();
        }
        if session.is_push_active() {
            self.suppressed += added.len() as u64;
            tracing::debug!("🔕 Push active — suppressed {} poll notification(s)", added.len());
            return Vec::new();
        }

        let mut shown = Vec::new();
        for item in added {
            let notification = Self::compose(item);
            match self.notifier.show(&notification).await {
                Ok(()) => {
                    self.record(notification.clone());
                    shown.push(notification);
                }
                Err(e) => {
                    tracing::warn!(
                        "⚠️ {} failed to show {}: {e}",
                        self.notifier.name(),
                        notification.tag
                    );
                }
            }
        }
        shown
    }

    fn record(&mut self, notification: LocalNotification) {
        self.history.push(notification);
        if self.history.len() > HISTORY_LIMIT {
            self.history.remove(0);
        }
    }

    pub fn history(&self) -> &[LocalNotification] {
        &self.history
    }

    /// How many poll detections were swallowed because push was active.
    pub fn suppressed_count(&self) -> u64 {
        self.suppressed
    }
}
