//! Trait seams for everything outside this repository: the clinic backend,
//! the push provider, the host's permission store and notification surfaces,
//! and local persistence.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::session::Session;
use crate::types::{
    Alert, Category, ChatMessage, LocalNotification, PendingAssignment, PermissionState,
    PushMessage,
};

/// The slice of the clinic backend the notification mechanism consumes.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn pending_assignments(&self, session: &Session) -> Result<Vec<PendingAssignment>>;

    async fn messages(&self, session: &Session) -> Result<Vec<ChatMessage>>;

    /// Returns `Ok(false)` when the backend answered but refused the token.
    async fn register_push_token(&self, session: &Session, token: &str) -> Result<bool>;

    async fn heartbeat(&self, session: &Session) -> Result<()>;
}

/// Cloud messaging provider.
#[async_trait]
pub trait PushProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Delivery token for this device, `None` when the provider has none to give.
    async fn acquire_token(&self) -> Result<Option<String>>;

    /// Messages delivered while the host is in the foreground.
    fn subscribe(&self) -> Option<broadcast::Receiver<PushMessage>>;
}

/// The host's notification permission store.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    fn current(&self) -> PermissionState;

    /// Ask for consent. Only ever called in response to an explicit user action.
    async fn request(&self) -> Result<PermissionState>;
}

/// System-level notification surface.
#[async_trait]
pub trait LocalNotifier: Send + Sync {
    fn name(&self) -> &str;

    async fn show(&self, notification: &LocalNotification) -> Result<()>;
}

/// In-app alert surface (toasts, banners). Never blocks.
pub trait AlertSink: Send + Sync {
    fn alert(&self, alert: &Alert);
}

/// Durable storage for known-ID sets, one per category under a fixed key.
pub trait KnownSetStore: Send + Sync {
    /// `None` when nothing has been stored for this category in the current session.
    fn load(&self, category: Category) -> Result<Option<BTreeSet<i64>>>;

    /// Replaces the stored set.
    fn save(&self, category: Category, ids: &BTreeSet<i64>) -> Result<()>;

    /// Drops every category. Called on login and logout.
    fn clear(&self) -> Result<()>;
}
