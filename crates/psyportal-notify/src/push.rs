//! Relay push provider.
//!
//! The delivery token is issued to the device out of band and configured
//! here; foreground messages are relayed in by whatever receives them on
//! this host (a platform bridge, a webhook listener, tests).

use async_trait::async_trait;
use psyportal_core::error::Result;
use psyportal_core::traits::PushProvider;
use psyportal_core::types::PushMessage;
use tokio::sync::broadcast;

pub struct RelayPushProvider {
    token: Option<String>,
    tx: broadcast::Sender<PushMessage>,
}

impl RelayPushProvider {
    pub fn new(device_token: &str) -> Self {
        let (tx, _) = broadcast::channel(64);
        let token = Some(device_token.trim())
            .filter(|t| !t.is_empty())
            .map(String::from);
        Self { token, tx }
    }

    /// Hand a foreground delivery to subscribers. Returns false when nobody listens.
    pub fn relay(&self, message: PushMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

#[async_trait]
impl PushProvider for RelayPushProvider {
    fn name(&self) -> &str {
        "relay"
    }

    async fn acquire_token(&self) -> Result<Option<String>> {
        Ok(self.token.clone())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<PushMessage>> {
        Some(self.tx.subscribe())
    }
}
