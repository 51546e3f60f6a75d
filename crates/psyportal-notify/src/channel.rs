//! Permission/channel initializer.
//!
//! Runs once an authenticated session exists. Granted permission activates
//! the push channel straight away; default permission only surfaces a
//! consent prompt and waits for the user; denied leaves polling as the only
//! source. Activation (token + backend registration) is attempted at most
//! once per session, and every failure degrades to the poll channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use psyportal_core::session::Session;
use psyportal_core::traits::{AlertSink, Backend, PermissionStore, PushProvider};
use psyportal_core::types::{Alert, PermissionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOnlyReason {
    Denied,
    Declined,
    NoToken,
    TokenError,
    RegistrationRejected,
    RegistrationError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    PushActive,
    /// Permission is `default`: the host must show a consent prompt and call
    /// [`ChannelInitializer::accept_prompt`] only if the user agrees.
    PromptRequired,
    PollOnly(PollOnlyReason),
    AlreadyAttempted,
}

pub struct ChannelInitializer {
    permissions: Arc<dyn PermissionStore>,
    push: Arc<dyn PushProvider>,
    backend: Arc<dyn Backend>,
    alerts: Arc<dyn AlertSink>,
    attempted: AtomicBool,
}

impl ChannelInitializer {
    pub fn new(
        permissions: Arc<dyn PermissionStore>,
        push: Arc<dyn PushProvider>,
        backend: Arc<dyn Backend>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            permissions,
            push,
            backend,
            alerts,
            attempted: AtomicBool::new(false),
        }
    }

    pub async fn start(&self, session: &Session) -> InitOutcome {
        match self.permissions.current() {
            PermissionState::Granted => self.activate(session).await,
            PermissionState::Default => {
                tracing::info!("🔔 Notification permission undecided — consent prompt required");
                InitOutcome::PromptRequired
            }
            PermissionState::Denied => {
                tracing::info!("🔕 Notifications denied — poll channel only");
                InitOutcome::PollOnly(PollOnlyReason::Denied)
            }
        }
    }

    /// The user explicitly agreed to enable notifications.
    pub async fn accept_prompt(&self, session: &Session) -> InitOutcome {
        if self.attempted.load(Ordering::SeqCst) {
            return InitOutcome::AlreadyAttempted;
        }
        match self.permissions.request().await {
            Ok(PermissionState::Granted) => self.activate(session).await,
            Ok(PermissionState::Denied) => {
                self.alerts.alert(&Alert::advisory(
                    "push-permission-denied",
                    "Notifications blocked",
                    "You will still see new tasks and messages while the app is open.",
                ));
                InitOutcome::PollOnly(PollOnlyReason::Denied)
            }
            Ok(PermissionState::Default) => InitOutcome::PollOnly(PollOnlyReason::Declined),
            Err(e) => {
                tracing::warn!("⚠️ Permission request failed: {e}");
                self.alerts.alert(&Alert::advisory(
                    "push-permission-error",
                    "Could not enable notifications",
                    "Check the notification permissions and try again.",
                ));
                InitOutcome::PollOnly(PollOnlyReason::Declined)
            }
        }
    }

    /// The user dismissed the consent prompt. Nothing else happens this session.
    pub fn decline_prompt(&self) -> InitOutcome {
        tracing::info!("🔕 Consent prompt dismissed — poll channel only");
        InitOutcome::PollOnly(PollOnlyReason::Declined)
    }

    async fn activate(&self, session: &Session) -> InitOutcome {
        if self.attempted.swap(true, Ordering::SeqCst) {
            return InitOutcome::AlreadyAttempted;
        }

        let token = match self.push.acquire_token().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::warn!("⚠️ {} returned no delivery token", self.push.name());
                self.advise_activation_failed();
                return InitOutcome::PollOnly(PollOnlyReason::NoToken);
            }
            Err(e) => {
                tracing::warn!("⚠️ {} token acquisition failed: {e}", self.push.name());
                self.advise_activation_failed();
                return InitOutcome::PollOnly(PollOnlyReason::TokenError);
            }
        };

        match self.backend.register_push_token(session, &token).await {
            Ok(true) => {
                session.set_push_active(true);
                tracing::info!("📲 Push channel active via {}", self.push.name());
                InitOutcome::PushActive
            }
            Ok(false) => {
                self.advise_activation_failed();
                InitOutcome::PollOnly(PollOnlyReason::RegistrationRejected)
            }
            Err(e) => {
                tracing::warn!("⚠️ Push token registration failed: {e}");
                self.advise_activation_failed();
                InitOutcome::PollOnly(PollOnlyReason::RegistrationError)
            }
        }
    }

    fn advise_activation_failed(&self) {
        self.alerts.alert(&Alert::advisory(
            "push-activation-failed",
            "Error enabling notifications",
            "Reload or check notification permissions. New items will still be checked every minute.",
        ));
    }
}
