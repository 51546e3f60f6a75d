//! # psyportal notify
//!
//! Dual-channel notification delivery with de-duplication.
//!
//! ## Architecture
//! ```text
//! session start
//!   └── ChannelInitializer ── granted ──→ PushProvider token → Backend register
//!          │                                 └── ok → Session.push_active = true
//!          ├── default → consent prompt (activation only on explicit accept)
//!          └── denied  → poll channel only
//!
//! Poller (tokio interval, immediate first tick)
//!   └── ChangeDetector: fetch assignments + messages → diff vs known sets
//!          ├── first cycle of a session: prime, emit nothing
//!          └── added items → NotificationArbiter
//!                 ├── push active → suppress
//!                 └── else → LocalNotifier.show(tag = poll-quest-<id> / poll-msg-<id>)
//!
//! ForegroundHandler: PushProvider.subscribe() → AlertSink (coalesced by push-<type>-<id>)
//! ```

pub mod channel;
pub mod detector;
pub mod dispatch;
pub mod engine;
pub mod foreground;
pub mod notify;
pub mod permission;
pub mod push;
pub mod route;
pub mod store;

pub use channel::{ChannelInitializer, InitOutcome, PollOnlyReason};
pub use detector::{Added, ChangeDetector, CycleOutcome};
pub use dispatch::{LogAlerts, LogNotifier, WebhookNotifier, notifier_from_config};
pub use engine::{LoopHandle, Poller, spawn_heartbeat, spawn_poller};
pub use foreground::{ForegroundHandler, Subscription};
pub use notify::NotificationArbiter;
pub use permission::FilePermissionStore;
pub use push::RelayPushProvider;
pub use store::{FileKnownStore, MemoryKnownStore};
