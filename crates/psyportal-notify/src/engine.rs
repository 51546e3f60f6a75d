//! Poll loop and heartbeat loop.
//! Uses tokio::interval: the first tick fires immediately, later ticks every
//! interval. A slow cycle delays the next tick instead of overlapping it.

use std::sync::Arc;
use std::time::Duration;

use psyportal_core::session::Session;
use psyportal_core::traits::{Backend, KnownSetStore, LocalNotifier};
use psyportal_core::types::LocalNotification;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::detector::ChangeDetector;
use crate::notify::NotificationArbiter;

/// One session's poll channel: detector + arbiter bound to a backend.
pub struct Poller {
    backend: Arc<dyn Backend>,
    session: Session,
    detector: ChangeDetector,
    arbiter: NotificationArbiter,
}

impl Poller {
    pub fn new(
        backend: Arc<dyn Backend>,
        session: Session,
        store: Arc<dyn KnownSetStore>,
        notifier: Arc<dyn LocalNotifier>,
    ) -> Self {
        Self {
            backend,
            session,
            detector: ChangeDetector::new(store),
            arbiter: NotificationArbiter::new(notifier),
        }
    }

    /// Run one detection cycle. Fetch failures are logged and skip the cycle.
    pub async fn tick(&mut self) -> Vec<LocalNotification> {
        match self.detector.run_cycle(self.backend.as_ref(), &self.session).await {
            Ok(outcome) => self.arbiter.arbitrate(&self.session, outcome.added()).await,
            Err(e) if e.is_transient() => {
                tracing::warn!("⚠️ Poll cycle skipped, retrying next interval: {e}");
                Vec::new()
            }
            Err(e) => {
                tracing::error!("❌ Poll cycle skipped: {e}");
                Vec::new()
            }
        }
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn arbiter(&self) -> &NotificationArbiter {
        &self.arbiter
    }
}

/// Handle to a background loop. Dropping it stops the loop at its next
/// suspension point; work still in flight is discarded.
pub struct LoopHandle {
    name: &'static str,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl LoopHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the loop and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::warn!("⚠️ {} loop ended abnormally: {e}", self.name);
        }
    }
}

fn ticker(every: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(every.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Spawn the poll loop as a background tokio task.
pub fn spawn_poller(mut poller: Poller, every: Duration) -> LoopHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        tracing::info!("⏰ Poller started (every {}s)", every.as_secs());
        let mut interval = ticker(every);
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = interval.tick() => {}
            }
            tokio::select! {
                _ = &mut stop_rx => break,
                shown = poller.tick() => {
                    if !shown.is_empty() {
                        tracing::debug!("📣 {} notification(s) shown this cycle", shown.len());
                    }
                }
            }
        }
        let arbiter = poller.arbiter();
        tracing::info!(
            "⏹️ Poller stopped ({} recent notification(s), {} suppressed while push was active)",
            arbiter.history().len(),
            arbiter.suppressed_count()
        );
    });
    LoopHandle {
        name: "poller",
        stop: Some(stop_tx),
        task,
    }
}

/// Spawn the online-status heartbeat. Failures are silent.
pub fn spawn_heartbeat(backend: Arc<dyn Backend>, session: Session, every: Duration) -> LoopHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        tracing::debug!("💓 Heartbeat started (every {}s)", every.as_secs());
        let mut interval = ticker(every);
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = interval.tick() => {}
            }
            tokio::select! {
                _ = &mut stop_rx => break,
                result = backend.heartbeat(&session) => {
                    if let Err(e) = result {
                        tracing::debug!("Heartbeat failed: {e}");
                    }
                }
            }
        }
    });
    LoopHandle {
        name: "heartbeat",
        stop: Some(stop_tx),
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::tests::{FakeBackend, message, session};
    use crate::notify::tests::RecordingNotifier;
    use crate::store::MemoryKnownStore;
    use psyportal_core::types::Category;

    struct Rig {
        backend: Arc<FakeBackend>,
        notifier: Arc<RecordingNotifier>,
        session: Session,
    }

    fn rig() -> (Rig, Poller) {
        let backend = Arc::new(FakeBackend::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let session = session();
        let poller = Poller::new(
            backend.clone(),
            session.clone(),
            Arc::new(MemoryKnownStore::new()),
            notifier.clone(),
        );
        (Rig { backend, notifier, session }, poller)
    }

    fn known(poller: &Poller, category: Category) -> Vec<i64> {
        poller
            .detector()
            .known(category)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_scenario_a_priming() {
        let (rig, mut poller) = rig();
        rig.backend.set_assignments(&[101, 102]);
        assert!(poller.tick().await.is_empty());
        assert_eq!(known(&poller, Category::Assignment), vec![101, 102]);
        assert!(rig.notifier.tags().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_b_new_item_with_push_inactive() {
        let (rig, mut poller) = rig();
        rig.backend.set_assignments(&[101, 102]);
        poller.tick().await;
        rig.backend.set_assignments(&[101, 102, 103]);
        let shown = poller.tick().await;
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].item_id, 103);
        assert_eq!(rig.notifier.tags(), vec!["poll-quest-103"]);
        assert_eq!(known(&poller, Category::Assignment), vec![101, 102, 103]);
    }

    #[tokio::test]
    async fn test_scenario_c_push_active_still_updates_known_set() {
        let (rig, mut poller) = rig();
        rig.backend.set_assignments(&[101, 102]);
        poller.tick().await;
        rig.session.set_push_active(true);
        rig.backend.set_assignments(&[101, 102, 103]);
        assert!(poller.tick().await.is_empty());
        assert!(rig.notifier.tags().is_empty());
        assert_eq!(known(&poller, Category::Assignment), vec![101, 102, 103]);

        // Push lost later: polling resumes without re-announcing 103.
        rig.session.set_push_active(false);
        assert!(poller.tick().await.is_empty());
    }

    #[tokio::test]
    async fn test_scenario_d_fetch_error_changes_nothing() {
        let (rig, mut poller) = rig();
        rig.backend.set_assignments(&[101, 102]);
        poller.tick().await;
        rig.backend.set_assignments(&[101, 102, 103]);
        *rig.backend.fail_messages.lock().unwrap() = true;
        assert!(poller.tick().await.is_empty());
        assert_eq!(known(&poller, Category::Assignment), vec![101, 102]);
        assert!(rig.notifier.tags().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_assignments_skip_the_whole_cycle() {
        let (rig, mut poller) = rig();
        rig.backend.set_assignments(&[101]);
        *rig.backend.messages.lock().unwrap() = vec![message(1, false)];
        poller.tick().await;

        rig.backend.set_assignments(&[101, 102]);
        *rig.backend.messages.lock().unwrap() = vec![message(1, false), message(2, false)];
        *rig.backend.fail_assignments.lock().unwrap() = true;
        assert!(poller.tick().await.is_empty());
        assert_eq!(known(&poller, Category::Assignment), vec![101]);
        assert_eq!(known(&poller, Category::Message), vec![1]);
        assert!(rig.notifier.tags().is_empty());

        *rig.backend.fail_assignments.lock().unwrap() = false;
        poller.tick().await;
        let mut tags = rig.notifier.tags();
        tags.sort();
        assert_eq!(tags, vec!["poll-msg-2", "poll-quest-102"]);
    }

    #[tokio::test]
    async fn test_scenario_e_only_incoming_messages_notify() {
        let (rig, mut poller) = rig();
        poller.tick().await;
        *rig.backend.messages.lock().unwrap() =
            vec![message(1, true), message(2, false), message(3, true)];
        let shown = poller.tick().await;
        assert_eq!(shown.len(), 1);
        assert_eq!(rig.notifier.tags(), vec!["poll-msg-2"]);
        assert_eq!(known(&poller, Category::Message), vec![2]);
    }

    #[tokio::test]
    async fn test_emitted_is_subset_of_added() {
        let (rig, mut poller) = rig();
        rig.backend.set_assignments(&[1, 2, 3]);
        poller.tick().await;
        let rounds: [&[i64]; 4] = [&[1, 2, 3, 4], &[2, 3, 4, 5, 6], &[6], &[1, 6, 7]];
        let mut before: Vec<i64> = vec![1, 2, 3];
        for round in rounds {
            rig.backend.set_assignments(round);
            let shown = poller.tick().await;
            for n in &shown {
                assert!(round.contains(&n.item_id));
                assert!(!before.contains(&n.item_id));
            }
            before = round.to_vec();
        }
    }

    #[tokio::test]
    async fn test_spawned_poller_primes_immediately_and_stops() {
        let (rig, poller) = rig();
        rig.backend.set_assignments(&[1]);
        let handle = spawn_poller(poller, Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.is_running());
        assert!(rig.notifier.tags().is_empty());

        rig.backend.set_assignments(&[1, 2]);
        for _ in 0..50 {
            if !rig.notifier.tags().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(rig.notifier.tags(), vec!["poll-quest-2"]);

        handle.stop().await;
        rig.backend.set_assignments(&[1, 2, 3]);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(rig.notifier.tags(), vec!["poll-quest-2"]);
    }

    #[tokio::test]
    async fn test_heartbeat_loop_ticks_until_dropped() {
        let backend = Arc::new(FakeBackend::default());
        let handle = spawn_heartbeat(backend.clone(), session(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(45)).await;
        assert!(*backend.heartbeats.lock().unwrap() >= 2);
        drop(handle);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_drop = *backend.heartbeats.lock().unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(*backend.heartbeats.lock().unwrap(), after_drop);
    }
}
