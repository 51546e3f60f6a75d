//! Poll-based change detector.
//!
//! Each cycle fetches the current pending assignments and messages, keeps
//! only messages the patient did not write, and diffs the observed ids
//! against the known sets. The first cycle of a session only records a
//! baseline. After every successful cycle the stored sets are *replaced* by
//! what was just observed, whether or not push is active, so resolved items
//! drop out and a later fallback to polling never re-announces old items.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use psyportal_core::error::Result;
use psyportal_core::session::Session;
use psyportal_core::traits::{Backend, KnownSetStore};
use psyportal_core::types::{Category, ChatMessage, PendingAssignment};

/// An item seen for the first time in this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Added {
    pub category: Category,
    pub id: i64,
    /// Display label (questionnaire title); messages carry none.
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Baseline recorded; nothing may be announced.
    Primed { assignments: usize, messages: usize },
    Diffed { added: Vec<Added> },
}

impl CycleOutcome {
    pub fn added(&self) -> &[Added] {
        match self {
            CycleOutcome::Primed { .. } => &[],
            CycleOutcome::Diffed { added } => added,
        }
    }
}

pub struct ChangeDetector {
    store: Arc<dyn KnownSetStore>,
    known: HashMap<Category, BTreeSet<i64>>,
    primed: bool,
}

impl ChangeDetector {
    /// Resume from the store when both categories are present there;
    /// otherwise start unprimed.
    pub fn new(store: Arc<dyn KnownSetStore>) -> Self {
        let mut known = HashMap::new();
        for category in Category::ALL {
            match store.load(category) {
                Ok(Some(ids)) => {
                    known.insert(category, ids);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("⚠️ Ignoring stored {}: {e}", category.storage_key()),
            }
        }
        let primed = known.len() == Category::ALL.len();
        if primed {
            tracing::info!("🔁 Resuming with stored known sets");
        } else {
            known.clear();
        }
        Self {
            store,
            known,
            primed,
        }
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    pub fn known(&self, category: Category) -> Option<&BTreeSet<i64>> {
        self.known.get(&category)
    }

    /// One detection cycle. If either fetch fails the error is returned and
    /// the known sets are left exactly as they were.
    pub async fn run_cycle(
        &mut self,
        backend: &dyn Backend,
        session: &Session,
    ) -> Result<CycleOutcome> {
        let (assignments, messages) = tokio::join!(
            backend.pending_assignments(session),
            backend.messages(session)
        );
        let assignments = assignments?;
        let messages = messages?;
        Ok(self.observe(&assignments, &messages))
    }

    /// Diff a complete observation against the known sets and replace them.
    pub fn observe(
        &mut self,
        assignments: &[PendingAssignment],
        messages: &[ChatMessage],
    ) -> CycleOutcome {
        let incoming: Vec<&ChatMessage> = messages.iter().filter(|m| !m.is_from_patient).collect();
        let assignment_ids: BTreeSet<i64> = assignments.iter().map(|a| a.id).collect();
        let message_ids: BTreeSet<i64> = incoming.iter().map(|m| m.id).collect();

        if !self.primed {
            let outcome = CycleOutcome::Primed {
                assignments: assignment_ids.len(),
                messages: message_ids.len(),
            };
            self.replace(Category::Assignment, assignment_ids);
            self.replace(Category::Message, message_ids);
            self.primed = true;
            tracing::info!("📌 Baseline recorded: {:?}", outcome);
            return outcome;
        }

        let mut added = Vec::new();
        let known_assignments = self.known.get(&Category::Assignment);
        let mut seen = BTreeSet::new();
        for a in assignments {
            if known_assignments.is_some_and(|k| k.contains(&a.id)) || !seen.insert(a.id) {
                continue;
            }
            added.push(Added {
                category: Category::Assignment,
                id: a.id,
                label: Some(a.title().to_string()),
            });
        }

        let known_messages = self.known.get(&Category::Message);
        let mut seen = BTreeSet::new();
        for m in incoming {
            if known_messages.is_some_and(|k| k.contains(&m.id)) || !seen.insert(m.id) {
                continue;
            }
            added.push(Added {
                category: Category::Message,
                id: m.id,
                label: None,
            });
        }

        self.replace(Category::Assignment, assignment_ids);
        self.replace(Category::Message, message_ids);

        if !added.is_empty() {
            tracing::info!("🆕 {} new item(s) detected", added.len());
        }
        CycleOutcome::Diffed { added }
    }

    fn replace(&mut self, category: Category, ids: BTreeSet<i64>) {
        if let Err(e) = self.store.save(category, &ids) {
            tracing::warn!("⚠️ Failed to persist {}: {e}", category.storage_key());
        }
        self.known.insert(category, ids);
    }
}
