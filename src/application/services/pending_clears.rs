//! Time-bounded set of conversations the user just read locally.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::domain::entities::ConversationId;

/// Default lifetime of an optimistic clear.
pub const PENDING_CLEAR_TTL: Duration = Duration::from_secs(15);

/// Conversations whose unread count is masked to zero until the backend catches up.
#[derive(Debug)]
pub struct PendingClears {
    entries: HashMap<ConversationId, Instant>,
    ttl: Duration,
}

impl PendingClears {
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(PENDING_CLEAR_TTL)
    }

    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Inserts or refreshes an entry.
    pub fn insert(&mut self, id: ConversationId) {
        self.insert_at(id, Instant::now());
    }

    pub fn insert_at(&mut self, id: ConversationId, now: Instant) {
        self.entries.insert(id, now);
    }

    pub fn remove(&mut self, id: &ConversationId) -> bool {
        self.entries.remove(id).is_some()
    }

    #[must_use]
    pub fn contains(&self, id: &ConversationId) -> bool {
        self.contains_at(id, Instant::now())
    }

    #[must_use]
    pub fn contains_at(&self, id: &ConversationId, now: Instant) -> bool {
        self.entries
            .get(id)
            .is_some_and(|inserted| !self.is_expired(*inserted, now))
    }

    /// Drops expired entries and returns their ids.
    pub fn purge_expired_at(&mut self, now: Instant) -> Vec<ConversationId> {
        let ttl = self.ttl;
        let mut purged = Vec::new();
        self.entries.retain(|id, inserted| {
            let live = now.saturating_duration_since(*inserted) < ttl;
            if !live {
                purged.push(id.clone());
            }
            live
        });
        purged
    }

    /// Snapshot of live ids.
    #[must_use]
    pub fn live_at(&self, now: Instant) -> HashSet<ConversationId> {
        self.entries
            .iter()
            .filter(|(_, inserted)| !self.is_expired(**inserted, now))
            .map(|(id, _)| id.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, inserted: Instant, now: Instant) -> bool {
        now.saturating_duration_since(inserted) >= self.ttl
    }
}

impl Default for PendingClears {
    fn default() -> Self {
        Self::new()
    }
}
