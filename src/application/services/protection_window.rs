//! Bounded max-of-known-values guard for freshly incremented unread counts.
//!
//! An entry is recorded whenever a realtime message raises a conversation's
//! unread count. Until it expires, no later patch may leave the store below
//! that value: the store is raised back, together with the last-message
//! fields that came with the increment.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use super::conversation_store::{ConversationStore, StorePatch};
use super::pending_clears::PendingClears;
use crate::domain::ViewContext;
use crate::domain::entities::{ConversationId, LastMessage};

/// Default lifetime of a protection entry.
pub const PROTECTION_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionEntry {
    pub unread: u32,
    pub last_message: LastMessage,
    inserted_at: Instant,
}

#[derive(Debug)]
pub struct ProtectionWindow {
    entries: HashMap<ConversationId, ProtectionEntry>,
    ttl: Duration,
}

impl ProtectionWindow {
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(PROTECTION_TTL)
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

    /// Records or refreshes the protected value for `id`.
    pub fn record_at(
        &mut self,
        id: ConversationId,
        unread: u32,
        last_message: LastMessage,
        now: Instant,
    ) {
        self.entries.insert(
            id,
            ProtectionEntry {
                unread,
                last_message,
                inserted_at: now,
            },
        );
    }

    pub fn remove(&mut self, id: &ConversationId) -> bool {
        self.entries.remove(id).is_some()
    }

    #[must_use]
    pub fn get_at(&self, id: &ConversationId, now: Instant) -> Option<&ProtectionEntry> {
        self.entries.get(id).filter(|e| !self.is_expired(e, now))
    }

    /// Drops entries that an authoritative value has caught up with.
    pub fn settle(&mut self, store: &ConversationStore) {
        self.entries.retain(|id, entry| {
            store
                .unread(id)
                .is_none_or(|authoritative| authoritative < entry.unread)
        });
    }

    pub fn purge_expired_at(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.inserted_at) < ttl);
        before - self.entries.len()
    }

    /// Raises every live protected conversation that fell below its protected value.
    ///
    /// Skips the active conversation and pending clears, whose count is pinned to zero.
    /// Returns the corrected ids.
    pub fn enforce_at(
        &self,
        store: &mut ConversationStore,
        view: &ViewContext,
        pending: &PendingClears,
        now: Instant,
    ) -> Vec<ConversationId> {
        let mut corrected = Vec::new();

        for (id, entry) in &self.entries {
            if self.is_expired(entry, now) || view.is_viewing(id) || pending.contains_at(id, now) {
                continue;
            }
            let Some(current) = store.get(id) else {
                continue;
            };
            if current.unread_count >= entry.unread {
                continue;
            }

            let snapshot_is_current = match (entry.last_message.at, current.last_message_at) {
                (Some(protected), Some(present)) => protected >= present,
                (_, None) => true,
                (None, Some(_)) => false,
            };

            debug!(
                conversation_id = %id,
                store_unread = current.unread_count,
                protected_unread = entry.unread,
                "Restoring protected unread count"
            );

            store.apply(StorePatch::Restore {
                id: id.clone(),
                unread: entry.unread,
                last_message: snapshot_is_current.then(|| entry.last_message.clone()),
            });
            corrected.push(id.clone());
        }

        corrected
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &ProtectionEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted_at) >= self.ttl
    }
}

impl Default for ProtectionWindow {
    fn default() -> Self {
        Self::new()
    }
}
