//! Single-owner sync core.
//!
//! The engine owns the conversation store, the active view and both
//! registries. Every mutation follows the same path: apply the patch, pin
//! the active and pending-clear conversations to zero, then let the
//! protection window raise anything a stale value pushed down. Side effects
//! that need the network are returned as [`Effect`]s for the caller to run.

use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::settings::SyncSettings;
use crate::application::services::{
    ConversationStore, IngestContext, Ingestion, PendingClears, ProtectionWindow,
    RealtimeIngestor, StorePatch,
};
use crate::domain::entities::{
    ContentType, Conversation, ConversationId, LastMessage, MessageId, UserId, preview_text,
};
use crate::domain::{RealtimeEvent, ViewContext};

/// Network work requested by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Move self's read marker past the newest message of a conversation.
    MarkRead(ConversationId),
    /// Record self's read of one message that arrived in the open chat.
    AcknowledgeMessage(MessageId),
    /// Reload a message's reactions for the open chats.
    FetchReactions(MessageId),
    /// Recompute the list from the backend.
    Reconcile { force: bool },
}

#[derive(Debug)]
pub struct SyncEngine {
    store: ConversationStore,
    view: ViewContext,
    pending: PendingClears,
    protection: ProtectionWindow,
    ingestor: RealtimeIngestor,
    preview_max_chars: usize,
    reconciled: bool,
    dirty: bool,
}

impl SyncEngine {
    #[must_use]
    pub fn new(self_id: UserId, settings: &SyncSettings) -> Self {
        Self {
            store: ConversationStore::new(self_id.clone()),
            view: ViewContext::none(),
            pending: PendingClears::with_ttl(settings.pending_clear_ttl),
            protection: ProtectionWindow::with_ttl(settings.protection_ttl),
            ingestor: RealtimeIngestor::new(self_id, settings.preview_max_chars),
            preview_max_chars: settings.preview_max_chars,
            reconciled: false,
            dirty: false,
        }
    }

    #[must_use]
    pub fn conversations(&self) -> &[Conversation] {
        self.store.conversations()
    }

    #[must_use]
    pub fn conversation(&self, id: &ConversationId) -> Option<&Conversation> {
        self.store.get(id)
    }

    #[must_use]
    pub fn total_unread(&self) -> u32 {
        self.store.total_unread()
    }

    #[must_use]
    pub const fn view(&self) -> &ViewContext {
        &self.view
    }

    #[must_use]
    pub const fn self_id(&self) -> &UserId {
        self.store.self_id()
    }

    /// True once a reconciliation snapshot has replaced the store.
    #[must_use]
    pub const fn is_reconciled(&self) -> bool {
        self.reconciled
    }

    /// Returns and resets the changed-since-last-persist flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Conversations a reconciliation started now must assign zero without a query.
    #[must_use]
    pub fn exclusions_at(&self, now: Instant) -> HashSet<ConversationId> {
        let mut excluded = self.pending.live_at(now);
        if let Some(active) = self.view.active() {
            excluded.insert(active.clone());
        }
        excluded
    }

    /// Loads a persisted snapshot. Ignored once a reconciliation has landed.
    pub fn hydrate_at(&mut self, conversations: Vec<Conversation>, now: Instant) -> bool {
        if self.reconciled {
            debug!("Store already reconciled, ignoring cached snapshot");
            return false;
        }
        let count = conversations.len();
        let changed = self.store.replace_all(conversations);
        self.commit(changed, now);
        info!(conversations = count, "Store hydrated from cache");
        changed
    }

    /// Replaces the store with an authoritative snapshot.
    pub fn apply_reconciliation_at(&mut self, conversations: Vec<Conversation>, now: Instant) {
        self.reconciled = true;
        self.pending.purge_expired_at(now);
        let changed = self.store.replace_all(conversations);
        self.protection.settle(&self.store);
        self.commit(changed, now);
        debug!(
            conversations = self.store.conversations().len(),
            total_unread = self.store.total_unread(),
            "Reconciliation applied"
        );
    }

    /// Optimistically zeroes `id` and masks stale counts for it until the TTL runs out.
    pub fn clear_unread_at(&mut self, id: &ConversationId, now: Instant) {
        self.pending.insert_at(id.clone(), now);
        self.protection.remove(id);
        let changed = self.store.force_zero(id);
        self.commit(changed, now);
    }

    pub fn mark_conversation_read_at(&mut self, id: &ConversationId, now: Instant) -> Vec<Effect> {
        self.clear_unread_at(id, now);
        vec![Effect::MarkRead(id.clone())]
    }

    pub fn enter_conversation_at(&mut self, id: &ConversationId, now: Instant) -> Vec<Effect> {
        let previous = self.view.set_active(Some(id.clone()));
        debug!(conversation_id = %id, "Entered conversation");

        let mut effects = Vec::new();
        if let Some(previous) = previous.filter(|p| p != id) {
            self.pending.insert_at(previous.clone(), now);
            effects.push(Effect::MarkRead(previous));
        }
        effects.extend(self.mark_conversation_read_at(id, now));
        effects
    }

    pub fn leave_conversation_at(&mut self, now: Instant) -> Vec<Effect> {
        let Some(previous) = self.view.set_active(None) else {
            return Vec::new();
        };
        debug!(conversation_id = %previous, "Left conversation");
        self.mark_conversation_read_at(&previous, now)
    }

    /// Shows a message self just sent, without touching the unread count.
    pub fn update_last_message_at(
        &mut self,
        id: &ConversationId,
        text: &str,
        sent_at: DateTime<Utc>,
        now: Instant,
    ) {
        let last_message = LastMessage {
            text: Some(preview_text(Some(text), ContentType::Text, self.preview_max_chars)),
            at: Some(sent_at),
            sender_id: Some(self.store.self_id().clone()),
            seen: false,
            updated_at: sent_at,
        };
        let changed = self.store.apply(StorePatch::LocalPreview {
            id: id.clone(),
            last_message,
        });
        self.commit(changed, now);
    }

    /// Mirrors a successful read-marker mutation.
    pub fn record_read_marker_at(&mut self, id: &ConversationId, at: DateTime<Utc>, now: Instant) {
        let changed = self.store.apply(StorePatch::SelfRead { id: id.clone(), at });
        self.commit(changed, now);
    }

    /// Applies one realtime event.
    ///
    /// `resolved` is the conversation of a read receipt's message, when known locally.
    pub fn apply_realtime_at(
        &mut self,
        event: &RealtimeEvent,
        resolved: Option<ConversationId>,
        now: Instant,
    ) -> Vec<Effect> {
        let ingestion = {
            let ctx = IngestContext {
                store: &self.store,
                view: &self.view,
                pending: &self.pending,
                now,
            };
            match event {
                RealtimeEvent::Connected => {
                    return vec![Effect::Reconcile { force: false }];
                }
                RealtimeEvent::MessageInsert(message) => {
                    self.ingestor.message_insert(message, ctx)
                }
                RealtimeEvent::ConversationUpdate(row) => {
                    self.ingestor.conversation_update(row, ctx)
                }
                RealtimeEvent::ParticipantUpdate(update) => {
                    self.ingestor.participant_update(update, ctx)
                }
                RealtimeEvent::ReadReceipt(receipt) => {
                    self.ingestor.read_receipt(receipt, resolved)
                }
                RealtimeEvent::ReactionChange { message_id } => {
                    return vec![Effect::FetchReactions(message_id.clone())];
                }
                RealtimeEvent::MessageUpdate(_)
                | RealtimeEvent::Disconnected { .. }
                | RealtimeEvent::Reconnecting { .. }
                | RealtimeEvent::Error { .. } => return Vec::new(),
            }
        };
        self.apply_ingestion(ingestion, now)
    }

    /// Drops expired registry entries. Returns true if anything was purged.
    pub fn expire_at(&mut self, now: Instant) -> bool {
        let cleared = self.pending.purge_expired_at(now);
        let protected = self.protection.purge_expired_at(now);
        for id in &cleared {
            debug!(conversation_id = %id, "Optimistic clear expired");
        }
        !cleared.is_empty() || protected > 0
    }

    fn apply_ingestion(&mut self, ingestion: Ingestion, now: Instant) -> Vec<Effect> {
        let mut changed = false;
        for patch in ingestion.patches {
            changed |= self.store.apply(patch);
        }

        if let Some(id) = ingestion.protect
            && let Some(conv) = self.store.get(&id)
        {
            self.protection
                .record_at(id.clone(), conv.unread_count, conv.last_message(), now);
        }

        self.commit(changed, now);

        let mut effects = Vec::new();
        if let Some(id) = ingestion.mark_read {
            effects.push(Effect::MarkRead(id));
        }
        if let Some(message_id) = ingestion.read_message {
            effects.push(Effect::AcknowledgeMessage(message_id));
        }
        if ingestion.unknown_conversation {
            effects.push(Effect::Reconcile { force: false });
        }
        effects
    }

    /// Pins suppressed conversations to zero, then enforces protection.
    fn commit(&mut self, mut changed: bool, now: Instant) {
        if let Some(active) = self.view.active().cloned() {
            changed |= self.store.force_zero(&active);
        }
        for id in self.pending.live_at(now) {
            changed |= self.store.force_zero(&id);
        }

        let corrected =
            self.protection
                .enforce_at(&mut self.store, &self.view, &self.pending, now);
        changed |= !corrected.is_empty();

        self.dirty |= changed;
    }
}
