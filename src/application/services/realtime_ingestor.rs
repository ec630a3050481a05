//! Translates realtime events into store patches without waiting for reconciliation.

use std::time::Instant;

use tracing::{debug, trace};

use super::conversation_store::{ConversationStore, StorePatch};
use super::pending_clears::PendingClears;
use crate::domain::ViewContext;
use crate::domain::entities::{
    ConversationId, ConversationRow, LastMessage, Message, MessageId, ParticipantUpdate, ReadReceipt,
    UserId,
};

/// Default preview length in characters.
pub const PREVIEW_MAX_CHARS: usize = 100;

/// Engine state an event is judged against.
#[derive(Debug, Clone, Copy)]
pub struct IngestContext<'a> {
    pub store: &'a ConversationStore,
    pub view: &'a ViewContext,
    pub pending: &'a PendingClears,
    pub now: Instant,
}

/// What the engine should do with one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ingestion {
    pub patches: Vec<StorePatch>,
    /// Record a protection entry for this conversation after applying the patches.
    pub protect: Option<ConversationId>,
    /// Move self's read marker, because the message landed in the open chat.
    pub mark_read: Option<ConversationId>,
    /// Record a per-message read for the message that landed in the open chat.
    pub read_message: Option<MessageId>,
    /// The event targets a conversation the store does not know yet.
    pub unknown_conversation: bool,
}

impl Ingestion {
    #[must_use]
    pub fn ignored() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.patches.is_empty() && self.mark_read.is_none() && !self.unknown_conversation
    }
}

#[derive(Debug, Clone)]
pub struct RealtimeIngestor {
    self_id: UserId,
    preview_max_chars: usize,
}

impl RealtimeIngestor {
    #[must_use]
    pub const fn new(self_id: UserId, preview_max_chars: usize) -> Self {
        Self {
            self_id,
            preview_max_chars,
        }
    }

    pub fn message_insert(&self, message: &Message, ctx: IngestContext<'_>) -> Ingestion {
        let id = &message.conversation_id;
        let from_self = message.sender_id == self.self_id;

        if message.is_deleted {
            trace!(message_id = %message.id, "Ignoring deleted message insert");
            return Ingestion::ignored();
        }

        let Some(conv) = ctx.store.get(id) else {
            debug!(conversation_id = %id, "Message for unknown conversation");
            return Ingestion {
                unknown_conversation: !from_self,
                ..Ingestion::default()
            };
        };

        if !conv.is_newer_message(message.created_at) {
            trace!(
                conversation_id = %id,
                message_id = %message.id,
                "Ignoring message not newer than last message"
            );
            return Ingestion::ignored();
        }

        let last_message = LastMessage {
            text: Some(message.preview_text(self.preview_max_chars)),
            at: Some(message.created_at),
            sender_id: Some(message.sender_id.clone()),
            seen: false,
            updated_at: message.created_at,
        };

        let viewing = ctx.view.is_viewing(id);
        let read_here = viewing && !from_self;
        if viewing || ctx.pending.contains_at(id, ctx.now) {
            return Ingestion {
                patches: vec![
                    StorePatch::Increment {
                        id: id.clone(),
                        delta: 0,
                        last_message: Some(last_message),
                    },
                    StorePatch::ForceZero(id.clone()),
                ],
                mark_read: read_here.then(|| id.clone()),
                read_message: read_here.then(|| message.id.clone()),
                ..Ingestion::default()
            };
        }

        let delta = i32::from(!from_self);
        Ingestion {
            patches: vec![StorePatch::Increment {
                id: id.clone(),
                delta,
                last_message: Some(last_message),
            }],
            protect: (!from_self).then(|| id.clone()),
            ..Ingestion::default()
        }
    }

    pub fn conversation_update(&self, row: &ConversationRow, ctx: IngestContext<'_>) -> Ingestion {
        if !ctx.store.contains(&row.id) {
            return Ingestion::ignored();
        }
        Ingestion {
            patches: vec![StorePatch::Metadata(row.clone())],
            ..Ingestion::default()
        }
    }

    pub fn participant_update(
        &self,
        update: &ParticipantUpdate,
        ctx: IngestContext<'_>,
    ) -> Ingestion {
        let Some(at) = update.last_read_at else {
            return Ingestion::ignored();
        };
        if !ctx.store.contains(&update.conversation_id) {
            return Ingestion::ignored();
        }

        let id = update.conversation_id.clone();
        let patch = if update.user_id == self.self_id {
            StorePatch::SelfRead { id, at }
        } else {
            StorePatch::OtherRead { id, at }
        };
        Ingestion {
            patches: vec![patch],
            ..Ingestion::default()
        }
    }

    /// `resolved` is the receipt's conversation, when the message is cached locally.
    pub fn read_receipt(
        &self,
        receipt: &ReadReceipt,
        resolved: Option<ConversationId>,
    ) -> Ingestion {
        if receipt.user_id == self.self_id {
            return Ingestion::ignored();
        }
        Ingestion {
            patches: vec![StorePatch::ReadReceipt { id: resolved }],
            ..Ingestion::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::domain::entities::{Conversation, UserProfile};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn ingestor() -> RealtimeIngestor {
        RealtimeIngestor::new(UserId::from("me"), PREVIEW_MAX_CHARS)
    }

    fn store() -> ConversationStore {
        let mut store = ConversationStore::new(UserId::from("me"));
        let mut conv = Conversation::new("c", UserProfile::new("other", "Other"));
        conv.last_message_at = Some(ts(100));
        store.replace_all(vec![conv]);
        store
    }

    fn ctx<'a>(
        store: &'a ConversationStore,
        view: &'a ViewContext,
        pending: &'a PendingClears,
    ) -> IngestContext<'a> {
        IngestContext {
            store,
            view,
            pending,
            now: Instant::now(),
        }
    }

    #[test]
    fn test_message_from_other_increments_and_protects() {
        let store = store();
        let view = ViewContext::none();
        let pending = PendingClears::new();
        let msg = Message::text("m1", "c", "other", "hello", ts(200));

        let ingestion = ingestor().message_insert(&msg, ctx(&store, &view, &pending));

        assert_eq!(ingestion.protect, Some(ConversationId::from("c")));
        assert!(matches!(
            ingestion.patches.as_slice(),
            [StorePatch::Increment { delta: 1, .. }]
        ));
    }

    #[test]
    fn test_message_from_self_keeps_unread() {
        let store = store();
        let view = ViewContext::none();
        let pending = PendingClears::new();
        let msg = Message::text("m1", "c", "me", "hello", ts(200));

        let ingestion = ingestor().message_insert(&msg, ctx(&store, &view, &pending));

        assert_eq!(ingestion.protect, None);
        assert!(matches!(
            ingestion.patches.as_slice(),
            [StorePatch::Increment { delta: 0, .. }]
        ));
    }

    #[test]
    fn test_message_not_newer_is_ignored() {
        let store = store();
        let view = ViewContext::none();
        let pending = PendingClears::new();
        let msg = Message::text("m1", "c", "other", "late", ts(100));

        let ingestion = ingestor().message_insert(&msg, ctx(&store, &view, &pending));
        assert!(ingestion.is_noop());
    }

    #[test]
    fn test_message_in_active_view_zeroes_and_marks_read() {
        let store = store();
        let view = ViewContext::viewing("c");
        let pending = PendingClears::new();
        let msg = Message::text("m1", "c", "other", "hello", ts(200));

        let ingestion = ingestor().message_insert(&msg, ctx(&store, &view, &pending));

        assert_eq!(ingestion.mark_read, Some(ConversationId::from("c")));
        assert_eq!(ingestion.read_message, Some(MessageId::from("m1")));
        assert_eq!(ingestion.protect, None);
        assert!(matches!(
            ingestion.patches.last(),
            Some(StorePatch::ForceZero(_))
        ));
    }

    #[test]
    fn test_message_in_pending_clear_zeroes_without_mark_read() {
        let store = store();
        let view = ViewContext::none();
        let mut pending = PendingClears::new();
        pending.insert("c".into());
        let msg = Message::text("m1", "c", "other", "hello", ts(200));

        let ingestion = ingestor().message_insert(&msg, ctx(&store, &view, &pending));

        assert_eq!(ingestion.mark_read, None);
        assert_eq!(ingestion.read_message, None);
        assert!(matches!(
            ingestion.patches.last(),
            Some(StorePatch::ForceZero(_))
        ));
    }

    #[test]
    fn test_own_message_in_active_view_records_no_read() {
        let store = store();
        let view = ViewContext::viewing("c");
        let pending = PendingClears::new();
        let msg = Message::text("m1", "c", "me", "hello", ts(200));

        let ingestion = ingestor().message_insert(&msg, ctx(&store, &view, &pending));

        assert_eq!(ingestion.mark_read, None);
        assert_eq!(ingestion.read_message, None);
    }

    #[test]
    fn test_unknown_conversation_flags_reconcile_for_incoming_only() {
        let store = store();
        let view = ViewContext::none();
        let pending = PendingClears::new();

        let incoming = Message::text("m1", "new", "stranger", "hi", ts(200));
        assert!(
            ingestor()
                .message_insert(&incoming, ctx(&store, &view, &pending))
                .unknown_conversation
        );

        let outgoing = Message::text("m2", "new", "me", "hi", ts(200));
        assert!(
            !ingestor()
                .message_insert(&outgoing, ctx(&store, &view, &pending))
                .unknown_conversation
        );
    }

    #[test]
    fn test_participant_update_routes_by_user() {
        let store = store();
        let view = ViewContext::none();
        let pending = PendingClears::new();

        let other = ParticipantUpdate {
            conversation_id: "c".into(),
            user_id: "other".into(),
            last_read_at: Some(ts(150)),
        };
        let ingestion = ingestor().participant_update(&other, ctx(&store, &view, &pending));
        assert!(matches!(
            ingestion.patches.as_slice(),
            [StorePatch::OtherRead { .. }]
        ));

        let mine = ParticipantUpdate {
            user_id: "me".into(),
            ..other
        };
        let ingestion = ingestor().participant_update(&mine, ctx(&store, &view, &pending));
        assert!(matches!(
            ingestion.patches.as_slice(),
            [StorePatch::SelfRead { .. }]
        ));
    }

    #[test]
    fn test_own_read_receipt_is_ignored() {
        let receipt = ReadReceipt {
            message_id: "m".into(),
            user_id: "me".into(),
            read_at: ts(1),
        };
        assert!(ingestor().read_receipt(&receipt, None).is_noop());
    }
}
