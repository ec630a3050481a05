//! Live subscribers for individual open chats.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::trace;

use crate::domain::RealtimeEvent;
use crate::domain::entities::{
    ConversationId, Message, MessageId, ParticipantUpdate, Reaction, ReadReceipt,
};

/// An event relevant to one open chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    MessageInserted(Message),
    MessageUpdated(Message),
    ParticipantUpdated(ParticipantUpdate),
    ReadReceipt(ReadReceipt),
    /// The full current reaction set of a message.
    ReactionsChanged {
        message_id: MessageId,
        reactions: Vec<Reaction>,
    },
}

impl ChatEvent {
    /// Maps a realtime event to a chat event and the conversation it targets.
    ///
    /// Read receipts carry no conversation and go to every chat. Reaction changes
    /// carry only a message id and are delivered once their reactions are fetched.
    #[must_use]
    pub fn from_realtime(event: &RealtimeEvent) -> Option<(Option<ConversationId>, Self)> {
        match event {
            RealtimeEvent::MessageInsert(m) => {
                Some((Some(m.conversation_id.clone()), Self::MessageInserted(m.clone())))
            }
            RealtimeEvent::MessageUpdate(m) => {
                Some((Some(m.conversation_id.clone()), Self::MessageUpdated(m.clone())))
            }
            RealtimeEvent::ParticipantUpdate(u) => Some((
                Some(u.conversation_id.clone()),
                Self::ParticipantUpdated(u.clone()),
            )),
            RealtimeEvent::ReadReceipt(r) => Some((None, Self::ReadReceipt(r.clone()))),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ChatListeners {
    listeners: HashMap<ConversationId, Vec<mpsc::UnboundedSender<ChatEvent>>>,
}

impl ChatListeners {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, id: ConversationId) -> mpsc::UnboundedReceiver<ChatEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.entry(id).or_default().push(tx);
        rx
    }

    /// Delivers `event` to subscribers of `target`, or to everyone when `target` is `None`.
    /// Returns the number of deliveries.
    pub fn dispatch(&mut self, target: Option<&ConversationId>, event: &ChatEvent) -> usize {
        let mut delivered = 0;
        for (id, senders) in &mut self.listeners {
            if target.is_some_and(|t| t != id) {
                continue;
            }
            senders.retain(|tx| {
                let ok = tx.send(event.clone()).is_ok();
                delivered += usize::from(ok);
                ok
            });
        }
        self.listeners.retain(|_, senders| !senders.is_empty());
        trace!(delivered, "Chat event dispatched");
        delivered
    }

    pub fn dispatch_realtime(&mut self, event: &RealtimeEvent) -> usize {
        match ChatEvent::from_realtime(event) {
            Some((target, chat_event)) => self.dispatch(target.as_ref(), &chat_event),
            None => 0,
        }
    }

    #[must_use]
    pub fn subscriber_count(&self, id: &ConversationId) -> usize {
        self.listeners.get(id).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn test_message_goes_only_to_its_chat() {
        let mut listeners = ChatListeners::new();
        let mut a = listeners.subscribe("a".into());
        let mut b = listeners.subscribe("b".into());

        let event = RealtimeEvent::MessageInsert(Message::text("m", "a", "u", "hi", Utc::now()));
        assert_eq!(listeners.dispatch_realtime(&event), 1);

        assert!(matches!(a.try_recv(), Ok(ChatEvent::MessageInserted(_))));
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn test_read_receipt_goes_to_every_chat() {
        let mut listeners = ChatListeners::new();
        let _a = listeners.subscribe("a".into());
        let _b = listeners.subscribe("b".into());

        let event = RealtimeEvent::ReadReceipt(ReadReceipt {
            message_id: "m".into(),
            user_id: "u".into(),
            read_at: Utc::now(),
        });
        assert_eq!(listeners.dispatch_realtime(&event), 2);
    }

    #[test]
    fn test_reactions_go_to_every_chat() {
        let mut listeners = ChatListeners::new();
        let mut a = listeners.subscribe("a".into());
        let mut b = listeners.subscribe("b".into());

        let event = ChatEvent::ReactionsChanged {
            message_id: "m".into(),
            reactions: Vec::new(),
        };
        assert_eq!(listeners.dispatch(None, &event), 2);
        assert_eq!(a.try_recv(), Ok(event.clone()));
        assert_eq!(b.try_recv(), Ok(event));
    }

    #[test]
    fn test_reaction_change_is_not_dispatched_raw() {
        let mut listeners = ChatListeners::new();
        let mut a = listeners.subscribe("a".into());

        let event = RealtimeEvent::ReactionChange {
            message_id: "m".into(),
        };
        assert_eq!(listeners.dispatch_realtime(&event), 0);
        assert!(a.try_recv().is_err());
    }

    #[test]
    fn test_closed_subscribers_are_pruned() {
        let mut listeners = ChatListeners::new();
        let rx = listeners.subscribe("a".into());
        drop(rx);

        let event = RealtimeEvent::MessageInsert(Message::text("m", "a", "u", "hi", Utc::now()));
        assert_eq!(listeners.dispatch_realtime(&event), 0);
        assert_eq!(listeners.subscriber_count(&"a".into()), 0);
    }
}
