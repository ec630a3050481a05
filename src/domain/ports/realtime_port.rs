use tokio::sync::mpsc;

use crate::domain::entities::{
    AccessToken, ConversationId, ConversationRow, Message, MessageId, ParticipantUpdate, ReadReceipt,
    UserId,
};
use crate::domain::errors::SyncError;

/// Events delivered by the realtime feed, in arrival order only.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    /// Subscription confirmed by the server.
    Connected,
    /// Connection dropped.
    Disconnected {
        reason: String,
    },
    /// A reconnection attempt is scheduled.
    Reconnecting {
        attempt: u32,
    },
    MessageInsert(Message),
    MessageUpdate(Message),
    ConversationUpdate(ConversationRow),
    ParticipantUpdate(ParticipantUpdate),
    ReadReceipt(ReadReceipt),
    /// A reaction was added to or removed from a message; the payload only names the message.
    ReactionChange {
        message_id: MessageId,
    },
    Error {
        message: String,
        recoverable: bool,
    },
}

impl RealtimeEvent {
    #[must_use]
    pub const fn is_connection_event(&self) -> bool {
        matches!(
            self,
            Self::Connected | Self::Disconnected { .. } | Self::Reconnecting { .. }
        )
    }

    /// Returns the conversation a data event targets, when the payload names one.
    #[must_use]
    pub const fn conversation_id(&self) -> Option<&ConversationId> {
        match self {
            Self::MessageInsert(message) | Self::MessageUpdate(message) => {
                Some(&message.conversation_id)
            }
            Self::ConversationUpdate(row) => Some(&row.id),
            Self::ParticipantUpdate(update) => Some(&update.conversation_id),
            _ => None,
        }
    }
}

pub trait RealtimePort: Send + Sync {
    /// Opens the subscription for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::AlreadySubscribed` if a subscription is active.
    fn subscribe(
        &mut self,
        token: &AccessToken,
        user_id: &UserId,
    ) -> Result<mpsc::UnboundedReceiver<RealtimeEvent>, SyncError>;

    fn unsubscribe(&self);

    fn is_subscribed(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn test_conversation_id_of_events() {
        let message = Message::text("m", "c", "u", "hi", Utc::now());
        assert_eq!(
            RealtimeEvent::MessageInsert(message).conversation_id(),
            Some(&ConversationId::from("c"))
        );
        assert!(RealtimeEvent::Connected.conversation_id().is_none());
        assert!(RealtimeEvent::Connected.is_connection_event());
    }
}
