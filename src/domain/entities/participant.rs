//! Participant and conversation rows loaded during reconciliation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConversationId, UserId};

/// Self's participant row for one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfParticipant {
    /// Conversation ID.
    pub conversation_id: ConversationId,
    /// Self's last-read marker.
    #[serde(default)]
    pub last_read_at: Option<DateTime<Utc>>,
    /// Self blocked the other participant.
    #[serde(default)]
    pub is_blocked: bool,
    /// Self muted the conversation.
    #[serde(default)]
    pub is_muted: bool,
}

/// The other participant's row for one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherParticipant {
    /// Conversation ID.
    pub conversation_id: ConversationId,
    /// Other participant's user ID.
    pub user_id: UserId,
    /// Other participant's last-read marker.
    #[serde(default)]
    pub last_read_at: Option<DateTime<Utc>>,
}

/// A conversation row, also used as the payload of conversation-update events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRow {
    /// Conversation ID.
    pub id: ConversationId,
    /// Preview of the last message.
    #[serde(default)]
    pub last_message_text: Option<String>,
    /// Creation time of the last message.
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    /// Sender of the last message.
    #[serde(default)]
    pub last_message_sender_id: Option<UserId>,
    /// Row update time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A change to any participant's row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantUpdate {
    /// Conversation ID.
    pub conversation_id: ConversationId,
    /// Participant whose row changed.
    pub user_id: UserId,
    /// New last-read marker.
    #[serde(default)]
    pub last_read_at: Option<DateTime<Utc>>,
}
