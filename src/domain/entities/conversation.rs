//! Conversation summary entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConversationId, UserId, UserProfile};

/// Last-message fields of a conversation, moved around as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    /// Preview text.
    pub text: Option<String>,
    /// Creation time of the last message.
    pub at: Option<DateTime<Utc>>,
    /// Sender of the last message.
    pub sender_id: Option<UserId>,
    /// Whether the other participant has seen it.
    pub seen: bool,
    /// Row update time.
    pub updated_at: DateTime<Utc>,
}

/// Cached summary of a two-participant conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation ID.
    pub id: ConversationId,
    /// The participant that is not the current user.
    pub other_user: UserProfile,
    /// Preview of the last message.
    #[serde(default)]
    pub last_message_text: Option<String>,
    /// Creation time of the last message.
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    /// Sender of the last message.
    #[serde(default)]
    pub last_message_sender_id: Option<UserId>,
    /// True iff self sent the last message and the other participant has read it.
    #[serde(default)]
    pub last_message_seen: bool,
    /// Messages from the other participant after self's last-read marker.
    #[serde(default)]
    pub unread_count: u32,
    /// Row update time.
    pub updated_at: DateTime<Utc>,
    /// Self's last-read marker, mirrored from the backend.
    #[serde(default)]
    pub self_last_read_at: Option<DateTime<Utc>>,
    /// The other participant's last-read marker.
    #[serde(default)]
    pub other_last_read_at: Option<DateTime<Utc>>,
    /// Self muted this conversation.
    #[serde(default)]
    pub is_muted: bool,
    /// Self blocked the other participant.
    #[serde(default)]
    pub is_blocked: bool,
    /// Newest message time already counted by a message insert or a reconciliation.
    ///
    /// Conversation-row updates move the preview but never this watermark, so an
    /// insert that arrives after its own row update is still counted.
    #[serde(default)]
    pub ingested_through: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Creates an empty conversation with the given participant.
    #[must_use]
    pub fn new(id: impl Into<ConversationId>, other_user: UserProfile) -> Self {
        Self {
            id: id.into(),
            other_user,
            last_message_text: None,
            last_message_at: None,
            last_message_sender_id: None,
            last_message_seen: false,
            unread_count: 0,
            updated_at: Utc::now(),
            self_last_read_at: None,
            other_last_read_at: None,
            is_muted: false,
            is_blocked: false,
            ingested_through: None,
        }
    }

    /// Returns true if `user_id` sent the last message.
    #[must_use]
    pub fn last_sent_by(&self, user_id: &UserId) -> bool {
        self.last_message_sender_id.as_ref() == Some(user_id)
    }

    /// Recomputes `last_message_seen` from the other participant's marker.
    ///
    /// Only meaningful when self sent the last message; otherwise the flag is cleared.
    pub fn recompute_seen(&mut self, self_id: &UserId) {
        self.last_message_seen = self.last_sent_by(self_id)
            && matches!(
                (self.other_last_read_at, self.last_message_at),
                (Some(read), Some(sent)) if read >= sent
            );
    }

    /// Returns true if a message created at `at` has not been counted yet.
    #[must_use]
    pub fn is_newer_message(&self, at: DateTime<Utc>) -> bool {
        self.ingested_through.is_none_or(|through| at > through)
    }

    /// Raises the ingest watermark to at least `at`.
    pub fn advance_ingested(&mut self, at: Option<DateTime<Utc>>) {
        if at > self.ingested_through {
            self.ingested_through = at;
        }
    }

    /// Records an ingested message. The preview only moves forward.
    pub fn ingest_last_message(&mut self, last: LastMessage) {
        self.advance_ingested(last.at);
        let is_current = match (last.at, self.last_message_at) {
            (Some(incoming), Some(current)) => incoming >= current,
            (_, None) => true,
            (None, Some(_)) => false,
        };
        if is_current {
            self.set_last_message(last);
        }
    }

    /// Captures the last-message fields.
    #[must_use]
    pub fn last_message(&self) -> LastMessage {
        LastMessage {
            text: self.last_message_text.clone(),
            at: self.last_message_at,
            sender_id: self.last_message_sender_id.clone(),
            seen: self.last_message_seen,
            updated_at: self.updated_at,
        }
    }

    /// Overwrites the last-message fields.
    pub fn set_last_message(&mut self, last: LastMessage) {
        self.last_message_text = last.text;
        self.last_message_at = last.at;
        self.last_message_sender_id = last.sender_id;
        self.last_message_seen = last.seen;
        self.updated_at = last.updated_at;
    }
}
