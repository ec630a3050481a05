//! Message rows as delivered by the realtime feed and the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConversationId, MessageId, UserId};

const ATTACHMENT_PREVIEW: &str = "Sent an attachment";
const FALLBACK_PREVIEW: &str = "New message";

/// Kind of message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Plain text.
    #[default]
    Text,
    /// Image or video attachment.
    Media,
    /// Document attachment.
    Document,
    /// Shared incident post.
    PostShare,
    /// System notice.
    System,
    /// Anything this client does not know about.
    #[serde(other)]
    Unknown,
}

impl ContentType {
    /// Returns true for attachment-bearing content.
    #[must_use]
    pub const fn is_attachment(self) -> bool {
        matches!(self, Self::Media | Self::Document)
    }
}

/// A direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID.
    pub id: MessageId,
    /// Conversation the message belongs to.
    pub conversation_id: ConversationId,
    /// Author.
    pub sender_id: UserId,
    /// Text content.
    #[serde(default)]
    pub content: Option<String>,
    /// Content kind.
    #[serde(default)]
    pub content_type: ContentType,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Soft-delete flag.
    #[serde(default)]
    pub is_deleted: bool,
    /// Last edit time.
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Creates a text message.
    #[must_use]
    pub fn text(
        id: impl Into<MessageId>,
        conversation_id: impl Into<ConversationId>,
        sender_id: impl Into<UserId>,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            content: Some(content.into()),
            content_type: ContentType::Text,
            created_at,
            is_deleted: false,
            edited_at: None,
        }
    }

    /// Returns the conversation-list preview for this message.
    #[must_use]
    pub fn preview_text(&self, max_chars: usize) -> String {
        preview_text(self.content.as_deref(), self.content_type, max_chars)
    }
}

/// Builds preview text, truncated to `max_chars` characters.
#[must_use]
pub fn preview_text(content: Option<&str>, content_type: ContentType, max_chars: usize) -> String {
    match content.filter(|c| !c.is_empty()) {
        Some(text) => text.chars().take(max_chars).collect(),
        None if content_type.is_attachment() => ATTACHMENT_PREVIEW.to_string(),
        None => FALLBACK_PREVIEW.to_string(),
    }
}

/// A read receipt for a single message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    /// Message that was read.
    pub message_id: MessageId,
    /// Reader.
    pub user_id: UserId,
    /// Read time.
    pub read_at: DateTime<Utc>,
}

/// An emoji reaction on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    /// Message reacted to.
    pub message_id: MessageId,
    /// Who reacted.
    pub user_id: UserId,
    /// The emoji.
    #[serde(alias = "reaction")]
    pub emoji: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}
