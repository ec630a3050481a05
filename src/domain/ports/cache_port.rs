//! Local cache port definitions.

use async_trait::async_trait;

use crate::domain::entities::{Conversation, ConversationId, Message, MessageId};
use crate::domain::errors::CacheError;

/// Durable snapshot of the conversation list, used to hydrate before the first fetch.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationCachePort: Send + Sync {
    /// Reads the persisted list.
    async fn load(&self) -> Result<Vec<Conversation>, CacheError>;

    /// Replaces the persisted list wholesale.
    async fn save(&self, conversations: &[Conversation]) -> Result<(), CacheError>;
}

/// Per-conversation cache of recent messages for already-open chats.
#[async_trait]
pub trait MessageCachePort: Send + Sync {
    /// Appends a message unless its id is already cached. Returns true if appended.
    async fn append(&self, message: &Message) -> Result<bool, CacheError>;

    /// Replaces a cached message in place. Returns true if it was cached.
    async fn update(&self, message: &Message) -> Result<bool, CacheError>;

    /// Resolves the conversation of a cached message.
    async fn conversation_of(&self, message_id: &MessageId) -> Option<ConversationId>;

    /// Returns cached messages for a conversation, oldest first.
    async fn recent(&self, conversation_id: &ConversationId) -> Vec<Message>;
}
