//! The conversation the user is currently looking at.

use serde::{Deserialize, Serialize};

use super::entities::ConversationId;

/// Explicit view context passed into every store patch.
///
/// While a conversation is active its unread count is pinned to zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewContext {
    active: Option<ConversationId>,
}

impl ViewContext {
    /// No conversation is open.
    #[must_use]
    pub const fn none() -> Self {
        Self { active: None }
    }

    /// `id` is open.
    #[must_use]
    pub fn viewing(id: impl Into<ConversationId>) -> Self {
        Self {
            active: Some(id.into()),
        }
    }

    /// Returns the active conversation.
    #[must_use]
    pub const fn active(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    /// Returns true if `id` is the active conversation.
    #[must_use]
    pub fn is_viewing(&self, id: &ConversationId) -> bool {
        self.active.as_ref() == Some(id)
    }

    /// Replaces the active conversation, returning the previous one.
    pub fn set_active(&mut self, id: Option<ConversationId>) -> Option<ConversationId> {
        std::mem::replace(&mut self.active, id)
    }
}
