//! User profile entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;

/// Public profile of the other participant of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User ID.
    pub id: UserId,
    /// Full name, if the user set one.
    #[serde(default)]
    pub full_name: Option<String>,
    /// Avatar URL.
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Whether the user belongs to the messaging tier.
    #[serde(default)]
    pub is_vip: bool,
    /// Last time the user was seen online.
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Creates a profile with only an id and a name.
    #[must_use]
    pub fn new(id: impl Into<UserId>, full_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            full_name: Some(full_name.into()),
            avatar_url: None,
            is_vip: true,
            last_seen_at: None,
        }
    }

    /// Returns the name to show in the conversation list.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("Unknown user")
    }
}
