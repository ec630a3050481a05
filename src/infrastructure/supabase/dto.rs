use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::entities::{ConversationId, SelfParticipant, UserId, UserProfile};

/// Self's `conversation_participants` row; flag columns are nullable.
#[derive(Debug, Deserialize)]
pub struct SelfParticipantRow {
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub last_read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_blocked: Option<bool>,
    #[serde(default)]
    pub is_muted: Option<bool>,
}

impl From<SelfParticipantRow> for SelfParticipant {
    fn from(row: SelfParticipantRow) -> Self {
        Self {
            conversation_id: row.conversation_id,
            last_read_at: row.last_read_at,
            is_blocked: row.is_blocked.unwrap_or(false),
            is_muted: row.is_muted.unwrap_or(false),
        }
    }
}

/// `users` row.
#[derive(Debug, Deserialize)]
pub struct ProfileRow {
    pub id: UserId,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_vip: Option<bool>,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        Self {
            id: row.id,
            full_name: row.full_name,
            avatar_url: row.avatar_url,
            is_vip: row.is_vip.unwrap_or(false),
            last_seen_at: row.last_seen_at,
        }
    }
}

/// Projection used by newest-message lookups.
#[derive(Debug, Deserialize)]
pub struct CreatedAtRow {
    pub created_at: DateTime<Utc>,
}

/// PostgREST error body.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}
