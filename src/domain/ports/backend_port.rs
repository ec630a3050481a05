//! Backend query surface used by reconciliation and read-marker mutations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::{
    ConversationId, ConversationRow, MessageId, OtherParticipant, Reaction, SelfParticipant,
    UserId, UserProfile,
};
use crate::domain::errors::SyncError;

/// Port for the authoritative conversation backend.
#[async_trait]
pub trait ConversationBackendPort: Send + Sync {
    /// Lists self's participant rows.
    async fn fetch_self_participants(
        &self,
        self_id: &UserId,
    ) -> Result<Vec<SelfParticipant>, SyncError>;

    /// Lists conversation rows by id.
    async fn fetch_conversations(
        &self,
        ids: &[ConversationId],
    ) -> Result<Vec<ConversationRow>, SyncError>;

    /// Lists the other participant of each conversation.
    async fn fetch_other_participants(
        &self,
        self_id: &UserId,
        ids: &[ConversationId],
    ) -> Result<Vec<OtherParticipant>, SyncError>;

    /// Batch-loads user profiles.
    async fn fetch_profiles(&self, user_ids: &[UserId]) -> Result<Vec<UserProfile>, SyncError>;

    /// Counts non-deleted messages not sent by `self_id` created strictly after `after`.
    async fn count_unread(
        &self,
        self_id: &UserId,
        conversation_id: &ConversationId,
        after: DateTime<Utc>,
    ) -> Result<u32, SyncError>;

    /// Returns the newest message time, optionally restricted to one sender.
    async fn latest_message_at(
        &self,
        conversation_id: &ConversationId,
        sender_id: Option<&UserId>,
    ) -> Result<Option<DateTime<Utc>>, SyncError>;

    /// Moves self's last-read marker.
    async fn update_last_read(
        &self,
        self_id: &UserId,
        conversation_id: &ConversationId,
        read_at: DateTime<Utc>,
    ) -> Result<(), SyncError>;

    /// Records per-message reads for self, idempotent on `(message_id, user_id)`.
    async fn upsert_message_reads(
        &self,
        self_id: &UserId,
        message_ids: &[MessageId],
        read_at: DateTime<Utc>,
    ) -> Result<(), SyncError>;

    /// Lists every reaction currently on a message.
    async fn fetch_reactions(&self, message_id: &MessageId) -> Result<Vec<Reaction>, SyncError>;
}

#[cfg(test)]
pub mod mock {
    use std::collections::HashMap;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::domain::entities::Message;

    #[derive(Default)]
    struct FakeState {
        self_rows: Vec<SelfParticipant>,
        conversations: Vec<ConversationRow>,
        others: Vec<OtherParticipant>,
        profiles: HashMap<UserId, UserProfile>,
        messages: Vec<Message>,
        read_updates: Vec<(ConversationId, DateTime<Utc>)>,
        message_reads: Vec<(MessageId, UserId)>,
        reactions: Vec<Reaction>,
        count_queries: Vec<ConversationId>,
        fail_fetch: bool,
        fail_mutation: bool,
    }

    /// In-memory backend with the same query semantics as the real one.
    #[derive(Clone, Default)]
    pub struct FakeBackend {
        state: Arc<Mutex<FakeState>>,
        count_gate: Arc<Mutex<Option<Arc<Semaphore>>>>,
    }

    impl FakeBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Adds a conversation between `self_id` and `other`.
        pub fn add_conversation(
            &self,
            row: ConversationRow,
            self_read: Option<DateTime<Utc>>,
            other: UserProfile,
            other_read: Option<DateTime<Utc>>,
        ) {
            let mut state = self.state.lock();
            state.self_rows.push(SelfParticipant {
                conversation_id: row.id.clone(),
                last_read_at: self_read,
                is_blocked: false,
                is_muted: false,
            });
            state.others.push(OtherParticipant {
                conversation_id: row.id.clone(),
                user_id: other.id.clone(),
                last_read_at: other_read,
            });
            state.profiles.insert(other.id.clone(), other);
            state.conversations.push(row);
        }

        pub fn add_message(&self, message: Message) {
            self.state.lock().messages.push(message);
        }

        pub fn add_reaction(&self, reaction: Reaction) {
            self.state.lock().reactions.push(reaction);
        }

        pub fn remove_profile(&self, user_id: &UserId) {
            self.state.lock().profiles.remove(user_id);
        }

        pub fn set_self_read(&self, conversation_id: &ConversationId, at: DateTime<Utc>) {
            let mut state = self.state.lock();
            if let Some(row) = state
                .self_rows
                .iter_mut()
                .find(|r| &r.conversation_id == conversation_id)
            {
                row.last_read_at = Some(at);
            }
        }

        pub fn set_fail_fetch(&self, fail: bool) {
            self.state.lock().fail_fetch = fail;
        }

        pub fn set_fail_mutation(&self, fail: bool) {
            self.state.lock().fail_mutation = fail;
        }

        /// Makes every unread count wait for a permit on the returned gate.
        pub fn hold_counts(&self) -> Arc<Semaphore> {
            let gate = Arc::new(Semaphore::new(0));
            *self.count_gate.lock() = Some(gate.clone());
            gate
        }

        pub fn read_updates(&self) -> Vec<(ConversationId, DateTime<Utc>)> {
            self.state.lock().read_updates.clone()
        }

        pub fn message_reads(&self) -> Vec<(MessageId, UserId)> {
            self.state.lock().message_reads.clone()
        }

        pub fn count_queries(&self) -> Vec<ConversationId> {
            self.state.lock().count_queries.clone()
        }

        fn check_fetch(&self) -> Result<(), SyncError> {
            if self.state.lock().fail_fetch {
                return Err(SyncError::network("connection reset"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ConversationBackendPort for FakeBackend {
        async fn fetch_self_participants(
            &self,
            _self_id: &UserId,
        ) -> Result<Vec<SelfParticipant>, SyncError> {
            self.check_fetch()?;
            Ok(self.state.lock().self_rows.clone())
        }

        async fn fetch_conversations(
            &self,
            ids: &[ConversationId],
        ) -> Result<Vec<ConversationRow>, SyncError> {
            self.check_fetch()?;
            Ok(self
                .state
                .lock()
                .conversations
                .iter()
                .filter(|c| ids.contains(&c.id))
                .cloned()
                .collect())
        }

        async fn fetch_other_participants(
            &self,
            _self_id: &UserId,
            ids: &[ConversationId],
        ) -> Result<Vec<OtherParticipant>, SyncError> {
            self.check_fetch()?;
            Ok(self
                .state
                .lock()
                .others
                .iter()
                .filter(|p| ids.contains(&p.conversation_id))
                .cloned()
                .collect())
        }

        async fn fetch_profiles(
            &self,
            user_ids: &[UserId],
        ) -> Result<Vec<UserProfile>, SyncError> {
            self.check_fetch()?;
            let state = self.state.lock();
            Ok(user_ids
                .iter()
                .filter_map(|id| state.profiles.get(id).cloned())
                .collect())
        }

        async fn count_unread(
            &self,
            self_id: &UserId,
            conversation_id: &ConversationId,
            after: DateTime<Utc>,
        ) -> Result<u32, SyncError> {
            let gate = self.count_gate.lock().clone();
            if let Some(gate) = gate {
                let _permit = gate
                    .acquire()
                    .await
                    .map_err(|_| SyncError::network("count gate closed"))?;
            }
            self.check_fetch()?;
            let mut state = self.state.lock();
            state.count_queries.push(conversation_id.clone());
            let count = state
                .messages
                .iter()
                .filter(|m| {
                    &m.conversation_id == conversation_id
                        && &m.sender_id != self_id
                        && m.created_at > after
                        && !m.is_deleted
                })
                .count();
            Ok(u32::try_from(count).unwrap_or(u32::MAX))
        }

        async fn latest_message_at(
            &self,
            conversation_id: &ConversationId,
            sender_id: Option<&UserId>,
        ) -> Result<Option<DateTime<Utc>>, SyncError> {
            self.check_fetch()?;
            Ok(self
                .state
                .lock()
                .messages
                .iter()
                .filter(|m| &m.conversation_id == conversation_id)
                .filter(|m| sender_id.is_none_or(|s| &m.sender_id == s))
                .map(|m| m.created_at)
                .max())
        }

        async fn update_last_read(
            &self,
            _self_id: &UserId,
            conversation_id: &ConversationId,
            read_at: DateTime<Utc>,
        ) -> Result<(), SyncError> {
            let mut state = self.state.lock();
            if state.fail_mutation {
                return Err(SyncError::network("mutation failed"));
            }
            state.read_updates.push((conversation_id.clone(), read_at));
            if let Some(row) = state
                .self_rows
                .iter_mut()
                .find(|r| &r.conversation_id == conversation_id)
            {
                row.last_read_at = Some(read_at);
            }
            Ok(())
        }

        async fn upsert_message_reads(
            &self,
            self_id: &UserId,
            message_ids: &[MessageId],
            _read_at: DateTime<Utc>,
        ) -> Result<(), SyncError> {
            let mut state = self.state.lock();
            if state.fail_mutation {
                return Err(SyncError::network("mutation failed"));
            }
            for id in message_ids {
                let key = (id.clone(), self_id.clone());
                if !state.message_reads.contains(&key) {
                    state.message_reads.push(key);
                }
            }
            Ok(())
        }

        async fn fetch_reactions(
            &self,
            message_id: &MessageId,
        ) -> Result<Vec<Reaction>, SyncError> {
            self.check_fetch()?;
            Ok(self
                .state
                .lock()
                .reactions
                .iter()
                .filter(|r| &r.message_id == message_id)
                .cloned()
                .collect())
        }
    }
}
