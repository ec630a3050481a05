//! Mark-as-read mutation.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use crate::domain::entities::{ConversationId, MessageId, UserId};
use crate::domain::errors::SyncError;
use crate::domain::ports::ConversationBackendPort;

/// Moves self's last-read marker past the newest message of a conversation.
#[derive(Clone)]
pub struct MarkReadUseCase {
    backend: Arc<dyn ConversationBackendPort>,
    self_id: UserId,
}

impl MarkReadUseCase {
    #[must_use]
    pub const fn new(backend: Arc<dyn ConversationBackendPort>, self_id: UserId) -> Self {
        Self { backend, self_id }
    }

    /// Sets the marker one second after the newest message, or to now for an empty conversation.
    ///
    /// # Errors
    /// Returns error if either backend call fails.
    pub async fn execute(&self, id: &ConversationId) -> Result<DateTime<Utc>, SyncError> {
        let latest = self.backend.latest_message_at(id, None).await?;
        let read_at = latest.map_or_else(Utc::now, |at| at + TimeDelta::seconds(1));

        self.backend
            .update_last_read(&self.self_id, id, read_at)
            .await?;

        debug!(conversation_id = %id, %read_at, "Read marker updated");
        Ok(read_at)
    }

    /// Like [`Self::execute`], but failures are logged and swallowed.
    pub async fn execute_best_effort(&self, id: &ConversationId) -> Option<DateTime<Utc>> {
        match self.execute(id).await {
            Ok(read_at) => Some(read_at),
            Err(e) => {
                warn!(conversation_id = %id, error = %e, "Failed to update read marker");
                None
            }
        }
    }

    /// Records a per-message read receipt for one message seen in the open chat.
    ///
    /// Returns false if the backend rejected it; the failure is logged.
    pub async fn acknowledge_best_effort(&self, message_id: &MessageId) -> bool {
        let ids = std::slice::from_ref(message_id);
        match self
            .backend
            .upsert_message_reads(&self.self_id, ids, Utc::now())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(message_id = %message_id, error = %e, "Failed to record message read");
                false
            }
        }
    }
}
