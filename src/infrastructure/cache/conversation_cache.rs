//! Conversation list snapshot persisted as one JSON table keyed by conversation id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, trace};

use super::write_atomic;
use crate::domain::entities::{Conversation, ConversationId};
use crate::domain::errors::CacheError;
use crate::domain::ports::ConversationCachePort;

const FILE_NAME: &str = "conversations.json";

pub struct JsonConversationCache {
    path: PathBuf,
}

impl JsonConversationCache {
    /// Creates a cache stored under `cache_dir`.
    #[must_use]
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            path: cache_dir.join(FILE_NAME),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConversationCachePort for JsonConversationCache {
    async fn load(&self) -> Result<Vec<Conversation>, CacheError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No conversation cache yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let table: HashMap<ConversationId, Conversation> = serde_json::from_slice(&bytes)?;
        debug!(conversations = table.len(), "Loaded conversation cache");
        Ok(table.into_values().collect())
    }

    async fn save(&self, conversations: &[Conversation]) -> Result<(), CacheError> {
        let table: HashMap<&ConversationId, &Conversation> =
            conversations.iter().map(|c| (&c.id, c)).collect();
        let bytes = serde_json::to_vec(&table)?;
        write_atomic(self.path.clone(), bytes).await?;
        trace!(conversations = conversations.len(), "Saved conversation cache");
        Ok(())
    }
}
