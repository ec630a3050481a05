//! Recent messages per conversation, so an open chat can show arrivals without a round trip.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use async_trait::async_trait;
use lru::LruCache;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use super::write_atomic;
use crate::domain::entities::{ConversationId, Message, MessageId};
use crate::domain::errors::CacheError;
use crate::domain::ports::MessageCachePort;

/// Messages kept per conversation.
pub const DEFAULT_MESSAGE_LIMIT: usize = 100;

/// Conversations kept in memory.
pub const DEFAULT_MAX_CACHED_CONVERSATIONS: usize = 64;

struct Inner {
    conversations: LruCache<ConversationId, Vec<Message>>,
    index: HashMap<MessageId, ConversationId>,
}

impl Inner {
    fn forget(&mut self, messages: &[Message]) {
        for message in messages {
            self.index.remove(&message.id);
        }
    }
}

/// LRU of per-conversation message lists, optionally mirrored to JSON files.
pub struct FileMessageCache {
    dir: Option<PathBuf>,
    limit: usize,
    inner: Mutex<Inner>,
}

impl FileMessageCache {
    /// Creates a cache persisted under `dir`, or memory-only when `dir` is `None`.
    #[must_use]
    pub fn new(dir: Option<PathBuf>, limit: usize, max_conversations: usize) -> Self {
        let cap = NonZeroUsize::new(max_conversations).unwrap_or(NonZeroUsize::MIN);
        Self {
            dir,
            limit: limit.max(1),
            inner: Mutex::new(Inner {
                conversations: LruCache::new(cap),
                index: HashMap::new(),
            }),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(None, DEFAULT_MESSAGE_LIMIT, DEFAULT_MAX_CACHED_CONVERSATIONS)
    }

    /// One file per conversation, named by the hex of the id so distinct ids never share a file.
    fn file_path(&self, id: &ConversationId) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| {
            dir.join("messages")
                .join(format!("{}.json", hex::encode(id.as_str())))
        })
    }

    async fn read_from_disk(&self, id: &ConversationId) -> Vec<Message> {
        let Some(path) = self.file_path(id) else {
            return Vec::new();
        };
        match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(conversation_id = %id, error = %e, "Discarding corrupt message cache");
                Vec::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(conversation_id = %id, error = %e, "Failed to read message cache");
                Vec::new()
            }
        }
    }

    /// Makes sure `id` is resident, loading it from disk on a miss.
    async fn ensure_loaded(&self, inner: &mut Inner, id: &ConversationId) {
        if inner.conversations.contains(id) {
            return;
        }
        let messages = self.read_from_disk(id).await;
        trace!(conversation_id = %id, messages = messages.len(), "Message cache miss");
        for message in &messages {
            inner.index.insert(message.id.clone(), id.clone());
        }
        if let Some((evicted_id, evicted)) = inner.conversations.push(id.clone(), messages)
            && &evicted_id != id
        {
            debug!(conversation_id = %evicted_id, "Evicted conversation from message cache");
            inner.forget(&evicted);
        }
    }

    async fn persist(&self, id: &ConversationId, messages: &[Message]) -> Result<(), CacheError> {
        let Some(path) = self.file_path(id) else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(messages)?;
        write_atomic(path, bytes).await
    }
}

#[async_trait]
impl MessageCachePort for FileMessageCache {
    async fn append(&self, message: &Message) -> Result<bool, CacheError> {
        let id = &message.conversation_id;
        let mut inner = self.inner.lock().await;
        self.ensure_loaded(&mut inner, id).await;

        let Inner {
            conversations,
            index,
        } = &mut *inner;
        let Some(messages) = conversations.get_mut(id) else {
            return Ok(false);
        };
        if messages.iter().any(|m| m.id == message.id) {
            return Ok(false);
        }

        messages.push(message.clone());
        index.insert(message.id.clone(), id.clone());
        if messages.len() > self.limit {
            let overflow = messages.len() - self.limit;
            for dropped in messages.drain(..overflow) {
                index.remove(&dropped.id);
            }
        }

        let snapshot = messages.clone();
        drop(inner);
        self.persist(id, &snapshot).await?;
        Ok(true)
    }

    async fn update(&self, message: &Message) -> Result<bool, CacheError> {
        let id = &message.conversation_id;
        let mut inner = self.inner.lock().await;
        self.ensure_loaded(&mut inner, id).await;

        let Some(messages) = inner.conversations.get_mut(id) else {
            return Ok(false);
        };
        let Some(slot) = messages.iter_mut().find(|m| m.id == message.id) else {
            return Ok(false);
        };
        *slot = message.clone();

        let snapshot = messages.clone();
        drop(inner);
        self.persist(id, &snapshot).await?;
        Ok(true)
    }

    async fn conversation_of(&self, message_id: &MessageId) -> Option<ConversationId> {
        self.inner.lock().await.index.get(message_id).cloned()
    }

    async fn recent(&self, conversation_id: &ConversationId) -> Vec<Message> {
        let mut inner = self.inner.lock().await;
        self.ensure_loaded(&mut inner, conversation_id).await;
        inner
            .conversations
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use super::*;

    fn message(id: &str, conversation: &str, secs: i64) -> Message {
        Message::text(
            id,
            conversation,
            "u",
            format!("text {id}"),
            Utc.timestamp_opt(secs, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_append_dedups_by_id() {
        let cache = FileMessageCache::in_memory();

        assert!(cache.append(&message("m1", "c", 1)).await.unwrap());
        assert!(!cache.append(&message("m1", "c", 1)).await.unwrap());

        assert_eq!(cache.recent(&"c".into()).await.len(), 1);
    }

    #[tokio::test]
    async fn test_keeps_only_the_newest_messages() {
        let cache = FileMessageCache::new(None, 2, 4);
        for (i, id) in ["m1", "m2", "m3"].into_iter().enumerate() {
            cache.append(&message(id, "c", i as i64)).await.unwrap();
        }

        let ids: Vec<String> = cache
            .recent(&"c".into())
            .await
            .into_iter()
            .map(|m| m.id.to_string())
            .collect();
        assert_eq!(ids, vec!["m2", "m3"]);
        assert_eq!(cache.conversation_of(&"m1".into()).await, None);
    }

    #[tokio::test]
    async fn test_resolves_conversation_of_message() {
        let cache = FileMessageCache::in_memory();
        cache.append(&message("m1", "c", 1)).await.unwrap();

        assert_eq!(
            cache.conversation_of(&"m1".into()).await,
            Some(ConversationId::from("c"))
        );
        assert_eq!(cache.conversation_of(&"other".into()).await, None);
    }

    #[tokio::test]
    async fn test_update_replaces_cached_message() {
        let cache = FileMessageCache::in_memory();
        cache.append(&message("m1", "c", 1)).await.unwrap();

        let mut edited = message("m1", "c", 1);
        edited.content = Some("edited".to_string());
        assert!(cache.update(&edited).await.unwrap());
        assert!(!cache.update(&message("m9", "c", 9)).await.unwrap());

        let recent = cache.recent(&"c".into()).await;
        assert_eq!(recent[0].content.as_deref(), Some("edited"));
    }

    #[tokio::test]
    async fn test_eviction_forgets_index() {
        let cache = FileMessageCache::new(None, 10, 1);
        cache.append(&message("m1", "a", 1)).await.unwrap();
        cache.append(&message("m2", "b", 2)).await.unwrap();

        assert_eq!(cache.conversation_of(&"m1".into()).await, None);
        assert!(cache.recent(&"a".into()).await.is_empty());
    }

    #[test]
    fn test_file_names_never_collide() {
        let cache = FileMessageCache::new(Some(PathBuf::from("/cache")), 10, 4);

        let dotted = cache.file_path(&"a.b".into()).unwrap();
        let plain = cache.file_path(&"ab".into()).unwrap();

        assert_ne!(dotted, plain);
        assert_eq!(dotted, PathBuf::from("/cache/messages/612e62.json"));
    }

    #[tokio::test]
    async fn test_similar_ids_keep_separate_files() {
        let dir = tempdir().unwrap();
        let cache = FileMessageCache::new(Some(dir.path().to_path_buf()), 10, 4);
        cache.append(&message("m1", "a.b", 1)).await.unwrap();
        cache.append(&message("m2", "ab", 2)).await.unwrap();
        drop(cache);

        let reopened = FileMessageCache::new(Some(dir.path().to_path_buf()), 10, 4);
        let ids: Vec<String> = reopened
            .recent(&"a.b".into())
            .await
            .into_iter()
            .map(|m| m.id.to_string())
            .collect();
        assert_eq!(ids, vec!["m1"]);
    }

    #[tokio::test]
    async fn test_persisted_messages_survive_restart() {
        let dir = tempdir().unwrap();
        let cache = FileMessageCache::new(Some(dir.path().to_path_buf()), 10, 4);
        cache.append(&message("m1", "c", 1)).await.unwrap();
        drop(cache);

        let reopened = FileMessageCache::new(Some(dir.path().to_path_buf()), 10, 4);
        let recent = reopened.recent(&"c".into()).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(
            reopened.conversation_of(&"m1".into()).await,
            Some(ConversationId::from("c"))
        );
    }
}
