//! On-disk caches for conversations and recent messages.

mod conversation_cache;
mod message_cache;

pub use conversation_cache::JsonConversationCache;
pub use message_cache::{DEFAULT_MAX_CACHED_CONVERSATIONS, DEFAULT_MESSAGE_LIMIT, FileMessageCache};

use std::io::Write;
use std::path::PathBuf;

use crate::domain::errors::CacheError;

/// Writes `bytes` to `path` through a temporary file in the same directory.
async fn write_atomic(path: PathBuf, bytes: Vec<u8>) -> Result<(), CacheError> {
    tokio::task::spawn_blocking(move || -> Result<(), CacheError> {
        let parent = path
            .parent()
            .ok_or_else(|| std::io::Error::other("Invalid path"))?;
        std::fs::create_dir_all(parent)?;
        let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
        temp_file.write_all(&bytes)?;
        temp_file.persist(&path).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| CacheError::Io(std::io::Error::other(e)))?
}
